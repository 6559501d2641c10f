//! XP, login and streak commands

use anyhow::Result;
use chrono::{DateTime, Utc};

use questlog::progress::ProgressionEngine;

use super::print_json;

pub fn award_command(
    engine: &ProgressionEngine,
    user: &str,
    amount: i64,
    reason: &str,
    key: &str,
) -> Result<()> {
    let outcome = engine.award_xp(user, amount, reason, key)?;
    if !outcome.applied {
        eprintln!("Key '{}' was already applied for {}; nothing awarded.", key, user);
    }
    print_json(&outcome)
}

pub fn login_command(engine: &ProgressionEngine, user: &str, at: DateTime<Utc>) -> Result<()> {
    let outcome = engine.record_login(user, at)?;
    print_json(&outcome)
}

pub fn activity_command(
    engine: &ProgressionEngine,
    user: &str,
    streak_type: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let outcome = engine.record_activity(user, streak_type, at)?;
    print_json(&outcome)
}

//! Status, leaderboard and history commands

use anyhow::Result;
use serde::Serialize;

use questlog::progress::{
    LeaderboardScope, LedgerEntry, ProgressionEngine, UserChallenge, UserQuest, UserReward,
};

use super::print_json;

/// Show a user's XP, level, streaks, badges and rank
pub fn status_command(engine: &ProgressionEngine, user: &str) -> Result<()> {
    let status = engine.status(user)?;
    print_json(&status)
}

pub fn leaderboard_command(engine: &ProgressionEngine, limit: u32, users: Vec<String>) -> Result<()> {
    let scope = if users.is_empty() {
        LeaderboardScope::Global { limit }
    } else {
        LeaderboardScope::Users(users)
    };
    let entries = engine.leaderboard().rank(&scope)?;
    print_json(&entries)
}

#[derive(Serialize)]
struct History {
    ledger: Vec<LedgerEntry>,
    quests: Vec<UserQuest>,
    challenges: Vec<UserChallenge>,
    redemptions: Vec<UserReward>,
}

pub fn history_command(engine: &ProgressionEngine, user: &str) -> Result<()> {
    let history = History {
        ledger: engine.ledger().history(user)?,
        quests: engine.quests().user_quests(user)?,
        challenges: engine.challenges().user_challenges(user)?,
        redemptions: engine.rewards().redemptions(user)?,
    };
    print_json(&history)
}

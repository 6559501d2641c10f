//! Quest and challenge commands

use anyhow::Result;
use chrono::{DateTime, Utc};

use questlog::progress::ProgressionEngine;

use super::{parse_evidence, print_json};

pub fn start_command(engine: &ProgressionEngine, user: &str, quest: &str) -> Result<()> {
    let started = engine.start_quest(user, quest)?;
    if started.already_started {
        eprintln!("Quest '{}' was already started.", quest);
    }
    print_json(&started)
}

pub async fn complete_command(
    engine: &ProgressionEngine,
    user: &str,
    quest: &str,
    evidence: &str,
) -> Result<()> {
    let evidence = parse_evidence(evidence)?;
    let completion = engine.complete_quest(user, quest, &evidence).await?;
    if completion.already_completed {
        eprintln!("Quest '{}' was already completed; no XP awarded.", quest);
    }
    print_json(&completion)
}

pub fn abandon_command(engine: &ProgressionEngine, user: &str, quest: &str) -> Result<()> {
    let user_quest = engine.abandon_quest(user, quest)?;
    print_json(&user_quest)
}

pub fn join_challenge_command(
    engine: &ProgressionEngine,
    user: &str,
    challenge: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let joined = engine.join_challenge(user, challenge, at)?;
    if joined.already_joined {
        eprintln!("Already joined challenge '{}'.", challenge);
    }
    print_json(&joined)
}

pub async fn complete_challenge_command(
    engine: &ProgressionEngine,
    user: &str,
    challenge: &str,
    evidence: &str,
    at: DateTime<Utc>,
) -> Result<()> {
    let evidence = parse_evidence(evidence)?;
    let completion = engine
        .complete_challenge(user, challenge, &evidence, at)
        .await?;
    if completion.already_completed {
        eprintln!("Challenge '{}' was already completed; no XP awarded.", challenge);
    }
    print_json(&completion)
}

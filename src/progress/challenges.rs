//! Challenge engine
//!
//! Challenges are quests with a time window and an optional participant cap.
//! Capacity is counted inside the joining transaction, so two users racing
//! for the last seat cannot both get it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::EngineContext;
use super::catalog::{load_challenge, not_found};
use super::db::{load_progression, touch_progression};
use super::error::{ClosedReason, EngineError, EngineResult};
use super::events::EngineEvent;
use super::ledger::XpAward;
use super::models::{Challenge, QuestStatus, UserChallenge};
use super::quests::{
    Assignment, TaskKind, TaskReward, begin_assignment, complete_task, load_assignment,
    load_assignments,
};
use super::retry::with_conflict_retry;

/// Result of [`ChallengeEngine::complete_challenge`]
#[derive(Debug, Clone, Serialize)]
pub struct ChallengeCompletion {
    pub user_challenge: UserChallenge,
    pub award: Option<XpAward>,
    pub badge_unlocked: Option<String>,
    pub already_completed: bool,
    pub events: Vec<EngineEvent>,
}

fn to_user_challenge(a: &Assignment, user_id: &str, challenge_id: &str) -> UserChallenge {
    UserChallenge {
        user_id: user_id.to_string(),
        challenge_id: challenge_id.to_string(),
        status: a.status,
        xp_earned: a.xp_earned,
        joined_at: a.started_at,
        completed_at: a.completed_at,
    }
}

/// Fail unless `at` lies within `[start_date, end_date]`
fn check_window(challenge: &Challenge, at: DateTime<Utc>) -> EngineResult<()> {
    let at = at.timestamp_millis();
    let reason = if at < challenge.start_date {
        ClosedReason::NotYetOpen
    } else if at > challenge.end_date {
        ClosedReason::Ended
    } else {
        return Ok(());
    };
    Err(EngineError::ChallengeClosed {
        challenge_id: challenge.challenge_id.clone(),
        reason,
    })
}

/// Users holding a seat: in progress or completed
fn participant_count(conn: &Connection, challenge_id: &str) -> EngineResult<i64> {
    Ok(conn.query_row(
        r#"SELECT COUNT(*) FROM user_challenges
           WHERE challenge_id = ?1 AND status IN ('in_progress', 'completed')"#,
        [challenge_id],
        |r| r.get(0),
    )?)
}

/// Challenge state machine
#[derive(Clone)]
pub struct ChallengeEngine {
    ctx: Arc<EngineContext>,
}

impl ChallengeEngine {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    fn definition(&self, challenge_id: &str) -> EngineResult<Challenge> {
        self.ctx
            .db
            .read(|conn| load_challenge(conn, challenge_id))?
            .ok_or_else(|| not_found("challenge", challenge_id))
    }

    /// Join a challenge at `at`
    ///
    /// Fails with `ChallengeClosed` outside the window, `AlreadyStarted` if the
    /// user already holds a seat, `Abandoned` if they gave theirs up, and
    /// `ChallengeFull` when every seat is taken.
    pub fn join_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<UserChallenge> {
        let challenge = self.definition(challenge_id)?;
        check_window(&challenge, at)?;

        let assignment = with_conflict_retry(self.ctx.retry, "join_challenge", || {
            let (current, existing) = self.ctx.db.read(|conn| {
                Ok((
                    load_progression(conn, user_id)?,
                    load_assignment(conn, TaskKind::Challenge, user_id, challenge_id)?,
                ))
            })?;
            match existing.as_ref().map(|a| a.status) {
                Some(QuestStatus::InProgress | QuestStatus::Completed) => {
                    return Err(EngineError::AlreadyStarted {
                        kind: "challenge",
                        id: challenge_id.to_string(),
                    });
                }
                Some(QuestStatus::Abandoned) => {
                    return Err(EngineError::Abandoned {
                        kind: "challenge",
                        id: challenge_id.to_string(),
                    });
                }
                _ => {}
            }

            self.ctx.db.write(|tx| {
                if let Some(max) = challenge.max_participants {
                    if participant_count(tx, challenge_id)? >= max {
                        return Err(EngineError::ChallengeFull {
                            challenge_id: challenge_id.to_string(),
                            max_participants: max,
                        });
                    }
                }
                let now = at.timestamp_millis();
                let assignment =
                    begin_assignment(tx, TaskKind::Challenge, user_id, challenge_id, now)?;
                touch_progression(tx, &current, now)?;
                Ok(assignment)
            })
        })?;

        debug!("[questlog:challenge] {} joined '{}'", user_id, challenge_id);
        self.ctx.publish(&[EngineEvent::ChallengeJoined {
            user_id: user_id.to_string(),
            challenge_id: challenge_id.to_string(),
        }]);
        Ok(to_user_challenge(&assignment, user_id, challenge_id))
    }

    /// Verify `evidence` and complete the challenge at `at`
    ///
    /// Completion after the window has closed fails with `ChallengeClosed`.
    pub async fn complete_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
        evidence: &Value,
        at: DateTime<Utc>,
    ) -> EngineResult<ChallengeCompletion> {
        let challenge = self.definition(challenge_id)?;
        if at.timestamp_millis() > challenge.end_date {
            return Err(EngineError::ChallengeClosed {
                challenge_id: challenge_id.to_string(),
                reason: ClosedReason::Ended,
            });
        }

        let reward = TaskReward {
            kind: TaskKind::Challenge,
            task_id: &challenge.challenge_id,
            xp_reward: challenge.xp_reward,
            badge_reward: challenge.badge_reward.as_deref(),
            requirements: &challenge.requirements,
        };
        let completion = complete_task(&self.ctx, user_id, reward, evidence).await?;

        Ok(ChallengeCompletion {
            user_challenge: to_user_challenge(&completion.assignment, user_id, challenge_id),
            award: completion.award,
            badge_unlocked: completion.badge.map(|b| b.badge_id),
            already_completed: false,
            events: completion.events,
        })
    }

    pub fn participants(&self, challenge_id: &str) -> EngineResult<i64> {
        self.ctx.db.read(|conn| participant_count(conn, challenge_id))
    }

    pub fn user_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
    ) -> EngineResult<Option<UserChallenge>> {
        let assignment = self
            .ctx
            .db
            .read(|conn| load_assignment(conn, TaskKind::Challenge, user_id, challenge_id))?;
        Ok(assignment.map(|a| to_user_challenge(&a, user_id, challenge_id)))
    }

    pub fn user_challenges(&self, user_id: &str) -> EngineResult<Vec<UserChallenge>> {
        let rows = self
            .ctx
            .db
            .read(|conn| load_assignments(conn, TaskKind::Challenge, user_id))?;
        Ok(rows
            .iter()
            .map(|(challenge_id, a)| to_user_challenge(a, user_id, challenge_id))
            .collect())
    }
}

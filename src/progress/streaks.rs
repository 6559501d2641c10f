//! Streak tracking system
//!
//! One counter per user per streak type (login, learning, ...). Days are
//! compared in the engine's reference zone (see [`DayBoundary`]).

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, error};

use super::EngineContext;
use super::day::{DayBoundary, format_day, now_ms, parse_day};
use super::db::{load_progression, touch_progression};
use super::error::{EngineError, EngineResult};
use super::events::EngineEvent;
use super::models::StreakRecord;
use super::retry::with_conflict_retry;

/// Well-known streak types
pub const LOGIN_STREAK: &str = "login";
pub const LEARNING_STREAK: &str = "learning";

/// What an activity did to the streak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StreakChange {
    /// First activity ever for this type
    Started,
    /// Activity on the day after the last one
    Extended,
    /// Gap of two or more days; counting restarts at 1
    Reset,
    /// Already counted today
    SameDay,
}

/// Result of recording an activity
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakUpdate {
    pub record: StreakRecord,
    pub change: StreakChange,
    /// The longest streak grew with this activity
    pub is_new_longest: bool,
    /// Count before this activity (0 for a first activity)
    pub previous_streak: u32,
}

impl StreakUpdate {
    pub(crate) fn events(&self) -> Vec<EngineEvent> {
        let user_id = self.record.user_id.clone();
        let streak_type = self.record.streak_type.clone();
        let mut events = Vec::new();
        match self.change {
            StreakChange::Started | StreakChange::Extended => {
                events.push(EngineEvent::StreakExtended {
                    user_id: user_id.clone(),
                    streak_type: streak_type.clone(),
                    count: self.record.current_streak,
                });
            }
            StreakChange::Reset => events.push(EngineEvent::StreakReset {
                user_id: user_id.clone(),
                streak_type: streak_type.clone(),
                previous: self.previous_streak,
            }),
            StreakChange::SameDay => {}
        }
        if self.is_new_longest {
            events.push(EngineEvent::NewLongestStreak {
                user_id,
                streak_type,
                longest: self.record.longest_streak,
            });
        }
        events
    }
}

/// Apply the day-boundary rules to the previous record
///
/// The first activity is not reported as a new longest streak; only growth
/// past an earlier best is.
pub fn next_streak(
    previous: Option<&StreakRecord>,
    user_id: &str,
    streak_type: &str,
    day: NaiveDate,
) -> EngineResult<StreakUpdate> {
    let Some(prev) = previous else {
        return Ok(StreakUpdate {
            record: StreakRecord {
                user_id: user_id.to_string(),
                streak_type: streak_type.to_string(),
                current_streak: 1,
                longest_streak: 1,
                last_activity_date: day,
            },
            change: StreakChange::Started,
            is_new_longest: false,
            previous_streak: 0,
        });
    };

    let gap = (day - prev.last_activity_date).num_days();
    let mut record = prev.clone();
    let change = match gap {
        g if g < 0 => {
            return Err(EngineError::OutOfOrderEvent {
                streak_type: streak_type.to_string(),
                last: prev.last_activity_date,
                attempted: day,
            });
        }
        0 => StreakChange::SameDay,
        1 => {
            record.current_streak = prev.current_streak.saturating_add(1);
            StreakChange::Extended
        }
        _ => {
            record.current_streak = 1;
            StreakChange::Reset
        }
    };

    if change != StreakChange::SameDay {
        record.last_activity_date = day;
    }
    record.longest_streak = record.longest_streak.max(record.current_streak);

    Ok(StreakUpdate {
        is_new_longest: record.longest_streak > prev.longest_streak,
        previous_streak: prev.current_streak,
        record,
        change,
    })
}

/// Maintains streak records
#[derive(Clone)]
pub struct StreakTracker {
    ctx: Arc<EngineContext>,
}

impl StreakTracker {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Reference zone used to turn instants into days
    pub fn day_boundary(&self) -> DayBoundary {
        self.ctx.days
    }

    /// Record activity at an instant, normalized to the engine's day boundary
    pub fn record_activity_at(
        &self,
        user_id: &str,
        streak_type: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<StreakUpdate> {
        self.record_activity(user_id, streak_type, self.ctx.days.day_of(at))
    }

    /// Record activity on an already-normalized calendar day
    pub fn record_activity(
        &self,
        user_id: &str,
        streak_type: &str,
        day: NaiveDate,
    ) -> EngineResult<StreakUpdate> {
        if streak_type.trim().is_empty() {
            return Err(EngineError::InvalidInput("streak type must not be empty".into()));
        }

        let result = with_conflict_retry(self.ctx.retry, "record_activity", || {
            let (current, existing) = self.ctx.db.read(|conn| {
                Ok((
                    load_progression(conn, user_id)?,
                    load_streak(conn, user_id, streak_type)?,
                ))
            })?;

            let update = next_streak(existing.as_ref(), user_id, streak_type, day)?;
            if update.change == StreakChange::SameDay {
                return Ok(update);
            }

            self.ctx.db.write(|tx| {
                let now = now_ms();
                save_streak(tx, &update.record, now)?;
                touch_progression(tx, &current, now)?;
                Ok(update)
            })
        });

        match &result {
            Ok(update) if update.change == StreakChange::SameDay => {
                debug!(
                    "[questlog:streak] {} already counted {} on {}",
                    streak_type, user_id, day
                );
            }
            Ok(update) => {
                debug!(
                    "[questlog:streak] {} {} streak now {} ({:?})",
                    user_id, streak_type, update.record.current_streak, update.change
                );
                self.ctx.publish(&update.events());
            }
            Err(err @ EngineError::OutOfOrderEvent { .. }) => {
                error!("[questlog:streak] {} for {}", err, user_id);
            }
            Err(_) => {}
        }
        result
    }

    pub fn get(&self, user_id: &str, streak_type: &str) -> EngineResult<Option<StreakRecord>> {
        self.ctx
            .db
            .read(|conn| load_streak(conn, user_id, streak_type))
    }

    /// All streaks for a user, by type
    pub fn all(&self, user_id: &str) -> EngineResult<Vec<StreakRecord>> {
        self.ctx.db.read(|conn| {
            let mut stmt = conn.prepare(
                r#"SELECT streak_type, current_streak, longest_streak, last_activity_day
                   FROM streaks WHERE user_id = ?1 ORDER BY streak_type"#,
            )?;
            let rows = stmt
                .query_map([user_id], |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, u32>(1)?,
                        r.get::<_, u32>(2)?,
                        r.get::<_, String>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(streak_type, current, longest, day)| {
                    to_record(user_id, streak_type, current, longest, &day)
                })
                .collect()
        })
    }
}

fn to_record(
    user_id: &str,
    streak_type: String,
    current: u32,
    longest: u32,
    day: &str,
) -> EngineResult<StreakRecord> {
    let last_activity_date = parse_day(day).ok_or_else(|| {
        EngineError::InvalidInput(format!("stored streak day '{day}' is malformed"))
    })?;
    Ok(StreakRecord {
        user_id: user_id.to_string(),
        streak_type,
        current_streak: current,
        longest_streak: longest,
        last_activity_date,
    })
}

pub(crate) fn load_streak(
    conn: &Connection,
    user_id: &str,
    streak_type: &str,
) -> EngineResult<Option<StreakRecord>> {
    let row = conn
        .query_row(
            r#"SELECT current_streak, longest_streak, last_activity_day
               FROM streaks WHERE user_id = ?1 AND streak_type = ?2"#,
            [user_id, streak_type],
            |r| Ok((r.get::<_, u32>(0)?, r.get::<_, u32>(1)?, r.get::<_, String>(2)?)),
        )
        .optional()?;

    row.map(|(current, longest, day)| {
        to_record(user_id, streak_type.to_string(), current, longest, &day)
    })
    .transpose()
}

pub(crate) fn save_streak(conn: &Connection, record: &StreakRecord, now: i64) -> EngineResult<()> {
    conn.execute(
        r#"
        INSERT INTO streaks (user_id, streak_type, current_streak, longest_streak, last_activity_day, updated_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        ON CONFLICT(user_id, streak_type) DO UPDATE SET
            current_streak = ?3, longest_streak = ?4, last_activity_day = ?5, updated_at = ?6
        "#,
        rusqlite::params![
            record.user_id,
            record.streak_type,
            record.current_streak,
            record.longest_streak,
            format_day(record.last_activity_date),
            now,
        ],
    )?;
    Ok(())
}

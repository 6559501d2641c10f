//! Leaderboard - a read model over `user_progression`
//!
//! Nothing here writes. Rankings are computed on every call from the
//! authoritative aggregates, so they can never drift from them.

use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use super::EngineContext;
use super::error::{EngineError, EngineResult};
use super::models::LeaderboardEntry;

/// Which users to rank
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardScope {
    /// Everyone, top `limit` rows
    Global { limit: u32 },
    /// A cohort (friends, a class); ranks are relative to the cohort
    Users(Vec<String>),
}

/// Ranking by total XP earned
///
/// Ties go to the earlier account, then to the lower user id.
#[derive(Clone)]
pub struct Leaderboard {
    ctx: Arc<EngineContext>,
}

const ORDER: &str = "ORDER BY total_xp_earned DESC, created_at ASC, user_id ASC";

impl Leaderboard {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub fn rank(&self, scope: &LeaderboardScope) -> EngineResult<Vec<LeaderboardEntry>> {
        let rows = self.ctx.db.read(|conn| match scope {
            LeaderboardScope::Global { limit } => ranked_rows(
                conn,
                &format!("SELECT user_id, total_xp_earned FROM user_progression {ORDER} LIMIT ?1"),
                rusqlite::params![limit],
            ),
            LeaderboardScope::Users(ids) => {
                if ids.is_empty() {
                    return Ok(Vec::new());
                }
                let placeholders = vec!["?"; ids.len()].join(", ");
                ranked_rows(
                    conn,
                    &format!(
                        "SELECT user_id, total_xp_earned FROM user_progression WHERE user_id IN ({placeholders}) {ORDER}"
                    ),
                    rusqlite::params_from_iter(ids.iter()),
                )
            }
        })?;

        let curve = self.ctx.levels.as_ref();
        rows.into_iter()
            .enumerate()
            .map(|(i, (user_id, total_xp_earned))| -> EngineResult<LeaderboardEntry> {
                Ok(LeaderboardEntry {
                    rank: leaderboard_rank(i)?,
                    level: curve.level_of(total_xp_earned),
                    user_id,
                    total_xp_earned,
                })
            })
            .collect()
    }

    /// A user's global position, or None if they have no progression yet
    pub fn position_of(&self, user_id: &str) -> EngineResult<Option<LeaderboardEntry>> {
        let row = self.ctx.db.read(|conn| {
            let mine = conn
                .query_row(
                    "SELECT total_xp_earned, created_at FROM user_progression WHERE user_id = ?1",
                    [user_id],
                    |r| Ok((r.get::<_, i64>(0)?, r.get::<_, i64>(1)?)),
                )
                .optional()?;
            let Some((total, created_at)) = mine else {
                return Ok(None);
            };

            let ahead: i64 = conn.query_row(
                r#"SELECT COUNT(*) FROM user_progression
                   WHERE total_xp_earned > ?1
                      OR (total_xp_earned = ?1 AND created_at < ?2)
                      OR (total_xp_earned = ?1 AND created_at = ?2 AND user_id < ?3)"#,
                rusqlite::params![total, created_at, user_id],
                |r| r.get(0),
            )?;
            Ok(Some((total, ahead)))
        })?;

        row.map(|(total_xp_earned, ahead)| {
            Ok(LeaderboardEntry {
                rank: leaderboard_rank(usize::try_from(ahead).unwrap_or(usize::MAX))?,
                user_id: user_id.to_string(),
                total_xp_earned,
                level: self.ctx.levels.level_of(total_xp_earned),
            })
        })
        .transpose()
    }
}

/// 1-based rank for a 0-based position
fn leaderboard_rank(position: usize) -> EngineResult<u32> {
    u32::try_from(position)
        .ok()
        .and_then(|p| p.checked_add(1))
        .ok_or_else(|| EngineError::InvalidInput("leaderboard too large".into()))
}

fn ranked_rows(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> EngineResult<Vec<(String, i64)>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, |r| Ok((r.get(0)?, r.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

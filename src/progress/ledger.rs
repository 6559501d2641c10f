//! XP Ledger - applies XP-granting events to a user's aggregate
//!
//! Each award is keyed by an idempotency key; the ledger row and the
//! version-guarded aggregate update land in one transaction, so an event is
//! either applied exactly once or not at all.

use std::sync::Arc;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, info};

use super::EngineContext;
use super::db::{commit_progression, is_constraint_violation};
use super::day::now_ms;
use super::error::{EngineError, EngineResult};
use super::events::{EngineEvent, LevelUp};
use super::levels::LevelCurve;
use super::models::{LedgerEntry, ProgressionSnapshot, UserProgression};
use super::retry::with_conflict_retry;

/// Result of an applied award
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XpAward {
    pub progression: ProgressionSnapshot,
    pub amount: i64,
    pub previous_level: u32,
    pub leveled_up: bool,
    /// Present only when the level increased
    pub new_level: Option<u32>,
}

impl XpAward {
    pub(crate) fn events(&self, reason: &str, key: &str, curve: &dyn LevelCurve) -> Vec<EngineEvent> {
        let user_id = &self.progression.user_id;
        let mut events = vec![EngineEvent::XpAwarded {
            user_id: user_id.clone(),
            amount: self.amount,
            reason: reason.to_string(),
            idempotency_key: key.to_string(),
        }];
        if let Some(new_level) = self.new_level {
            events.push(EngineEvent::LevelUp(LevelUp {
                user_id: user_id.clone(),
                old_level: self.previous_level,
                new_level,
                new_title: curve.title(new_level),
            }));
        }
        events
    }
}

/// Writes XP awards
#[derive(Clone)]
pub struct XpLedger {
    ctx: Arc<EngineContext>,
}

impl XpLedger {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Award `amount` XP once per `idempotency_key`
    ///
    /// Fails with `DuplicateEvent` when the key was already applied and with
    /// `Conflict` once the retry budget is spent.
    pub fn award_xp(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        idempotency_key: &str,
    ) -> EngineResult<XpAward> {
        validate_award(amount, idempotency_key)?;
        let curve = self.ctx.levels.as_ref();

        let result = with_conflict_retry(self.ctx.retry, "award_xp", || {
            let current = self.ctx.db.load_progression(user_id)?;
            self.ctx.db.write(|tx| {
                apply_award(tx, &current, amount, reason, idempotency_key, curve, now_ms())
            })
        });

        match &result {
            Ok(award) => {
                info!(
                    "[questlog:xp] +{} XP to {} ({}), total {}",
                    amount, user_id, reason, award.progression.total_xp_earned
                );
                self.ctx.publish(&award.events(reason, idempotency_key, curve));
            }
            Err(err) if err.is_benign() => {
                debug!("[questlog:xp] {}", err);
            }
            Err(_) => {}
        }
        result
    }

    /// True if an award with this key was already applied
    pub fn has_applied(&self, user_id: &str, idempotency_key: &str) -> EngineResult<bool> {
        self.ctx
            .db
            .read(|conn| ledger_has_key(conn, user_id, idempotency_key))
    }

    /// Current aggregate with derived level
    pub fn snapshot(&self, user_id: &str) -> EngineResult<ProgressionSnapshot> {
        let current = self.ctx.db.load_progression(user_id)?;
        Ok(current.snapshot(self.ctx.levels.as_ref()))
    }

    /// Applied awards, oldest first
    pub fn history(&self, user_id: &str) -> EngineResult<Vec<LedgerEntry>> {
        self.ctx.db.read(|conn| {
            let mut stmt = conn.prepare(
                r#"SELECT idempotency_key, amount, reason, created_at
                   FROM xp_ledger WHERE user_id = ?1 ORDER BY id ASC"#,
            )?;
            let entries = stmt
                .query_map([user_id], |r| {
                    Ok(LedgerEntry {
                        user_id: user_id.to_string(),
                        idempotency_key: r.get(0)?,
                        amount: r.get(1)?,
                        reason: r.get(2)?,
                        created_at: r.get(3)?,
                    })
                })?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(entries)
        })
    }
}

pub(crate) fn validate_award(amount: i64, idempotency_key: &str) -> EngineResult<()> {
    if amount <= 0 {
        return Err(EngineError::InvalidAmount(amount));
    }
    if idempotency_key.trim().is_empty() {
        return Err(EngineError::InvalidInput(
            "idempotency key must not be empty".into(),
        ));
    }
    Ok(())
}

pub(crate) fn ledger_has_key(conn: &Connection, user_id: &str, key: &str) -> EngineResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM xp_ledger WHERE user_id = ?1 AND idempotency_key = ?2)",
        [user_id, key],
        |r| r.get(0),
    )?;
    Ok(exists)
}

/// Append a ledger row and bump the aggregate inside an open transaction
pub(crate) fn apply_award(
    tx: &rusqlite::Transaction<'_>,
    current: &UserProgression,
    amount: i64,
    reason: &str,
    idempotency_key: &str,
    curve: &dyn LevelCurve,
    now: i64,
) -> EngineResult<XpAward> {
    let duplicate = || EngineError::DuplicateEvent {
        user_id: current.user_id.clone(),
        key: idempotency_key.to_string(),
    };

    if ledger_has_key(tx, &current.user_id, idempotency_key)? {
        return Err(duplicate());
    }

    let (Some(total), Some(spendable)) = (
        current.total_xp_earned.checked_add(amount),
        current.spendable_xp.checked_add(amount),
    ) else {
        return Err(EngineError::InvalidAmount(amount));
    };

    tx.execute(
        r#"INSERT INTO xp_ledger (user_id, idempotency_key, amount, reason, created_at)
           VALUES (?1, ?2, ?3, ?4, ?5)"#,
        rusqlite::params![current.user_id, idempotency_key, amount, reason, now],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            duplicate()
        } else {
            EngineError::from(e)
        }
    })?;

    let stored = commit_progression(tx, current, total, spendable, now)?;

    let previous_level = curve.level_of(current.total_xp_earned);
    let level = curve.level_of(stored.total_xp_earned);
    let leveled_up = level > previous_level;

    Ok(XpAward {
        progression: stored.snapshot(curve),
        amount,
        previous_level,
        leveled_up,
        new_level: leveled_up.then_some(level),
    })
}

#[cfg(test)]
mod tests {
    use super::super::test_support::engine_context;
    use super::*;

    #[test]
    fn test_award_accumulates_and_levels() {
        let (_dir, ctx) = engine_context();
        let ledger = XpLedger::new(ctx);

        let first = ledger.award_xp("u1", 30, "lesson", "lesson:1").unwrap();
        assert_eq!(first.progression.total_xp_earned, 30);
        assert_eq!(first.progression.current_level, 1);
        assert!(!first.leveled_up);
        assert_eq!(first.new_level, None);

        let second = ledger.award_xp("u1", 30, "lesson", "lesson:2").unwrap();
        assert_eq!(second.progression.total_xp_earned, 60);
        assert_eq!(second.progression.spendable_xp, 60);
        assert!(second.leveled_up);
        assert_eq!(second.new_level, Some(2));
        assert_eq!(second.progression.version, 2);
    }

    #[test]
    fn test_duplicate_key_is_rejected() {
        let (_dir, ctx) = engine_context();
        let ledger = XpLedger::new(ctx);

        ledger.award_xp("u1", 50, "daily login", "login:2026-10-19").unwrap();
        let err = ledger
            .award_xp("u1", 50, "daily login", "login:2026-10-19")
            .unwrap_err();
        assert!(matches!(err, EngineError::DuplicateEvent { .. }));
        assert!(err.is_benign());

        let snap = ledger.snapshot("u1").unwrap();
        assert_eq!(snap.total_xp_earned, 50);
        assert_eq!(ledger.history("u1").unwrap().len(), 1);
    }

    #[test]
    fn test_same_key_for_different_users() {
        let (_dir, ctx) = engine_context();
        let ledger = XpLedger::new(ctx);

        ledger.award_xp("u1", 10, "event", "launch-day").unwrap();
        ledger.award_xp("u2", 10, "event", "launch-day").unwrap();
        assert!(ledger.has_applied("u1", "launch-day").unwrap());
        assert!(!ledger.has_applied("u3", "launch-day").unwrap());
    }

    #[test]
    fn test_invalid_amount() {
        let (_dir, ctx) = engine_context();
        let ledger = XpLedger::new(ctx);
        assert!(matches!(
            ledger.award_xp("u1", 0, "nothing", "k"),
            Err(EngineError::InvalidAmount(0))
        ));
        assert!(matches!(
            ledger.award_xp("u1", -5, "negative", "k"),
            Err(EngineError::InvalidAmount(-5))
        ));
        assert_eq!(ledger.snapshot("u1").unwrap().version, 0);
    }

    #[test]
    fn test_stale_snapshot_conflicts() {
        let (_dir, ctx) = engine_context();
        let ledger = XpLedger::new(ctx.clone());
        ledger.award_xp("u1", 10, "seed", "seed").unwrap();

        let stale = ctx.db.load_progression("u1").unwrap();
        ledger.award_xp("u1", 10, "other", "other").unwrap();

        let err = ctx
            .db
            .write(|tx| apply_award(tx, &stale, 5, "late", "late", ctx.levels.as_ref(), 0))
            .unwrap_err();
        assert!(matches!(err, EngineError::Conflict { .. }));
        // Rolled back: the ledger row from the failed attempt is gone
        assert!(!ledger.has_applied("u1", "late").unwrap());
    }
}

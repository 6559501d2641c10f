//! Badge outbox
//!
//! A badge unlock is written in the same transaction as the completion that
//! earned it, so it happens exactly once per user and badge. Delivery to the
//! achievement collaborator happens after commit and may be retried.

use std::sync::Arc;

use futures::future::join_all;
use rusqlite::{Connection, Row};
use tracing::{info, warn};

use super::EngineContext;
use super::day::now_ms;
use super::error::EngineResult;
use super::models::BadgeUnlock;
use super::retry::with_timeout;

/// Delivers recorded badge unlocks to the [`BadgeSink`](super::BadgeSink)
#[derive(Clone)]
pub struct BadgeOutbox {
    ctx: Arc<EngineContext>,
}

impl BadgeOutbox {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Hand one unlock to the sink and mark it delivered
    pub async fn deliver(&self, unlock: &BadgeUnlock) -> EngineResult<()> {
        with_timeout(
            self.ctx.collaborator_timeout,
            "badge unlock",
            self.ctx.badges.unlock(&unlock.user_id, &unlock.badge_id),
        )
        .await?;

        self.ctx.db.write(|tx| {
            tx.execute(
                r#"UPDATE badge_unlocks SET delivered_at = ?1
                   WHERE user_id = ?2 AND badge_id = ?3 AND delivered_at IS NULL"#,
                rusqlite::params![now_ms(), unlock.user_id, unlock.badge_id],
            )?;
            Ok(())
        })
    }

    /// Deliver, logging instead of failing; the unlock stays pending on error
    pub(crate) async fn deliver_or_log(&self, unlock: &BadgeUnlock) -> bool {
        match self.deliver(unlock).await {
            Ok(()) => true,
            Err(err) => {
                warn!(
                    "[questlog:badge] Delivery of '{}' to {} deferred: {}",
                    unlock.badge_id, unlock.user_id, err
                );
                false
            }
        }
    }

    /// Retry every undelivered unlock; returns how many went through
    pub async fn redeliver_pending(&self) -> EngineResult<usize> {
        let pending = self.pending()?;
        if pending.is_empty() {
            return Ok(0);
        }

        let results = join_all(pending.iter().map(|unlock| self.deliver_or_log(unlock))).await;
        let delivered = results.into_iter().filter(|ok| *ok).count();
        info!(
            "[questlog:badge] Redelivered {}/{} pending badge unlocks",
            delivered,
            pending.len()
        );
        Ok(delivered)
    }

    /// Unlocks not yet acknowledged by the sink, oldest first
    pub fn pending(&self) -> EngineResult<Vec<BadgeUnlock>> {
        self.query(
            "WHERE delivered_at IS NULL ORDER BY unlocked_at, user_id, badge_id",
            [],
        )
    }

    pub fn for_user(&self, user_id: &str) -> EngineResult<Vec<BadgeUnlock>> {
        self.query("WHERE user_id = ?1 ORDER BY unlocked_at, badge_id", [user_id])
    }

    fn query(&self, clause: &str, params: impl rusqlite::Params) -> EngineResult<Vec<BadgeUnlock>> {
        self.ctx.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT user_id, badge_id, source, unlocked_at, delivered_at FROM badge_unlocks {clause}"
            ))?;
            let rows = stmt
                .query_map(params, badge_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn badge_row(r: &Row<'_>) -> rusqlite::Result<BadgeUnlock> {
    Ok(BadgeUnlock {
        user_id: r.get(0)?,
        badge_id: r.get(1)?,
        source: r.get(2)?,
        unlocked_at: r.get(3)?,
        delivered_at: r.get(4)?,
    })
}

/// Record an unlock inside an open transaction; None if the user already had it
pub(crate) fn record_unlock(
    conn: &Connection,
    user_id: &str,
    badge_id: &str,
    source: &str,
    now: i64,
) -> EngineResult<Option<BadgeUnlock>> {
    let inserted = conn.execute(
        r#"INSERT OR IGNORE INTO badge_unlocks (user_id, badge_id, source, unlocked_at)
           VALUES (?1, ?2, ?3, ?4)"#,
        rusqlite::params![user_id, badge_id, source, now],
    )?;

    Ok((inserted == 1).then(|| BadgeUnlock {
        user_id: user_id.to_string(),
        badge_id: badge_id.to_string(),
        source: source.to_string(),
        unlocked_at: now,
        delivered_at: None,
    }))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{FlakyBadgeSink, engine_context_with};
    use super::*;

    #[tokio::test]
    async fn test_unlock_recorded_once() {
        let (_dir, ctx) = engine_context_with(|_| {});
        let first = ctx
            .db
            .write(|tx| record_unlock(tx, "u1", "first-steps", "quest:q1", 10))
            .unwrap();
        assert!(first.is_some());

        let again = ctx
            .db
            .write(|tx| record_unlock(tx, "u1", "first-steps", "quest:q2", 20))
            .unwrap();
        assert!(again.is_none());

        let outbox = BadgeOutbox::new(ctx);
        let mine = outbox.for_user("u1").unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].source, "quest:q1");
    }

    #[tokio::test]
    async fn test_failed_delivery_stays_pending() {
        let sink = Arc::new(FlakyBadgeSink::failing_first(1));
        let sink_for_ctx = sink.clone();
        let (_dir, ctx) = engine_context_with(move |c| c.badges = sink_for_ctx);

        let unlock = ctx
            .db
            .write(|tx| record_unlock(tx, "u1", "sprinter", "challenge:c1", 10))
            .unwrap()
            .unwrap();

        let outbox = BadgeOutbox::new(ctx);
        assert!(!outbox.deliver_or_log(&unlock).await);
        assert_eq!(outbox.pending().unwrap().len(), 1);

        assert_eq!(outbox.redeliver_pending().await.unwrap(), 1);
        assert!(outbox.pending().unwrap().is_empty());
        assert_eq!(sink.delivered(), vec![("u1".to_string(), "sprinter".to_string())]);

        let mine = outbox.for_user("u1").unwrap();
        assert!(mine[0].delivered_at.is_some());
    }
}

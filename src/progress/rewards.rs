//! Reward store
//!
//! A purchase reads the balance and the item inside the same immediate
//! transaction that debits them, so concurrent purchases are serialized and
//! `spendable_xp` can never go negative.

use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension, Row, Transaction};
use serde::Serialize;
use tracing::{debug, info};

use super::EngineContext;
use super::catalog::{load_reward_item, not_found};
use super::day::now_ms;
use super::db::{commit_progression, is_constraint_violation, load_progression};
use super::error::{EngineError, EngineResult};
use super::events::EngineEvent;
use super::levels::LevelCurve;
use super::models::{ProgressionSnapshot, UserReward};
use super::retry::with_conflict_retry;

/// Result of a successful purchase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Redemption {
    pub reward: UserReward,
    pub progression: ProgressionSnapshot,
    /// Stock left after this purchase; None when untracked
    pub remaining_stock: Option<i64>,
    pub events: Vec<EngineEvent>,
}

/// Sells reward items for spendable XP
#[derive(Clone)]
pub struct RewardStore {
    ctx: Arc<EngineContext>,
}

impl RewardStore {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    /// Buy one unit of `item_id`
    ///
    /// Checks run in this order: the item must exist and be active
    /// (`NotFound`), the balance must cover the cost (`InsufficientBalance`,
    /// with the shortfall), and tracked stock must be above zero (`OutOfStock`).
    pub fn purchase(&self, user_id: &str, item_id: &str) -> EngineResult<Redemption> {
        let prefix = self.ctx.code_prefix.as_str();
        let curve = self.ctx.levels.as_ref();

        let (reward, stored, remaining_stock) =
            with_conflict_retry(self.ctx.retry, "purchase", || {
                let code = generate_redemption_code(prefix);
                self.ctx
                    .db
                    .write(|tx| apply_purchase(tx, user_id, item_id, &code, curve, now_ms()))
            })?;

        info!(
            "[questlog:store] {} redeemed '{}' for {} XP ({}), {} XP left",
            user_id, item_id, reward.xp_spent, reward.redemption_code, stored.spendable_xp
        );

        let events = vec![EngineEvent::RewardRedeemed {
            user_id: user_id.to_string(),
            item_id: item_id.to_string(),
            xp_spent: reward.xp_spent,
            redemption_code: reward.redemption_code.clone(),
        }];
        self.ctx.publish(&events);

        Ok(Redemption {
            reward,
            progression: stored,
            remaining_stock,
            events,
        })
    }

    /// A user's redemptions, newest first
    pub fn redemptions(&self, user_id: &str) -> EngineResult<Vec<UserReward>> {
        self.ctx.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{REWARD_SELECT} WHERE user_id = ?1 ORDER BY purchased_at DESC, reward_id"
            ))?;
            let rows = stmt
                .query_map([user_id], reward_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Look up a redemption by the code handed to the user
    pub fn find_by_code(&self, redemption_code: &str) -> EngineResult<Option<UserReward>> {
        self.ctx.db.read(|conn| {
            Ok(conn
                .query_row(
                    &format!("{REWARD_SELECT} WHERE redemption_code = ?1"),
                    [redemption_code],
                    reward_row,
                )
                .optional()?)
        })
    }
}

const REWARD_SELECT: &str = r#"SELECT reward_id, user_id, item_id, xp_spent, redemption_code, purchased_at
   FROM user_rewards"#;

fn reward_row(r: &Row<'_>) -> rusqlite::Result<UserReward> {
    Ok(UserReward {
        reward_id: r.get(0)?,
        user_id: r.get(1)?,
        item_id: r.get(2)?,
        xp_spent: r.get(3)?,
        redemption_code: r.get(4)?,
        purchased_at: r.get(5)?,
    })
}

/// Check-and-debit inside an open immediate transaction
fn apply_purchase(
    tx: &Transaction<'_>,
    user_id: &str,
    item_id: &str,
    code: &str,
    curve: &dyn LevelCurve,
    now: i64,
) -> EngineResult<(UserReward, ProgressionSnapshot, Option<i64>)> {
    let current = load_progression(tx, user_id)?;
    let item = load_reward_item(tx, item_id)?
        .filter(|item| item.active)
        .ok_or_else(|| not_found("reward item", item_id))?;

    if current.spendable_xp < item.xp_cost {
        return Err(EngineError::InsufficientBalance {
            cost: item.xp_cost,
            available: current.spendable_xp,
            shortfall: item.xp_cost - current.spendable_xp,
        });
    }

    let remaining_stock = match item.stock_quantity {
        Some(_) => Some(take_one(tx, item_id)?),
        None => None,
    };

    if code_exists(tx, code)? {
        debug!("[questlog:store] redemption code collision, regenerating");
        return Err(EngineError::Conflict {
            user_id: user_id.to_string(),
        });
    }

    let reward = UserReward {
        reward_id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        item_id: item_id.to_string(),
        xp_spent: item.xp_cost,
        redemption_code: code.to_string(),
        purchased_at: now,
    };
    tx.execute(
        r#"INSERT INTO user_rewards (reward_id, user_id, item_id, xp_spent, redemption_code, purchased_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6)"#,
        rusqlite::params![
            reward.reward_id,
            reward.user_id,
            reward.item_id,
            reward.xp_spent,
            reward.redemption_code,
            reward.purchased_at
        ],
    )
    .map_err(|e| {
        if is_constraint_violation(&e) {
            EngineError::Conflict {
                user_id: user_id.to_string(),
            }
        } else {
            EngineError::from(e)
        }
    })?;

    let stored = commit_progression(
        tx,
        &current,
        current.total_xp_earned,
        current.spendable_xp - item.xp_cost,
        now,
    )?;

    Ok((reward, stored.snapshot(curve), remaining_stock))
}

/// Decrement tracked stock; zero rows changed means it was already gone
fn take_one(conn: &Connection, item_id: &str) -> EngineResult<i64> {
    let changed = conn.execute(
        r#"UPDATE reward_items SET stock_quantity = stock_quantity - 1
           WHERE item_id = ?1 AND stock_quantity > 0"#,
        [item_id],
    )?;
    if changed == 0 {
        return Err(EngineError::OutOfStock {
            item_id: item_id.to_string(),
        });
    }
    Ok(conn.query_row(
        "SELECT stock_quantity FROM reward_items WHERE item_id = ?1",
        [item_id],
        |r| r.get(0),
    )?)
}

fn code_exists(conn: &Connection, code: &str) -> EngineResult<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM user_rewards WHERE redemption_code = ?1)",
        [code],
        |r| r.get(0),
    )?)
}

/// `<PREFIX>-<base36 millis>-<8 random hex digits>`, e.g. `RWD-MGX3K2Q1-9F03A1C7`
pub fn generate_redemption_code(prefix: &str) -> String {
    let millis = u64::try_from(now_ms()).unwrap_or_default();
    format!("{}-{}-{}", prefix, to_base36(millis), random_suffix())
}

fn random_suffix() -> String {
    let mut bytes = [0u8; 4];
    if getrandom::getrandom(&mut bytes).is_err() {
        // OS RNG unavailable: fall back to a v4 uuid's leading bytes
        bytes.copy_from_slice(&uuid::Uuid::new_v4().as_bytes()[..4]);
    }
    bytes.iter().map(|b| format!("{b:02X}")).collect()
}

fn to_base36(mut n: u64) -> String {
    const DIGITS: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if n == 0 {
        return "0".to_string();
    }
    let mut out = Vec::new();
    while n > 0 {
        out.push(DIGITS[(n % 36) as usize]);
        n /= 36;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

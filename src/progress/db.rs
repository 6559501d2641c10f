//! SQLite database connection and schema management for progression data
//!
//! Manages the `~/.questlog/progress.db` database with automatic schema migration.
//! Every write goes through [`ProgressDb::write`], which runs the closure in an
//! immediate transaction and rolls back on any error.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use anyhow::Context;
use rusqlite::{Connection, OptionalExtension, Transaction, TransactionBehavior};

use super::error::{EngineError, EngineResult};
use super::models::UserProgression;

/// Database wrapper shared by all engine components
#[derive(Clone)]
pub struct ProgressDb {
    conn: Arc<Mutex<Connection>>,
}

impl ProgressDb {
    /// Open or create the database at a specific path
    pub fn open(path: &Path, busy_timeout: Duration) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create data dir: {}", parent.display()))?;
        }

        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open progress db: {}", path.display()))?;

        // WAL lets leaderboard reads proceed while a writer holds the lock
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(busy_timeout)?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.init_schema()?;
        Ok(db)
    }

    /// Lock the connection
    pub(crate) fn conn(&self) -> EngineResult<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| EngineError::LockPoisoned)
    }

    /// Run a read-only closure against the connection
    pub fn read<T>(&self, f: impl FnOnce(&Connection) -> EngineResult<T>) -> EngineResult<T> {
        let conn = self.conn()?;
        f(&conn)
    }

    /// Run a closure inside an immediate transaction; commit only if it succeeds
    pub fn write<T>(&self, f: impl FnOnce(&Transaction<'_>) -> EngineResult<T>) -> EngineResult<T> {
        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let value = f(&tx)?;
        tx.commit()?;
        Ok(value)
    }

    /// Initialize the database schema
    fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute_batch(SCHEMA_SQL)?;
        drop(conn);
        self.run_migrations()?;
        Ok(())
    }

    /// Run any pending migrations
    fn run_migrations(&self) -> anyhow::Result<()> {
        let conn = self.conn()?;

        let version: i32 = conn
            .query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |r| r.get(0))
            .context("Failed to read schema version")?;

        // Migration 2: reward items can be retired without deleting them
        if version < 2 {
            let has_active = conn.query_row(
                "SELECT COUNT(*) FROM pragma_table_info('reward_items') WHERE name = 'active'",
                [],
                |r| r.get::<_, i32>(0),
            )? > 0;

            if !has_active {
                conn.execute_batch(
                    "ALTER TABLE reward_items ADD COLUMN active INTEGER NOT NULL DEFAULT 1;",
                )?;
            }
            conn.execute("INSERT OR REPLACE INTO schema_version VALUES (2)", [])?;
        }

        // Migration 3: badge outbox
        if version < 3 {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS badge_unlocks (
                    user_id TEXT NOT NULL,
                    badge_id TEXT NOT NULL,
                    source TEXT NOT NULL,
                    unlocked_at INTEGER NOT NULL,
                    delivered_at INTEGER,
                    PRIMARY KEY (user_id, badge_id)
                );
                CREATE INDEX IF NOT EXISTS idx_badge_pending ON badge_unlocks(delivered_at);
                "#,
            )?;
            conn.execute("INSERT OR REPLACE INTO schema_version VALUES (3)", [])?;
        }

        Ok(())
    }

    /// Load a user's aggregate, or an empty version-0 aggregate if none exists
    pub fn load_progression(&self, user_id: &str) -> EngineResult<UserProgression> {
        self.read(|conn| load_progression(conn, user_id))
    }

    /// Check the ledger invariants for one user
    pub fn audit(&self, user_id: &str) -> EngineResult<AuditReport> {
        self.read(|conn| {
            let progression = load_progression(conn, user_id)?;
            let ledger_total: i64 = conn.query_row(
                "SELECT COALESCE(SUM(amount), 0) FROM xp_ledger WHERE user_id = ?1",
                [user_id],
                |r| r.get(0),
            )?;
            let spent_total: i64 = conn.query_row(
                "SELECT COALESCE(SUM(xp_spent), 0) FROM user_rewards WHERE user_id = ?1",
                [user_id],
                |r| r.get(0),
            )?;
            Ok(AuditReport {
                total_matches_ledger: progression.total_xp_earned == ledger_total,
                spendable_matches_redemptions: progression.spendable_xp
                    == progression.total_xp_earned - spent_total,
                ledger_total,
                spent_total,
                progression,
            })
        })
    }
}

/// Result of [`ProgressDb::audit`]
#[derive(Debug, Clone)]
pub struct AuditReport {
    pub progression: UserProgression,
    pub ledger_total: i64,
    pub spent_total: i64,
    pub total_matches_ledger: bool,
    pub spendable_matches_redemptions: bool,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.total_matches_ledger && self.spendable_matches_redemptions
    }
}

pub(crate) fn load_progression(conn: &Connection, user_id: &str) -> EngineResult<UserProgression> {
    let row = conn
        .query_row(
            r#"SELECT total_xp_earned, spendable_xp, version, created_at, updated_at
               FROM user_progression WHERE user_id = ?1"#,
            [user_id],
            |r| {
                Ok(UserProgression {
                    user_id: user_id.to_string(),
                    total_xp_earned: r.get(0)?,
                    spendable_xp: r.get(1)?,
                    version: r.get(2)?,
                    created_at: r.get(3)?,
                    updated_at: r.get(4)?,
                })
            },
        )
        .optional()?;
    Ok(row.unwrap_or_else(|| UserProgression::empty(user_id)))
}

/// Write new balances for `expected.user_id`, but only if nobody else has
/// written since `expected` was read. Returns the stored aggregate.
pub(crate) fn commit_progression(
    tx: &Transaction<'_>,
    expected: &UserProgression,
    total_xp_earned: i64,
    spendable_xp: i64,
    now: i64,
) -> EngineResult<UserProgression> {
    debug_assert!(total_xp_earned >= expected.total_xp_earned);
    debug_assert!(spendable_xp >= 0);

    let changed = if expected.exists() {
        tx.execute(
            r#"UPDATE user_progression
               SET total_xp_earned = ?1, spendable_xp = ?2, version = version + 1, updated_at = ?3
               WHERE user_id = ?4 AND version = ?5"#,
            rusqlite::params![total_xp_earned, spendable_xp, now, expected.user_id, expected.version],
        )?
    } else {
        tx.execute(
            r#"INSERT INTO user_progression
               (user_id, total_xp_earned, spendable_xp, version, created_at, updated_at)
               VALUES (?1, ?2, ?3, 1, ?4, ?4)
               ON CONFLICT(user_id) DO NOTHING"#,
            rusqlite::params![expected.user_id, total_xp_earned, spendable_xp, now],
        )?
    };

    if changed == 0 {
        return Err(EngineError::Conflict {
            user_id: expected.user_id.clone(),
        });
    }

    Ok(UserProgression {
        user_id: expected.user_id.clone(),
        total_xp_earned,
        spendable_xp,
        version: expected.version + 1,
        created_at: if expected.exists() { expected.created_at } else { now },
        updated_at: now,
    })
}

/// Bump the version without touching balances (streak or quest state changes)
pub(crate) fn touch_progression(
    tx: &Transaction<'_>,
    expected: &UserProgression,
    now: i64,
) -> EngineResult<UserProgression> {
    commit_progression(tx, expected, expected.total_xp_earned, expected.spendable_xp, now)
}

/// True if a write failed on a UNIQUE or PRIMARY KEY constraint
pub(crate) fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _) if e.code == rusqlite::ErrorCode::ConstraintViolation
    )
}

/// SQL schema for the progress database
const SCHEMA_SQL: &str = r#"
-- Per-user aggregate; level is derived from total_xp_earned and never stored
CREATE TABLE IF NOT EXISTS user_progression (
    user_id TEXT PRIMARY KEY,
    total_xp_earned INTEGER NOT NULL DEFAULT 0 CHECK (total_xp_earned >= 0),
    spendable_xp INTEGER NOT NULL DEFAULT 0 CHECK (spendable_xp >= 0),
    version INTEGER NOT NULL DEFAULT 1,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_progression_rank
    ON user_progression(total_xp_earned DESC, created_at ASC, user_id ASC);

-- Append-only XP ledger, also the idempotency record
CREATE TABLE IF NOT EXISTS xp_ledger (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    idempotency_key TEXT NOT NULL,
    amount INTEGER NOT NULL CHECK (amount > 0),
    reason TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    UNIQUE (user_id, idempotency_key)
);
CREATE INDEX IF NOT EXISTS idx_ledger_user ON xp_ledger(user_id);

-- Streaks, one per user per streak type
CREATE TABLE IF NOT EXISTS streaks (
    user_id TEXT NOT NULL,
    streak_type TEXT NOT NULL,
    current_streak INTEGER NOT NULL,
    longest_streak INTEGER NOT NULL,
    last_activity_day TEXT NOT NULL,
    updated_at INTEGER NOT NULL,
    PRIMARY KEY (user_id, streak_type)
);

-- Quest definitions (content)
CREATE TABLE IF NOT EXISTS quests (
    quest_id TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    difficulty TEXT NOT NULL,
    xp_reward INTEGER NOT NULL CHECK (xp_reward >= 0),
    badge_reward TEXT,
    requirements TEXT NOT NULL DEFAULT 'null',
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user_quests (
    user_id TEXT NOT NULL,
    quest_id TEXT NOT NULL,
    status TEXT NOT NULL,
    xp_earned INTEGER,
    started_at INTEGER NOT NULL,
    completed_at INTEGER,
    PRIMARY KEY (user_id, quest_id)
);

-- Challenge definitions (content)
CREATE TABLE IF NOT EXISTS challenges (
    challenge_id TEXT PRIMARY KEY,
    title TEXT NOT NULL DEFAULT '',
    difficulty TEXT NOT NULL,
    xp_reward INTEGER NOT NULL CHECK (xp_reward >= 0),
    badge_reward TEXT,
    requirements TEXT NOT NULL DEFAULT 'null',
    start_date INTEGER NOT NULL,
    end_date INTEGER NOT NULL,
    max_participants INTEGER,
    updated_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS user_challenges (
    user_id TEXT NOT NULL,
    challenge_id TEXT NOT NULL,
    status TEXT NOT NULL,
    xp_earned INTEGER,
    joined_at INTEGER NOT NULL,
    completed_at INTEGER,
    PRIMARY KEY (user_id, challenge_id)
);
CREATE INDEX IF NOT EXISTS idx_user_challenges_challenge ON user_challenges(challenge_id);

-- Reward store catalog
CREATE TABLE IF NOT EXISTS reward_items (
    item_id TEXT PRIMARY KEY,
    name TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    xp_cost INTEGER NOT NULL CHECK (xp_cost > 0),
    stock_quantity INTEGER CHECK (stock_quantity IS NULL OR stock_quantity >= 0),
    updated_at INTEGER NOT NULL
);

-- Redemption records, immutable
CREATE TABLE IF NOT EXISTS user_rewards (
    reward_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    xp_spent INTEGER NOT NULL CHECK (xp_spent > 0),
    redemption_code TEXT NOT NULL UNIQUE,
    purchased_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_user_rewards_user ON user_rewards(user_id);

-- Schema version
CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY);
INSERT OR IGNORE INTO schema_version VALUES (1);
"#;

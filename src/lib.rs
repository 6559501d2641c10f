//! questlog - progression & rewards engine
//!
//! Turns learner activity (logins, lesson completions, quest and challenge
//! completions) into experience points, derived levels, daily streaks and a
//! spendable XP balance that can be redeemed for reward items.
//!
//! ## Guarantees
//!
//! - Every XP-granting command carries an idempotency key; replaying it never
//!   awards twice.
//! - Every state change is a version-guarded write of one user's aggregate;
//!   lost updates surface as retryable conflicts, never as silent overwrites.
//! - Purchases check and debit the balance atomically, so the balance can
//!   never go negative, even under concurrent purchases.
//!
//! The [`progress::ProgressionEngine`] facade is the entry point; the
//! [`config`] module loads engine tuning and content catalogs from TOML.

pub mod config;
pub mod progress;

//! Progression & rewards engine
//!
//! Turns user activity into XP, levels, streaks and a spendable balance, and
//! lets that balance be redeemed in the reward store. State lives in a SQLite
//! database (`~/.questlog/progress.db`).
//!
//! # Architecture
//!
//! ```text
//!   commands (award, login, quest, challenge, purchase)
//!                      │
//!                      ▼
//!             ┌──────────────────┐      RequirementEvaluator
//!             │ ProgressionEngine│ ───▶ BadgeSink
//!             └────────┬─────────┘      EventSink
//!                      │ one user's aggregate per transaction,
//!                      │ guarded by its version
//!                      ▼
//!            ~/.questlog/progress.db ◀── Leaderboard (reads only)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! let engine = ProgressionEngine::open(&EngineConfig::default(), None)?;
//!
//! let outcome = engine.award_xp("u1", 50, "daily login", "login:2026-10-19")?;
//! let quest = engine.complete_quest("u1", "q-first-lesson", &evidence).await?;
//! let top = engine.leaderboard().rank(&LeaderboardScope::Global { limit: 10 })?;
//! ```

mod badges;
mod catalog;
mod challenges;
mod collaborators;
mod day;
mod db;
mod error;
mod events;
mod leaderboard;
mod ledger;
mod levels;
mod models;
mod quests;
mod retry;
mod rewards;
mod streaks;

pub use badges::BadgeOutbox;
pub use catalog::{CatalogAdmin, ImportSummary};
pub use challenges::{ChallengeCompletion, ChallengeEngine};
pub use collaborators::{
    BadgeSink, EventSink, LoggingBadgeSink, RequirementEvaluator, ThresholdEvaluator,
    TracingEventSink,
};
pub use day::{DayBoundary, format_day, parse_day};
pub use db::{AuditReport, ProgressDb};
pub use error::{ClosedReason, EngineError, EngineResult};
pub use events::{EngineEvent, LevelUp};
pub use leaderboard::{Leaderboard, LeaderboardScope};
pub use ledger::{XpAward, XpLedger};
pub use levels::{DEFAULT_LEVELS, Level, LevelCurve, LevelProgress, LevelTable, LinearCurve};
pub use models::{
    BadgeUnlock, Challenge, Difficulty, LeaderboardEntry, LedgerEntry, ProgressionSnapshot, Quest,
    QuestStatus, RewardItem, StreakRecord, UserChallenge, UserProgression, UserQuest, UserReward,
};
pub use quests::{QuestCompletion, QuestEngine};
pub use retry::RetryPolicy;
pub use rewards::{Redemption, RewardStore, generate_redemption_code};
pub use streaks::{LEARNING_STREAK, LOGIN_STREAK, StreakChange, StreakTracker, StreakUpdate};

use day::now_ms;
use db::{load_progression, touch_progression};
use ledger::{apply_award, ledger_has_key};
use retry::with_conflict_retry;
use streaks::{load_streak, next_streak, save_streak};

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::EngineConfig;

/// Everything a component needs: storage, rules and collaborators
#[derive(Clone)]
pub(crate) struct EngineContext {
    pub db: ProgressDb,
    pub levels: Arc<dyn LevelCurve>,
    pub retry: RetryPolicy,
    pub collaborator_timeout: Duration,
    pub days: DayBoundary,
    pub code_prefix: String,
    pub daily_login_xp: i64,
    pub evaluator: Arc<dyn RequirementEvaluator>,
    pub badges: Arc<dyn BadgeSink>,
    pub events: Arc<dyn EventSink>,
}

impl EngineContext {
    fn from_config(db: ProgressDb, config: &EngineConfig) -> EngineResult<Self> {
        Ok(Self {
            db,
            levels: config.leveling.build()?,
            retry: config.retry_policy(),
            collaborator_timeout: config.collaborator_timeout(),
            days: config.day_boundary()?,
            code_prefix: config.engine.redemption_code_prefix.clone(),
            daily_login_xp: config.login.daily_login_xp,
            evaluator: Arc::new(ThresholdEvaluator),
            badges: Arc::new(LoggingBadgeSink),
            events: Arc::new(TracingEventSink),
        })
    }

    /// Hand committed events to the sink
    pub fn publish(&self, events: &[EngineEvent]) {
        for event in events {
            self.events.publish(event);
        }
    }
}

/// Result of [`ProgressionEngine::award_xp`]
#[derive(Debug, Clone, Serialize)]
pub struct AwardOutcome {
    /// False when the idempotency key had already been applied
    pub applied: bool,
    pub award: Option<XpAward>,
    pub progression: ProgressionSnapshot,
    pub events: Vec<EngineEvent>,
}

/// Result of [`ProgressionEngine::record_login`]
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub streak: StreakUpdate,
    /// The daily login award, if this was the first login of the day
    pub award: Option<XpAward>,
    pub progression: ProgressionSnapshot,
    pub events: Vec<EngineEvent>,
}

/// Result of [`ProgressionEngine::record_activity`]
#[derive(Debug, Clone, Serialize)]
pub struct ActivityOutcome {
    pub streak: StreakUpdate,
    pub events: Vec<EngineEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StartedQuest {
    pub user_quest: UserQuest,
    pub already_started: bool,
    pub events: Vec<EngineEvent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinedChallenge {
    pub user_challenge: UserChallenge,
    pub already_joined: bool,
    pub events: Vec<EngineEvent>,
}

/// Everything a profile page shows
#[derive(Debug, Clone, Serialize)]
pub struct UserStatus {
    pub progression: ProgressionSnapshot,
    pub level: LevelProgress,
    pub streaks: Vec<StreakRecord>,
    pub badges: Vec<BadgeUnlock>,
    /// Global leaderboard position; None before the first activity
    pub rank: Option<u32>,
}

/// Entry point to the engine
///
/// Component accessors (`ledger()`, `quests()`, ...) report every failure as a
/// precise [`EngineError`]. The operations on this type instead turn the
/// benign ones (duplicate event, already started, already completed) into
/// successful outcomes with a flag, so client retries always see success.
#[derive(Clone)]
pub struct ProgressionEngine {
    ctx: Arc<EngineContext>,
}

impl ProgressionEngine {
    pub fn new(db: ProgressDb, config: &EngineConfig) -> EngineResult<Self> {
        Ok(Self {
            ctx: Arc::new(EngineContext::from_config(db, config)?),
        })
    }

    /// Open the database at `db_path` (or the default location) with `config`
    pub fn open(config: &EngineConfig, db_path: Option<&Path>) -> anyhow::Result<Self> {
        let db = match db_path {
            Some(path) => ProgressDb::open(path, config.busy_timeout())?,
            None => ProgressDb::open(
                &EngineConfig::data_dir().join("progress.db"),
                config.busy_timeout(),
            )?,
        };
        Ok(Self::new(db, config)?)
    }

    fn context_mut(&mut self) -> &mut EngineContext {
        Arc::make_mut(&mut self.ctx)
    }

    /// Replace the requirement evaluator (default: [`ThresholdEvaluator`])
    pub fn with_evaluator(mut self, evaluator: Arc<dyn RequirementEvaluator>) -> Self {
        self.context_mut().evaluator = evaluator;
        self
    }

    /// Replace the badge sink (default: [`LoggingBadgeSink`])
    pub fn with_badge_sink(mut self, badges: Arc<dyn BadgeSink>) -> Self {
        self.context_mut().badges = badges;
        self
    }

    /// Replace the event sink (default: [`TracingEventSink`])
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.context_mut().events = events;
        self
    }

    pub fn db(&self) -> &ProgressDb {
        &self.ctx.db
    }

    pub fn level_curve(&self) -> &dyn LevelCurve {
        self.ctx.levels.as_ref()
    }

    pub fn day_boundary(&self) -> DayBoundary {
        self.ctx.days
    }

    pub fn ledger(&self) -> XpLedger {
        XpLedger::new(self.ctx.clone())
    }

    pub fn streaks(&self) -> StreakTracker {
        StreakTracker::new(self.ctx.clone())
    }

    pub fn quests(&self) -> QuestEngine {
        QuestEngine::new(self.ctx.clone())
    }

    pub fn challenges(&self) -> ChallengeEngine {
        ChallengeEngine::new(self.ctx.clone())
    }

    pub fn rewards(&self) -> RewardStore {
        RewardStore::new(self.ctx.clone())
    }

    pub fn leaderboard(&self) -> Leaderboard {
        Leaderboard::new(self.ctx.clone())
    }

    pub fn catalog(&self) -> CatalogAdmin {
        CatalogAdmin::new(self.ctx.clone())
    }

    pub fn badges(&self) -> BadgeOutbox {
        BadgeOutbox::new(self.ctx.clone())
    }

    /// Award XP; a replayed idempotency key reports `applied: false`
    pub fn award_xp(
        &self,
        user_id: &str,
        amount: i64,
        reason: &str,
        idempotency_key: &str,
    ) -> EngineResult<AwardOutcome> {
        let curve = self.ctx.levels.as_ref();
        match self.ledger().award_xp(user_id, amount, reason, idempotency_key) {
            Ok(award) => Ok(AwardOutcome {
                applied: true,
                events: award.events(reason, idempotency_key, curve),
                progression: award.progression.clone(),
                award: Some(award),
            }),
            Err(EngineError::DuplicateEvent { .. }) => Ok(AwardOutcome {
                applied: false,
                award: None,
                progression: self.ctx.db.load_progression(user_id)?.snapshot(curve),
                events: Vec::new(),
            }),
            Err(err) => Err(err),
        }
    }

    /// Count activity of `streak_type` at `at`
    pub fn record_activity(
        &self,
        user_id: &str,
        streak_type: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<ActivityOutcome> {
        let streak = self.streaks().record_activity_at(user_id, streak_type, at)?;
        Ok(ActivityOutcome {
            events: streak.events(),
            streak,
        })
    }

    /// Record a login: extends the login streak and grants the daily login
    /// XP once per calendar day (key `login:<YYYY-MM-DD>`)
    ///
    /// The streak and the award commit in one transaction.
    pub fn record_login(&self, user_id: &str, at: DateTime<Utc>) -> EngineResult<LoginOutcome> {
        let day = self.ctx.days.day_of(at);
        let key = format!("login:{}", format_day(day));
        let amount = self.ctx.daily_login_xp;
        let curve = self.ctx.levels.as_ref();

        let result = with_conflict_retry(self.ctx.retry, "record_login", || {
            let (current, previous, rewarded) = self.ctx.db.read(|conn| {
                Ok((
                    load_progression(conn, user_id)?,
                    load_streak(conn, user_id, LOGIN_STREAK)?,
                    ledger_has_key(conn, user_id, &key)?,
                ))
            })?;
            let streak = next_streak(previous.as_ref(), user_id, LOGIN_STREAK, day)?;
            let grant = amount > 0 && !rewarded;
            if streak.change == StreakChange::SameDay && !grant {
                return Ok((streak, None, current.snapshot(curve)));
            }

            self.ctx.db.write(|tx| {
                let now = now_ms();
                if streak.change != StreakChange::SameDay {
                    save_streak(tx, &streak.record, now)?;
                }
                if !grant {
                    let stored = touch_progression(tx, &current, now)?;
                    return Ok((streak, None, stored.snapshot(curve)));
                }
                // Another login got in first; re-read and skip the award
                let award = apply_award(tx, &current, amount, "daily login", &key, curve, now)
                    .map_err(|err| match err {
                        EngineError::DuplicateEvent { .. } => EngineError::Conflict {
                            user_id: user_id.to_string(),
                        },
                        other => other,
                    })?;
                let progression = award.progression.clone();
                Ok((streak, Some(award), progression))
            })
        });

        let (streak, award, progression) = match result {
            Ok(done) => done,
            Err(err @ EngineError::OutOfOrderEvent { .. }) => {
                error!("[questlog:login] {} for {}", err, user_id);
                return Err(err);
            }
            Err(err) => return Err(err),
        };

        let mut events = streak.events();
        match &award {
            Some(award) => {
                info!(
                    "[questlog:login] +{} XP to {} for {}, total {}",
                    amount, user_id, key, award.progression.total_xp_earned
                );
                events.extend(award.events("daily login", &key, curve));
            }
            None if amount > 0 => {
                debug!("[questlog:login] {} already rewarded for {}", user_id, key);
            }
            None => {}
        }
        self.ctx.publish(&events);

        Ok(LoginOutcome {
            streak,
            award,
            progression,
            events,
        })
    }

    /// Start a quest; starting one already in progress or completed reports
    /// `already_started: true` with the existing record
    pub fn start_quest(&self, user_id: &str, quest_id: &str) -> EngineResult<StartedQuest> {
        let quests = self.quests();
        match quests.start_quest(user_id, quest_id) {
            Ok(user_quest) => Ok(StartedQuest {
                events: vec![EngineEvent::QuestStarted {
                    user_id: user_id.to_string(),
                    quest_id: quest_id.to_string(),
                }],
                user_quest,
                already_started: false,
            }),
            Err(err @ EngineError::AlreadyStarted { .. }) => {
                debug!("[questlog:quest] {}", err);
                let user_quest = quests
                    .user_quest(user_id, quest_id)?
                    .ok_or(err)?;
                Ok(StartedQuest {
                    user_quest,
                    already_started: true,
                    events: Vec::new(),
                })
            }
            Err(err) => Err(err),
        }
    }

    /// Complete a quest; completing it again reports `already_completed: true`
    /// and awards nothing
    pub async fn complete_quest(
        &self,
        user_id: &str,
        quest_id: &str,
        evidence: &Value,
    ) -> EngineResult<QuestCompletion> {
        let quests = self.quests();
        match quests.complete_quest(user_id, quest_id, evidence).await {
            Err(err @ EngineError::AlreadyCompleted { .. }) => {
                debug!("[questlog:quest] {}", err);
                let user_quest = quests
                    .user_quest(user_id, quest_id)?
                    .ok_or(err)?;
                Ok(QuestCompletion {
                    user_quest,
                    award: None,
                    badge_unlocked: None,
                    already_completed: true,
                    events: Vec::new(),
                })
            }
            other => other,
        }
    }

    pub fn abandon_quest(&self, user_id: &str, quest_id: &str) -> EngineResult<UserQuest> {
        self.quests().abandon_quest(user_id, quest_id)
    }

    /// Join a challenge; joining twice reports `already_joined: true`
    pub fn join_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
        at: DateTime<Utc>,
    ) -> EngineResult<JoinedChallenge> {
        let challenges = self.challenges();
        match challenges.join_challenge(user_id, challenge_id, at) {
            Ok(user_challenge) => Ok(JoinedChallenge {
                events: vec![EngineEvent::ChallengeJoined {
                    user_id: user_id.to_string(),
                    challenge_id: challenge_id.to_string(),
                }],
                user_challenge,
                already_joined: false,
            }),
            Err(err @ EngineError::AlreadyStarted { .. }) => {
                debug!("[questlog:challenge] {}", err);
                let user_challenge = challenges
                    .user_challenge(user_id, challenge_id)?
                    .ok_or(err)?;
                Ok(JoinedChallenge {
                    user_challenge,
                    already_joined: true,
                    events: Vec::new(),
                })
            }
            Err(err) => Err(err),
        }
    }

    pub async fn complete_challenge(
        &self,
        user_id: &str,
        challenge_id: &str,
        evidence: &Value,
        at: DateTime<Utc>,
    ) -> EngineResult<ChallengeCompletion> {
        let challenges = self.challenges();
        match challenges
            .complete_challenge(user_id, challenge_id, evidence, at)
            .await
        {
            Err(err @ EngineError::AlreadyCompleted { .. }) => {
                debug!("[questlog:challenge] {}", err);
                let user_challenge = challenges
                    .user_challenge(user_id, challenge_id)?
                    .ok_or(err)?;
                Ok(ChallengeCompletion {
                    user_challenge,
                    award: None,
                    badge_unlocked: None,
                    already_completed: true,
                    events: Vec::new(),
                })
            }
            other => other,
        }
    }

    pub fn purchase(&self, user_id: &str, item_id: &str) -> EngineResult<Redemption> {
        self.rewards().purchase(user_id, item_id)
    }

    pub fn status(&self, user_id: &str) -> EngineResult<UserStatus> {
        let progression = self.ledger().snapshot(user_id)?;
        let rank = self.leaderboard().position_of(user_id)?.map(|e| e.rank);
        Ok(UserStatus {
            level: LevelProgress::new(self.level_curve(), progression.total_xp_earned),
            streaks: self.streaks().all(user_id)?,
            badges: self.badges().for_user(user_id)?,
            progression,
            rank,
        })
    }

    /// Retry badge deliveries that failed or timed out earlier
    pub async fn redeliver_badges(&self) -> EngineResult<usize> {
        self.badges().redeliver_pending().await
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Throwaway engines for unit tests

    use std::sync::Mutex;

    use async_trait::async_trait;
    use tempfile::TempDir;

    use super::*;

    pub fn engine_context() -> (TempDir, Arc<EngineContext>) {
        engine_context_with(|_| {})
    }

    pub fn engine_context_with(
        configure: impl FnOnce(&mut EngineContext),
    ) -> (TempDir, Arc<EngineContext>) {
        let dir = tempfile::tempdir().unwrap();
        let db = ProgressDb::open(&dir.path().join("progress.db"), Duration::from_secs(5)).unwrap();
        let mut ctx = EngineContext::from_config(db, &EngineConfig::default()).unwrap();
        configure(&mut ctx);
        (dir, Arc::new(ctx))
    }

    /// Rejects every completion
    pub struct RejectAll;

    #[async_trait]
    impl RequirementEvaluator for RejectAll {
        async fn is_satisfied(&self, _: &Value, _: &Value) -> anyhow::Result<bool> {
            Ok(false)
        }
    }

    /// Fails the first `n` deliveries, then records the rest
    pub struct FlakyBadgeSink {
        failures_left: Mutex<u32>,
        delivered: Mutex<Vec<(String, String)>>,
    }

    impl FlakyBadgeSink {
        pub fn failing_first(n: u32) -> Self {
            Self {
                failures_left: Mutex::new(n),
                delivered: Mutex::new(Vec::new()),
            }
        }

        pub fn delivered(&self) -> Vec<(String, String)> {
            self.delivered.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BadgeSink for FlakyBadgeSink {
        async fn unlock(&self, user_id: &str, badge_id: &str) -> anyhow::Result<()> {
            {
                let mut left = self.failures_left.lock().unwrap();
                if *left > 0 {
                    *left -= 1;
                    anyhow::bail!("achievement service unavailable");
                }
            }
            self.delivered
                .lock()
                .unwrap()
                .push((user_id.to_string(), badge_id.to_string()));
            Ok(())
        }
    }

    /// Collects published events
    #[derive(Default)]
    pub struct RecordingSink {
        pub events: Mutex<Vec<EngineEvent>>,
    }

    impl EventSink for RecordingSink {
        fn publish(&self, event: &EngineEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingSink;
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn engine() -> (tempfile::TempDir, ProgressionEngine, Arc<RecordingSink>) {
        let dir = tempfile::tempdir().unwrap();
        let sink = Arc::new(RecordingSink::default());
        let engine = ProgressionEngine::open(
            &EngineConfig::default(),
            Some(&dir.path().join("progress.db")),
        )
        .unwrap()
        .with_event_sink(sink.clone());
        (dir, engine, sink)
    }

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, day, hour, 0, 0).unwrap()
    }

    #[test]
    fn test_duplicate_award_is_success() {
        let (_dir, engine, _sink) = engine();
        let first = engine.award_xp("u1", 40, "lesson", "lesson:7").unwrap();
        assert!(first.applied);
        assert_eq!(first.events.len(), 1);

        let replay = engine.award_xp("u1", 40, "lesson", "lesson:7").unwrap();
        assert!(!replay.applied);
        assert!(replay.award.is_none());
        assert_eq!(replay.progression.total_xp_earned, 40);
    }

    #[test]
    fn test_login_awards_once_per_day() {
        let (_dir, engine, sink) = engine();

        let morning = engine.record_login("u1", at(19, 8)).unwrap();
        assert_eq!(morning.streak.change, StreakChange::Started);
        assert_eq!(morning.award.as_ref().map(|a| a.amount), Some(50));
        assert_eq!(morning.progression.total_xp_earned, 50);

        let evening = engine.record_login("u1", at(19, 21)).unwrap();
        assert_eq!(evening.streak.change, StreakChange::SameDay);
        assert!(evening.award.is_none());
        assert_eq!(evening.progression.total_xp_earned, 50);

        let next_day = engine.record_login("u1", at(20, 9)).unwrap();
        assert_eq!(next_day.streak.record.current_streak, 2);
        assert_eq!(next_day.progression.total_xp_earned, 100);
        assert!(engine.ledger().has_applied("u1", "login:2026-10-20").unwrap());

        let published = sink.events.lock().unwrap();
        assert!(
            published
                .iter()
                .any(|e| matches!(e, EngineEvent::LevelUp(l) if l.new_level == 2))
        );
    }

    #[test]
    fn test_failed_login_award_keeps_streak_unchanged() {
        let (_dir, engine, sink) = engine();
        engine.award_xp("u1", i64::MAX - 10, "import", "import:legacy").unwrap();
        let before = sink.events.lock().unwrap().len();

        // The daily 50 XP would overflow the total, so the whole login rolls back
        let err = engine.record_login("u1", at(19, 8)).unwrap_err();
        assert!(matches!(err, EngineError::InvalidAmount(50)));
        assert!(engine.streaks().get("u1", LOGIN_STREAK).unwrap().is_none());
        assert!(!engine.ledger().has_applied("u1", "login:2026-10-19").unwrap());
        assert_eq!(sink.events.lock().unwrap().len(), before);
    }

    #[test]
    fn test_login_without_daily_xp_still_counts_streak() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = EngineConfig::default();
        config.login.daily_login_xp = 0;
        let engine = ProgressionEngine::open(&config, Some(&dir.path().join("progress.db"))).unwrap();

        let first = engine.record_login("u1", at(19, 8)).unwrap();
        assert!(first.award.is_none());
        assert_eq!(first.streak.record.current_streak, 1);
        let second = engine.record_login("u1", at(20, 8)).unwrap();
        assert_eq!(second.streak.record.current_streak, 2);
        assert_eq!(second.progression.total_xp_earned, 0);
    }

    #[tokio::test]
    async fn test_repeat_quest_commands_are_success() {
        let (_dir, engine, _sink) = engine();
        engine
            .catalog()
            .upsert_quest(&Quest {
                quest_id: "q1".into(),
                title: "First lesson".into(),
                difficulty: Difficulty::Easy,
                xp_reward: 100,
                badge_reward: Some("first-steps".into()),
                requirements: Value::Null,
            })
            .unwrap();

        assert!(!engine.start_quest("u1", "q1").unwrap().already_started);
        assert!(engine.start_quest("u1", "q1").unwrap().already_started);

        let done = engine.complete_quest("u1", "q1", &json!({})).await.unwrap();
        assert!(!done.already_completed);
        assert_eq!(done.badge_unlocked.as_deref(), Some("first-steps"));

        let again = engine.complete_quest("u1", "q1", &json!({})).await.unwrap();
        assert!(again.already_completed);
        assert!(again.award.is_none());
        assert_eq!(again.user_quest.status, QuestStatus::Completed);

        let status = engine.status("u1").unwrap();
        assert_eq!(status.progression.total_xp_earned, 100);
        assert_eq!(status.level.level, 2);
        assert_eq!(status.badges.len(), 1);
        assert!(status.badges[0].delivered_at.is_some());
        assert_eq!(status.rank, Some(1));
    }

    #[test]
    fn test_status_for_new_user() {
        let (_dir, engine, _sink) = engine();
        let status = engine.status("nobody").unwrap();
        assert_eq!(status.progression.version, 0);
        assert_eq!(status.level.level, 1);
        assert!(status.streaks.is_empty());
        assert_eq!(status.rank, None);
    }
}

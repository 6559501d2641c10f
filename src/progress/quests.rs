//! Quest engine
//!
//! A user's run at a quest moves `NotStarted -> InProgress -> Completed`,
//! with `Abandoned` reachable only from `InProgress`. Completion awards the
//! quest's XP exactly once, keyed `quest:<id>:user:<user>`. Challenges reuse
//! the same assignment machinery (see [`TaskKind`]).

use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension, Transaction};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::EngineContext;
use super::badges::{BadgeOutbox, record_unlock};
use super::catalog::{load_quest, not_found};
use super::day::now_ms;
use super::db::{load_progression, touch_progression};
use super::error::{EngineError, EngineResult};
use super::events::EngineEvent;
use super::ledger::{XpAward, apply_award, ledger_has_key};
use super::levels::LevelCurve;
use super::models::{BadgeUnlock, Quest, QuestStatus, UserProgression, UserQuest};
use super::retry::{with_conflict_retry, with_timeout};

/// Which assignment table an operation works on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TaskKind {
    Quest,
    Challenge,
}

impl TaskKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Quest => "quest",
            Self::Challenge => "challenge",
        }
    }

    fn table(self) -> &'static str {
        match self {
            Self::Quest => "user_quests",
            Self::Challenge => "user_challenges",
        }
    }

    fn id_column(self) -> &'static str {
        match self {
            Self::Quest => "quest_id",
            Self::Challenge => "challenge_id",
        }
    }

    fn started_column(self) -> &'static str {
        match self {
            Self::Quest => "started_at",
            Self::Challenge => "joined_at",
        }
    }

    /// Key under which completion XP is awarded
    pub(crate) fn idempotency_key(self, task_id: &str, user_id: &str) -> String {
        format!("{}:{}:user:{}", self.label(), task_id, user_id)
    }
}

/// Persisted per-user state shared by quests and challenges
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Assignment {
    pub status: QuestStatus,
    pub xp_earned: Option<i64>,
    pub started_at: i64,
    pub completed_at: Option<i64>,
}

impl Assignment {
    fn to_user_quest(&self, user_id: &str, quest_id: &str) -> UserQuest {
        UserQuest {
            user_id: user_id.to_string(),
            quest_id: quest_id.to_string(),
            status: self.status,
            xp_earned: self.xp_earned,
            started_at: self.started_at,
            completed_at: self.completed_at,
        }
    }
}

pub(crate) fn load_assignment(
    conn: &Connection,
    kind: TaskKind,
    user_id: &str,
    task_id: &str,
) -> EngineResult<Option<Assignment>> {
    let sql = format!(
        "SELECT status, xp_earned, {started}, completed_at FROM {table} WHERE user_id = ?1 AND {id} = ?2",
        started = kind.started_column(),
        table = kind.table(),
        id = kind.id_column(),
    );
    let row = conn
        .query_row(&sql, [user_id, task_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, Option<i64>>(1)?,
                r.get::<_, i64>(2)?,
                r.get::<_, Option<i64>>(3)?,
            ))
        })
        .optional()?;

    row.map(|(status, xp_earned, started_at, completed_at)| {
        let status = QuestStatus::parse(&status).ok_or_else(|| {
            EngineError::InvalidInput(format!("stored {} status '{status}' is unknown", kind.label()))
        })?;
        Ok(Assignment {
            status,
            xp_earned,
            started_at,
            completed_at,
        })
    })
    .transpose()
}

/// All assignments of one kind for a user, most recently started first
pub(crate) fn load_assignments(
    conn: &Connection,
    kind: TaskKind,
    user_id: &str,
) -> EngineResult<Vec<(String, Assignment)>> {
    let sql = format!(
        "SELECT {id}, status, xp_earned, {started}, completed_at FROM {table} WHERE user_id = ?1 ORDER BY {started} DESC, {id}",
        started = kind.started_column(),
        table = kind.table(),
        id = kind.id_column(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([user_id], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, Option<i64>>(2)?,
                r.get::<_, i64>(3)?,
                r.get::<_, Option<i64>>(4)?,
            ))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|(task_id, status, xp_earned, started_at, completed_at)| {
            let status = QuestStatus::parse(&status).ok_or_else(|| {
                EngineError::InvalidInput(format!("stored status '{status}' is unknown"))
            })?;
            Ok((
                task_id,
                Assignment {
                    status,
                    xp_earned,
                    started_at,
                    completed_at,
                },
            ))
        })
        .collect()
}

/// Create the assignment in progress; only a `not_started` row may be reused
pub(crate) fn begin_assignment(
    conn: &Connection,
    kind: TaskKind,
    user_id: &str,
    task_id: &str,
    now: i64,
) -> EngineResult<Assignment> {
    let sql = format!(
        r#"INSERT INTO {table} (user_id, {id}, status, xp_earned, {started}, completed_at)
           VALUES (?1, ?2, 'in_progress', NULL, ?3, NULL)
           ON CONFLICT(user_id, {id}) DO UPDATE SET
               status = 'in_progress', xp_earned = NULL, {started} = ?3, completed_at = NULL
           WHERE status = 'not_started'"#,
        table = kind.table(),
        id = kind.id_column(),
        started = kind.started_column(),
    );
    if conn.execute(&sql, rusqlite::params![user_id, task_id, now])? == 0 {
        return Err(EngineError::Conflict {
            user_id: user_id.to_string(),
        });
    }
    Ok(Assignment {
        status: QuestStatus::InProgress,
        xp_earned: None,
        started_at: now,
        completed_at: None,
    })
}

fn transition(
    conn: &Connection,
    kind: TaskKind,
    user_id: &str,
    task_id: &str,
    to: QuestStatus,
    xp_earned: Option<i64>,
    now: Option<i64>,
) -> EngineResult<()> {
    let sql = format!(
        r#"UPDATE {table} SET status = ?1, xp_earned = ?2, completed_at = ?3
           WHERE user_id = ?4 AND {id} = ?5 AND status = 'in_progress'"#,
        table = kind.table(),
        id = kind.id_column(),
    );
    let changed = conn.execute(
        &sql,
        rusqlite::params![to.as_str(), xp_earned, now, user_id, task_id],
    )?;
    if changed == 0 {
        return Err(EngineError::Conflict {
            user_id: user_id.to_string(),
        });
    }
    Ok(())
}

/// Reward side of a definition, shared by quests and challenges
pub(crate) struct TaskReward<'a> {
    pub kind: TaskKind,
    pub task_id: &'a str,
    pub xp_reward: i64,
    pub badge_reward: Option<&'a str>,
    pub requirements: &'a Value,
}

/// Outcome of a committed completion
#[derive(Debug, Clone)]
pub(crate) struct Completion {
    pub assignment: Assignment,
    pub award: Option<XpAward>,
    pub badge: Option<BadgeUnlock>,
    pub events: Vec<EngineEvent>,
}

/// Fail unless the assignment is in progress
pub(crate) fn require_in_progress(
    kind: TaskKind,
    task_id: &str,
    assignment: Option<&Assignment>,
) -> EngineResult<()> {
    match assignment.map(|a| a.status) {
        Some(QuestStatus::InProgress) => Ok(()),
        Some(QuestStatus::Completed) => Err(EngineError::AlreadyCompleted {
            kind: kind.label(),
            id: task_id.to_string(),
        }),
        _ => Err(EngineError::NotStarted {
            kind: kind.label(),
            id: task_id.to_string(),
        }),
    }
}

/// Verify evidence, then complete the assignment, award XP and unlock the
/// badge in one transaction
pub(crate) async fn complete_task(
    ctx: &Arc<EngineContext>,
    user_id: &str,
    reward: TaskReward<'_>,
    evidence: &Value,
) -> EngineResult<Completion> {
    let kind = reward.kind;
    let existing = ctx
        .db
        .read(|conn| load_assignment(conn, kind, user_id, reward.task_id))?;
    require_in_progress(kind, reward.task_id, existing.as_ref())?;

    let satisfied = with_timeout(
        ctx.collaborator_timeout,
        "requirement evaluation",
        ctx.evaluator.is_satisfied(reward.requirements, evidence),
    )
    .await?;
    if !satisfied {
        return Err(EngineError::RequirementsNotMet {
            kind: kind.label(),
            id: reward.task_id.to_string(),
        });
    }

    let key = kind.idempotency_key(reward.task_id, user_id);
    let source = format!("{}:{}", kind.label(), reward.task_id);
    let curve = ctx.levels.as_ref();

    let (assignment, award, badge) = with_conflict_retry(ctx.retry, "complete_task", || {
        let (current, assignment) = ctx.db.read(|conn| {
            Ok((
                load_progression(conn, user_id)?,
                load_assignment(conn, kind, user_id, reward.task_id)?,
            ))
        })?;
        require_in_progress(kind, reward.task_id, assignment.as_ref())?;
        let started_at = assignment.map_or(0, |a| a.started_at);

        ctx.db.write(|tx| {
            let now = now_ms();
            transition(
                tx,
                kind,
                user_id,
                reward.task_id,
                QuestStatus::Completed,
                Some(reward.xp_reward),
                Some(now),
            )?;
            let award = award_once(tx, &current, &reward, &key, curve, now)?;
            let badge = match reward.badge_reward {
                Some(badge_id) => record_unlock(tx, user_id, badge_id, &source, now)?,
                None => None,
            };
            let assignment = Assignment {
                status: QuestStatus::Completed,
                xp_earned: Some(reward.xp_reward),
                started_at,
                completed_at: Some(now),
            };
            Ok((assignment, award, badge))
        })
    })?;

    let mut events = vec![match kind {
        TaskKind::Quest => EngineEvent::QuestCompleted {
            user_id: user_id.to_string(),
            quest_id: reward.task_id.to_string(),
            xp_earned: reward.xp_reward,
        },
        TaskKind::Challenge => EngineEvent::ChallengeCompleted {
            user_id: user_id.to_string(),
            challenge_id: reward.task_id.to_string(),
            xp_earned: reward.xp_reward,
        },
    }];
    if let Some(award) = &award {
        events.extend(award.events(&source, &key, curve));
    }
    if let Some(badge) = &badge {
        events.push(EngineEvent::BadgeUnlocked {
            user_id: user_id.to_string(),
            badge_id: badge.badge_id.clone(),
            source: badge.source.clone(),
        });
    }

    info!(
        "[questlog:{}] {} completed '{}' (+{} XP)",
        kind.label(),
        user_id,
        reward.task_id,
        reward.xp_reward
    );
    ctx.publish(&events);

    if let Some(badge) = &badge {
        BadgeOutbox::new(ctx.clone()).deliver_or_log(badge).await;
    }

    Ok(Completion {
        assignment,
        award,
        badge,
        events,
    })
}

/// Award completion XP unless the key is already in the ledger; zero-XP
/// tasks only bump the version
fn award_once(
    tx: &Transaction<'_>,
    current: &UserProgression,
    reward: &TaskReward<'_>,
    key: &str,
    curve: &dyn LevelCurve,
    now: i64,
) -> EngineResult<Option<XpAward>> {
    if reward.xp_reward > 0 && !ledger_has_key(tx, &current.user_id, key)? {
        let reason = format!("{} {} completed", reward.kind.label(), reward.task_id);
        return apply_award(tx, current, reward.xp_reward, &reason, key, curve, now).map(Some);
    }
    if reward.xp_reward > 0 {
        debug!("[questlog:xp] {} already applied for {}", key, current.user_id);
    }
    touch_progression(tx, current, now)?;
    Ok(None)
}

/// Result of [`QuestEngine::complete_quest`]
#[derive(Debug, Clone, Serialize)]
pub struct QuestCompletion {
    pub user_quest: UserQuest,
    /// None when the quest grants no XP or the award was already applied
    pub award: Option<XpAward>,
    pub badge_unlocked: Option<String>,
    /// The quest was already completed; nothing was applied this time
    pub already_completed: bool,
    pub events: Vec<EngineEvent>,
}

/// Quest state machine
#[derive(Clone)]
pub struct QuestEngine {
    ctx: Arc<EngineContext>,
}

impl QuestEngine {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    fn definition(&self, quest_id: &str) -> EngineResult<Quest> {
        self.ctx
            .db
            .read(|conn| load_quest(conn, quest_id))?
            .ok_or_else(|| not_found("quest", quest_id))
    }

    /// Move the quest to `InProgress`
    ///
    /// Fails with `AlreadyStarted` if it is in progress or completed and with
    /// `Abandoned` if it was given up; abandoning is final.
    pub fn start_quest(&self, user_id: &str, quest_id: &str) -> EngineResult<UserQuest> {
        self.definition(quest_id)?;

        let assignment = with_conflict_retry(self.ctx.retry, "start_quest", || {
            let (current, existing) = self.ctx.db.read(|conn| {
                Ok((
                    load_progression(conn, user_id)?,
                    load_assignment(conn, TaskKind::Quest, user_id, quest_id)?,
                ))
            })?;
            match existing.as_ref().map(|a| a.status) {
                Some(QuestStatus::InProgress | QuestStatus::Completed) => {
                    return Err(EngineError::AlreadyStarted {
                        kind: "quest",
                        id: quest_id.to_string(),
                    });
                }
                Some(QuestStatus::Abandoned) => {
                    return Err(EngineError::Abandoned {
                        kind: "quest",
                        id: quest_id.to_string(),
                    });
                }
                _ => {}
            }

            self.ctx.db.write(|tx| {
                let now = now_ms();
                let assignment = begin_assignment(tx, TaskKind::Quest, user_id, quest_id, now)?;
                touch_progression(tx, &current, now)?;
                Ok(assignment)
            })
        })?;

        debug!("[questlog:quest] {} started '{}'", user_id, quest_id);
        self.ctx.publish(&[EngineEvent::QuestStarted {
            user_id: user_id.to_string(),
            quest_id: quest_id.to_string(),
        }]);
        Ok(assignment.to_user_quest(user_id, quest_id))
    }

    /// Verify `evidence` and complete the quest
    ///
    /// Fails with `NotStarted` unless the quest is in progress and with
    /// `AlreadyCompleted` if it was completed before; XP is never awarded twice.
    pub async fn complete_quest(
        &self,
        user_id: &str,
        quest_id: &str,
        evidence: &Value,
    ) -> EngineResult<QuestCompletion> {
        let quest = self.definition(quest_id)?;
        let reward = TaskReward {
            kind: TaskKind::Quest,
            task_id: &quest.quest_id,
            xp_reward: quest.xp_reward,
            badge_reward: quest.badge_reward.as_deref(),
            requirements: &quest.requirements,
        };

        let completion = complete_task(&self.ctx, user_id, reward, evidence).await?;
        Ok(QuestCompletion {
            user_quest: completion.assignment.to_user_quest(user_id, quest_id),
            award: completion.award,
            badge_unlocked: completion.badge.map(|b| b.badge_id),
            already_completed: false,
            events: completion.events,
        })
    }

    /// Give up on an in-progress quest
    pub fn abandon_quest(&self, user_id: &str, quest_id: &str) -> EngineResult<UserQuest> {
        let assignment = with_conflict_retry(self.ctx.retry, "abandon_quest", || {
            let (current, existing) = self.ctx.db.read(|conn| {
                Ok((
                    load_progression(conn, user_id)?,
                    load_assignment(conn, TaskKind::Quest, user_id, quest_id)?,
                ))
            })?;
            require_in_progress(TaskKind::Quest, quest_id, existing.as_ref())?;
            let started_at = existing.map_or(0, |a| a.started_at);

            self.ctx.db.write(|tx| {
                transition(
                    tx,
                    TaskKind::Quest,
                    user_id,
                    quest_id,
                    QuestStatus::Abandoned,
                    None,
                    None,
                )?;
                touch_progression(tx, &current, now_ms())?;
                Ok(Assignment {
                    status: QuestStatus::Abandoned,
                    xp_earned: None,
                    started_at,
                    completed_at: None,
                })
            })
        })?;

        self.ctx.publish(&[EngineEvent::QuestAbandoned {
            user_id: user_id.to_string(),
            quest_id: quest_id.to_string(),
        }]);
        Ok(assignment.to_user_quest(user_id, quest_id))
    }

    pub fn user_quest(&self, user_id: &str, quest_id: &str) -> EngineResult<Option<UserQuest>> {
        let assignment = self
            .ctx
            .db
            .read(|conn| load_assignment(conn, TaskKind::Quest, user_id, quest_id))?;
        Ok(assignment.map(|a| a.to_user_quest(user_id, quest_id)))
    }

    pub fn user_quests(&self, user_id: &str) -> EngineResult<Vec<UserQuest>> {
        let rows = self
            .ctx
            .db
            .read(|conn| load_assignments(conn, TaskKind::Quest, user_id))?;
        Ok(rows
            .into_iter()
            .map(|(quest_id, a)| a.to_user_quest(user_id, &quest_id))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::super::catalog::CatalogAdmin;
    use super::super::models::Difficulty;
    use super::super::test_support::{RejectAll, engine_context, engine_context_with};
    use super::*;
    use serde_json::json;

    fn seed_quest(ctx: &Arc<EngineContext>, id: &str, xp: i64, badge: Option<&str>) {
        CatalogAdmin::new(ctx.clone())
            .upsert_quest(&Quest {
                quest_id: id.into(),
                title: "Finish the SQL basics track".into(),
                difficulty: Difficulty::Medium,
                xp_reward: xp,
                badge_reward: badge.map(str::to_string),
                requirements: json!({ "lessons_completed": 5 }),
            })
            .unwrap();
    }

    #[tokio::test]
    async fn test_full_lifecycle() {
        let (_dir, ctx) = engine_context();
        seed_quest(&ctx, "q1", 100, Some("sql-starter"));
        let quests = QuestEngine::new(ctx.clone());

        assert!(quests.user_quest("u1", "q1").unwrap().is_none());
        let started = quests.start_quest("u1", "q1").unwrap();
        assert_eq!(started.status, QuestStatus::InProgress);
        assert_eq!(started.xp_earned, None);

        let done = quests
            .complete_quest("u1", "q1", &json!({ "lessons_completed": 5 }))
            .await
            .unwrap();
        assert_eq!(done.user_quest.status, QuestStatus::Completed);
        assert_eq!(done.user_quest.xp_earned, Some(100));
        assert!(done.user_quest.completed_at.is_some());
        assert_eq!(done.badge_unlocked.as_deref(), Some("sql-starter"));

        let award = done.award.unwrap();
        assert_eq!(award.progression.total_xp_earned, 100);
        assert!(award.leveled_up);

        let stored = quests.user_quest("u1", "q1").unwrap().unwrap();
        assert_eq!(stored, done.user_quest);
    }

    #[tokio::test]
    async fn test_complete_twice_awards_once() {
        let (_dir, ctx) = engine_context();
        seed_quest(&ctx, "q1", 100, None);
        let quests = QuestEngine::new(ctx.clone());
        quests.start_quest("u1", "q1").unwrap();

        let evidence = json!({ "lessons_completed": 7 });
        quests.complete_quest("u1", "q1", &evidence).await.unwrap();
        let err = quests.complete_quest("u1", "q1", &evidence).await.unwrap_err();
        assert!(matches!(err, EngineError::AlreadyCompleted { .. }));

        let progression = ctx.db.load_progression("u1").unwrap();
        assert_eq!(progression.total_xp_earned, 100);
    }

    #[tokio::test]
    async fn test_complete_without_start() {
        let (_dir, ctx) = engine_context();
        seed_quest(&ctx, "q1", 100, None);
        let quests = QuestEngine::new(ctx);

        let err = quests
            .complete_quest("u1", "q1", &json!({ "lessons_completed": 5 }))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotStarted { .. }));
    }

    #[tokio::test]
    async fn test_start_twice_and_unknown_quest() {
        let (_dir, ctx) = engine_context();
        seed_quest(&ctx, "q1", 100, None);
        let quests = QuestEngine::new(ctx);

        quests.start_quest("u1", "q1").unwrap();
        assert!(matches!(
            quests.start_quest("u1", "q1"),
            Err(EngineError::AlreadyStarted { .. })
        ));
        assert!(matches!(
            quests.start_quest("u1", "nope"),
            Err(EngineError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_unmet_requirements_change_nothing() {
        let (_dir, ctx) = engine_context();
        seed_quest(&ctx, "q1", 100, None);
        let quests = QuestEngine::new(ctx.clone());
        quests.start_quest("u1", "q1").unwrap();
        let before = ctx.db.load_progression("u1").unwrap();

        let err = quests
            .complete_quest("u1", "q1", &json!({ "lessons_completed": 2 }))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RequirementsNotMet { .. }));

        assert_eq!(ctx.db.load_progression("u1").unwrap(), before);
        let stored = quests.user_quest("u1", "q1").unwrap().unwrap();
        assert_eq!(stored.status, QuestStatus::InProgress);
    }

    #[tokio::test]
    async fn test_evaluator_rejection() {
        let (_dir, ctx) = engine_context_with(|c| c.evaluator = Arc::new(RejectAll));
        seed_quest(&ctx, "q1", 100, None);
        let quests = QuestEngine::new(ctx);
        quests.start_quest("u1", "q1").unwrap();

        let err = quests
            .complete_quest("u1", "q1", &json!({ "lessons_completed": 50 }))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::RequirementsNotMet { .. }));
    }

    #[tokio::test]
    async fn test_abandon_is_final() {
        let (_dir, ctx) = engine_context();
        seed_quest(&ctx, "q1", 100, None);
        seed_quest(&ctx, "q2", 100, None);
        let quests = QuestEngine::new(ctx.clone());

        assert!(matches!(
            quests.abandon_quest("u1", "q1"),
            Err(EngineError::NotStarted { .. })
        ));

        quests.start_quest("u1", "q1").unwrap();
        let abandoned = quests.abandon_quest("u1", "q1").unwrap();
        assert_eq!(abandoned.status, QuestStatus::Abandoned);

        let err = quests.start_quest("u1", "q1").unwrap_err();
        assert!(matches!(err, EngineError::Abandoned { .. }));
        assert!(!err.is_benign());
        assert!(matches!(
            quests
                .complete_quest("u1", "q1", &json!({ "lessons_completed": 5 }))
                .await,
            Err(EngineError::NotStarted { .. })
        ));
        let stored = quests.user_quest("u1", "q1").unwrap().unwrap();
        assert_eq!(stored.status, QuestStatus::Abandoned);
        assert_eq!(ctx.db.load_progression("u1").unwrap().total_xp_earned, 0);

        quests.start_quest("u1", "q2").unwrap();
        quests
            .complete_quest("u1", "q2", &json!({ "lessons_completed": 5 }))
            .await
            .unwrap();
        assert!(matches!(
            quests.abandon_quest("u1", "q2"),
            Err(EngineError::AlreadyCompleted { .. })
        ));
        assert_eq!(quests.user_quests("u1").unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_xp_quest() {
        let (_dir, ctx) = engine_context();
        seed_quest(&ctx, "q0", 0, None);
        let quests = QuestEngine::new(ctx.clone());
        quests.start_quest("u1", "q0").unwrap();

        let done = quests
            .complete_quest("u1", "q0", &json!({ "lessons_completed": 5 }))
            .await
            .unwrap();
        assert!(done.award.is_none());
        assert_eq!(done.user_quest.xp_earned, Some(0));
        assert_eq!(ctx.db.load_progression("u1").unwrap().total_xp_earned, 0);
    }

    #[test]
    fn test_idempotency_key_format() {
        assert_eq!(TaskKind::Quest.idempotency_key("q1", "u9"), "quest:q1:user:u9");
        assert_eq!(
            TaskKind::Challenge.idempotency_key("c1", "u9"),
            "challenge:c1:user:u9"
        );
    }
}

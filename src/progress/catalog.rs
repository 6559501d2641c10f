//! Content definitions: quests, challenges and reward items
//!
//! The engine only reads these while applying user commands. Writes come
//! from the content side through [`CatalogAdmin`].

use std::sync::Arc;

use rusqlite::{Connection, OptionalExtension, Row};
use serde::Serialize;
use tracing::info;

use super::EngineContext;
use super::day::now_ms;
use super::error::{EngineError, EngineResult};
use super::models::{Challenge, Difficulty, Quest, RewardItem};
use crate::config::CatalogFile;

/// Counts from a catalog import
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    pub quests: usize,
    pub challenges: usize,
    pub reward_items: usize,
}

/// Content-side writes and reads of definitions
#[derive(Clone)]
pub struct CatalogAdmin {
    ctx: Arc<EngineContext>,
}

impl CatalogAdmin {
    pub(crate) fn new(ctx: Arc<EngineContext>) -> Self {
        Self { ctx }
    }

    pub fn upsert_quest(&self, quest: &Quest) -> EngineResult<()> {
        validate_quest(quest)?;
        self.ctx.db.write(|tx| save_quest(tx, quest, now_ms()))
    }

    pub fn upsert_challenge(&self, challenge: &Challenge) -> EngineResult<()> {
        validate_challenge(challenge)?;
        self.ctx.db.write(|tx| save_challenge(tx, challenge, now_ms()))
    }

    /// Insert or replace a reward item; an existing item's stock is overwritten
    pub fn upsert_reward_item(&self, item: &RewardItem) -> EngineResult<()> {
        validate_reward_item(item)?;
        self.ctx.db.write(|tx| save_reward_item(tx, item, now_ms()))
    }

    /// Set remaining stock; `None` makes the item unlimited
    pub fn restock(&self, item_id: &str, stock_quantity: Option<i64>) -> EngineResult<()> {
        if stock_quantity.is_some_and(|q| q < 0) {
            return Err(EngineError::InvalidInput(format!(
                "stock for '{item_id}' must not be negative"
            )));
        }
        self.update_item(
            item_id,
            "UPDATE reward_items SET stock_quantity = ?1, updated_at = ?2 WHERE item_id = ?3",
            rusqlite::params![stock_quantity, now_ms(), item_id],
        )
    }

    /// Retire or reinstate an item without deleting its redemption history
    pub fn set_item_active(&self, item_id: &str, active: bool) -> EngineResult<()> {
        self.update_item(
            item_id,
            "UPDATE reward_items SET active = ?1, updated_at = ?2 WHERE item_id = ?3",
            rusqlite::params![active, now_ms(), item_id],
        )
    }

    fn update_item(
        &self,
        item_id: &str,
        sql: &str,
        params: impl rusqlite::Params,
    ) -> EngineResult<()> {
        self.ctx.db.write(|tx| {
            if tx.execute(sql, params)? == 0 {
                return Err(EngineError::NotFound {
                    kind: "reward item",
                    id: item_id.to_string(),
                });
            }
            Ok(())
        })
    }

    pub fn quest(&self, quest_id: &str) -> EngineResult<Quest> {
        self.ctx
            .db
            .read(|conn| load_quest(conn, quest_id))?
            .ok_or_else(|| not_found("quest", quest_id))
    }

    pub fn challenge(&self, challenge_id: &str) -> EngineResult<Challenge> {
        self.ctx
            .db
            .read(|conn| load_challenge(conn, challenge_id))?
            .ok_or_else(|| not_found("challenge", challenge_id))
    }

    pub fn reward_item(&self, item_id: &str) -> EngineResult<RewardItem> {
        self.ctx
            .db
            .read(|conn| load_reward_item(conn, item_id))?
            .ok_or_else(|| not_found("reward item", item_id))
    }

    pub fn quests(&self) -> EngineResult<Vec<Quest>> {
        self.ctx.db.read(|conn| {
            let mut stmt = conn.prepare(&format!("{QUEST_SELECT} ORDER BY quest_id"))?;
            let rows = stmt
                .query_map([], quest_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows.into_iter().map(QuestRow::into_quest).collect()
        })
    }

    /// Reward items, cheapest first
    pub fn reward_items(&self, active_only: bool) -> EngineResult<Vec<RewardItem>> {
        self.ctx.db.read(|conn| {
            let mut stmt = conn.prepare(&format!(
                "{ITEM_SELECT} WHERE active = 1 OR ?1 = 0 ORDER BY xp_cost, item_id"
            ))?;
            let items = stmt
                .query_map([active_only], reward_item_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(items)
        })
    }

    /// Validate and store every definition in one transaction
    pub fn import(&self, catalog: &CatalogFile) -> EngineResult<ImportSummary> {
        let challenges: Vec<Challenge> = catalog.challenges.iter().map(|c| c.to_challenge()).collect();
        for quest in &catalog.quests {
            validate_quest(quest)?;
        }
        for challenge in &challenges {
            validate_challenge(challenge)?;
        }
        for item in &catalog.reward_items {
            validate_reward_item(item)?;
        }

        let now = now_ms();
        self.ctx.db.write(|tx| {
            for quest in &catalog.quests {
                save_quest(tx, quest, now)?;
            }
            for challenge in &challenges {
                save_challenge(tx, challenge, now)?;
            }
            for item in &catalog.reward_items {
                save_reward_item(tx, item, now)?;
            }
            Ok(())
        })?;

        let summary = ImportSummary {
            quests: catalog.quests.len(),
            challenges: challenges.len(),
            reward_items: catalog.reward_items.len(),
        };
        info!(
            "[questlog:catalog] Imported {} quests, {} challenges, {} reward items",
            summary.quests, summary.challenges, summary.reward_items
        );
        Ok(summary)
    }
}

pub(crate) fn not_found(kind: &'static str, id: &str) -> EngineError {
    EngineError::NotFound {
        kind,
        id: id.to_string(),
    }
}

fn require_id(kind: &str, id: &str) -> EngineResult<()> {
    if id.trim().is_empty() {
        return Err(EngineError::InvalidInput(format!("{kind} id must not be empty")));
    }
    Ok(())
}

fn validate_quest(quest: &Quest) -> EngineResult<()> {
    require_id("quest", &quest.quest_id)?;
    if quest.xp_reward < 0 {
        return Err(EngineError::InvalidInput(format!(
            "quest '{}' has negative xp_reward",
            quest.quest_id
        )));
    }
    Ok(())
}

fn validate_challenge(challenge: &Challenge) -> EngineResult<()> {
    require_id("challenge", &challenge.challenge_id)?;
    let id = &challenge.challenge_id;
    if challenge.xp_reward < 0 {
        return Err(EngineError::InvalidInput(format!(
            "challenge '{id}' has negative xp_reward"
        )));
    }
    if challenge.end_date <= challenge.start_date {
        return Err(EngineError::InvalidInput(format!(
            "challenge '{id}' ends before it starts"
        )));
    }
    if challenge.max_participants.is_some_and(|m| m <= 0) {
        return Err(EngineError::InvalidInput(format!(
            "challenge '{id}' must allow at least one participant"
        )));
    }
    Ok(())
}

fn validate_reward_item(item: &RewardItem) -> EngineResult<()> {
    require_id("reward item", &item.item_id)?;
    if item.xp_cost <= 0 {
        return Err(EngineError::InvalidInput(format!(
            "reward item '{}' must cost more than 0 XP",
            item.item_id
        )));
    }
    if item.stock_quantity.is_some_and(|q| q < 0) {
        return Err(EngineError::InvalidInput(format!(
            "reward item '{}' has negative stock",
            item.item_id
        )));
    }
    Ok(())
}

fn requirements_json(value: &serde_json::Value) -> EngineResult<String> {
    serde_json::to_string(value).map_err(|e| EngineError::InvalidInput(e.to_string()))
}

fn parse_requirements(raw: &str) -> EngineResult<serde_json::Value> {
    serde_json::from_str(raw)
        .map_err(|e| EngineError::InvalidInput(format!("stored requirements are not JSON: {e}")))
}

fn parse_difficulty(raw: &str) -> EngineResult<Difficulty> {
    Difficulty::parse(raw)
        .ok_or_else(|| EngineError::InvalidInput(format!("unknown difficulty '{raw}'")))
}

fn save_quest(conn: &Connection, quest: &Quest, now: i64) -> EngineResult<()> {
    conn.execute(
        r#"INSERT INTO quests (quest_id, title, difficulty, xp_reward, badge_reward, requirements, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT(quest_id) DO UPDATE SET
               title = ?2, difficulty = ?3, xp_reward = ?4, badge_reward = ?5,
               requirements = ?6, updated_at = ?7"#,
        rusqlite::params![
            quest.quest_id,
            quest.title,
            quest.difficulty.as_str(),
            quest.xp_reward,
            quest.badge_reward,
            requirements_json(&quest.requirements)?,
            now,
        ],
    )?;
    Ok(())
}

fn save_challenge(conn: &Connection, challenge: &Challenge, now: i64) -> EngineResult<()> {
    conn.execute(
        r#"INSERT INTO challenges (challenge_id, title, difficulty, xp_reward, badge_reward, requirements,
                                  start_date, end_date, max_participants, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
           ON CONFLICT(challenge_id) DO UPDATE SET
               title = ?2, difficulty = ?3, xp_reward = ?4, badge_reward = ?5, requirements = ?6,
               start_date = ?7, end_date = ?8, max_participants = ?9, updated_at = ?10"#,
        rusqlite::params![
            challenge.challenge_id,
            challenge.title,
            challenge.difficulty.as_str(),
            challenge.xp_reward,
            challenge.badge_reward,
            requirements_json(&challenge.requirements)?,
            challenge.start_date,
            challenge.end_date,
            challenge.max_participants,
            now,
        ],
    )?;
    Ok(())
}

fn save_reward_item(conn: &Connection, item: &RewardItem, now: i64) -> EngineResult<()> {
    conn.execute(
        r#"INSERT INTO reward_items (item_id, name, description, xp_cost, stock_quantity, active, updated_at)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT(item_id) DO UPDATE SET
               name = ?2, description = ?3, xp_cost = ?4, stock_quantity = ?5, active = ?6, updated_at = ?7"#,
        rusqlite::params![
            item.item_id,
            item.name,
            item.description,
            item.xp_cost,
            item.stock_quantity,
            item.active,
            now,
        ],
    )?;
    Ok(())
}

const QUEST_SELECT: &str =
    "SELECT quest_id, title, difficulty, xp_reward, badge_reward, requirements FROM quests";

const CHALLENGE_SELECT: &str = r#"SELECT challenge_id, title, difficulty, xp_reward, badge_reward,
    requirements, start_date, end_date, max_participants FROM challenges"#;

const ITEM_SELECT: &str =
    "SELECT item_id, name, description, xp_cost, stock_quantity, active FROM reward_items";

/// Raw quest columns; text fields are parsed outside the rusqlite closure
struct QuestRow {
    quest_id: String,
    title: String,
    difficulty: String,
    xp_reward: i64,
    badge_reward: Option<String>,
    requirements: String,
}

impl QuestRow {
    fn into_quest(self) -> EngineResult<Quest> {
        Ok(Quest {
            difficulty: parse_difficulty(&self.difficulty)?,
            requirements: parse_requirements(&self.requirements)?,
            quest_id: self.quest_id,
            title: self.title,
            xp_reward: self.xp_reward,
            badge_reward: self.badge_reward,
        })
    }
}

fn quest_row(r: &Row<'_>) -> rusqlite::Result<QuestRow> {
    Ok(QuestRow {
        quest_id: r.get(0)?,
        title: r.get(1)?,
        difficulty: r.get(2)?,
        xp_reward: r.get(3)?,
        badge_reward: r.get(4)?,
        requirements: r.get(5)?,
    })
}

fn reward_item_row(r: &Row<'_>) -> rusqlite::Result<RewardItem> {
    Ok(RewardItem {
        item_id: r.get(0)?,
        name: r.get(1)?,
        description: r.get(2)?,
        xp_cost: r.get(3)?,
        stock_quantity: r.get(4)?,
        active: r.get(5)?,
    })
}

pub(crate) fn load_quest(conn: &Connection, quest_id: &str) -> EngineResult<Option<Quest>> {
    conn.query_row(&format!("{QUEST_SELECT} WHERE quest_id = ?1"), [quest_id], quest_row)
        .optional()?
        .map(QuestRow::into_quest)
        .transpose()
}

pub(crate) fn load_challenge(conn: &Connection, challenge_id: &str) -> EngineResult<Option<Challenge>> {
    let row = conn
        .query_row(
            &format!("{CHALLENGE_SELECT} WHERE challenge_id = ?1"),
            [challenge_id],
            |r| {
                Ok((
                    QuestRow {
                        quest_id: r.get(0)?,
                        title: r.get(1)?,
                        difficulty: r.get(2)?,
                        xp_reward: r.get(3)?,
                        badge_reward: r.get(4)?,
                        requirements: r.get(5)?,
                    },
                    r.get::<_, i64>(6)?,
                    r.get::<_, i64>(7)?,
                    r.get::<_, Option<i64>>(8)?,
                ))
            },
        )
        .optional()?;

    let Some((base, start_date, end_date, max_participants)) = row else {
        return Ok(None);
    };
    let base = base.into_quest()?;
    Ok(Some(Challenge {
        challenge_id: base.quest_id,
        title: base.title,
        difficulty: base.difficulty,
        xp_reward: base.xp_reward,
        badge_reward: base.badge_reward,
        requirements: base.requirements,
        start_date,
        end_date,
        max_participants,
    }))
}

pub(crate) fn load_reward_item(conn: &Connection, item_id: &str) -> EngineResult<Option<RewardItem>> {
    Ok(conn
        .query_row(&format!("{ITEM_SELECT} WHERE item_id = ?1"), [item_id], reward_item_row)
        .optional()?)
}

//! Catalog import file
//!
//! The content team authors quests, challenges and reward items in TOML:
//!
//! ```toml
//! [[quest]]
//! quest_id = "q-first-lesson"
//! title = "Finish your first lesson"
//! difficulty = "easy"
//! xp_reward = 100
//! badge_reward = "first-steps"
//! requirements = { lessons_completed = 1 }
//!
//! [[challenge]]
//! challenge_id = "c-october-sprint"
//! difficulty = "medium"
//! xp_reward = 300
//! starts_at = "2026-10-01T00:00:00Z"
//! ends_at = "2026-10-31T23:59:59Z"
//! max_participants = 200
//!
//! [[reward_item]]
//! item_id = "mentor-call"
//! name = "30 minute mentor call"
//! xp_cost = 800
//! stock_quantity = 25
//! ```

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::progress::{Challenge, Difficulty, Quest, RewardItem};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogFile {
    #[serde(default, rename = "quest")]
    pub quests: Vec<Quest>,

    #[serde(default, rename = "challenge")]
    pub challenges: Vec<ChallengeEntry>,

    #[serde(default, rename = "reward_item")]
    pub reward_items: Vec<RewardItem>,
}

/// Challenge as authored; the window is written as RFC 3339 timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChallengeEntry {
    pub challenge_id: String,
    #[serde(default)]
    pub title: String,
    pub difficulty: Difficulty,
    pub xp_reward: i64,
    #[serde(default)]
    pub badge_reward: Option<String>,
    #[serde(default)]
    pub requirements: serde_json::Value,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub max_participants: Option<i64>,
}

impl ChallengeEntry {
    pub fn to_challenge(&self) -> Challenge {
        Challenge {
            challenge_id: self.challenge_id.clone(),
            title: self.title.clone(),
            difficulty: self.difficulty,
            xp_reward: self.xp_reward,
            badge_reward: self.badge_reward.clone(),
            requirements: self.requirements.clone(),
            start_date: self.starts_at.timestamp_millis(),
            end_date: self.ends_at.timestamp_millis(),
            max_participants: self.max_participants,
        }
    }
}

impl CatalogFile {
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read catalog file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse catalog file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn is_empty(&self) -> bool {
        self.quests.is_empty() && self.challenges.is_empty() && self.reward_items.is_empty()
    }
}

//! Data models for the progression engine

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::levels::LevelCurve;

/// Per-user progression aggregate as persisted
///
/// `version == 0` means the row does not exist yet; the first successful
/// write creates it at version 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserProgression {
    pub user_id: String,
    /// Lifetime XP, never decreases
    pub total_xp_earned: i64,
    /// Balance available for reward purchases
    pub spendable_xp: i64,
    pub version: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

impl UserProgression {
    /// Empty aggregate for a user with no activity yet
    pub fn empty(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            total_xp_earned: 0,
            spendable_xp: 0,
            version: 0,
            created_at: 0,
            updated_at: 0,
        }
    }

    pub fn exists(&self) -> bool {
        self.version > 0
    }

    /// Attach the derived level
    pub fn snapshot(&self, curve: &dyn LevelCurve) -> ProgressionSnapshot {
        ProgressionSnapshot {
            user_id: self.user_id.clone(),
            total_xp_earned: self.total_xp_earned,
            spendable_xp: self.spendable_xp,
            current_level: curve.level_of(self.total_xp_earned),
            version: self.version,
        }
    }
}

/// Aggregate with its derived level attached, as returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProgressionSnapshot {
    pub user_id: String,
    pub total_xp_earned: i64,
    pub spendable_xp: i64,
    pub current_level: u32,
    pub version: i64,
}

/// Streak counter for one user and one activity type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreakRecord {
    pub user_id: String,
    pub streak_type: String,
    pub current_streak: u32,
    pub longest_streak: u32,
    pub last_activity_date: NaiveDate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "easy" => Some(Self::Easy),
            "medium" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }
}

/// Quest definition, authored by the content team
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quest {
    pub quest_id: String,
    #[serde(default)]
    pub title: String,
    pub difficulty: Difficulty,
    pub xp_reward: i64,
    #[serde(default)]
    pub badge_reward: Option<String>,
    /// Opaque to the engine; interpreted by the requirement evaluator
    #[serde(default)]
    pub requirements: serde_json::Value,
}

/// Lifecycle of a user's quest or challenge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    NotStarted,
    InProgress,
    Completed,
    Abandoned,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotStarted => "not_started",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "not_started" => Some(Self::NotStarted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}

/// A user's run at a quest
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserQuest {
    pub user_id: String,
    pub quest_id: String,
    pub status: QuestStatus,
    /// Set once, on completion
    pub xp_earned: Option<i64>,
    pub started_at: i64,
    /// Set once, on completion
    pub completed_at: Option<i64>,
}

/// Time-boxed quest with a participant cap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Challenge {
    pub challenge_id: String,
    #[serde(default)]
    pub title: String,
    pub difficulty: Difficulty,
    pub xp_reward: i64,
    #[serde(default)]
    pub badge_reward: Option<String>,
    #[serde(default)]
    pub requirements: serde_json::Value,
    /// Window start, Unix ms
    pub start_date: i64,
    /// Window end, Unix ms
    pub end_date: i64,
    /// None means unlimited
    #[serde(default)]
    pub max_participants: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserChallenge {
    pub user_id: String,
    pub challenge_id: String,
    pub status: QuestStatus,
    pub xp_earned: Option<i64>,
    pub joined_at: i64,
    pub completed_at: Option<i64>,
}

/// Redeemable item in the reward store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardItem {
    pub item_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub xp_cost: i64,
    /// None means unlimited
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_true() -> bool {
    true
}

/// Redemption record, immutable once written
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserReward {
    pub reward_id: String,
    pub user_id: String,
    pub item_id: String,
    pub xp_spent: i64,
    pub redemption_code: String,
    pub purchased_at: i64,
}

/// One applied XP award
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub user_id: String,
    pub idempotency_key: String,
    pub amount: i64,
    pub reason: String,
    pub created_at: i64,
}

/// A badge unlocked by the engine and handed to the achievement collaborator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BadgeUnlock {
    pub user_id: String,
    pub badge_id: String,
    /// What unlocked it, e.g. "quest:<id>"
    pub source: String,
    pub unlocked_at: i64,
    pub delivered_at: Option<i64>,
}

/// Leaderboard row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: u32,
    pub user_id: String,
    pub total_xp_earned: i64,
    pub level: u32,
}

//! Events produced by committed engine operations
//!
//! Events are emitted only after the transaction that caused them has
//! committed. They are observational: sinks cannot veto or alter state.

use serde::Serialize;

/// A level up event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LevelUp {
    pub user_id: String,
    pub old_level: u32,
    pub new_level: u32,
    pub new_title: String,
}

/// Everything the notification collaborator may want to render
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    XpAwarded {
        user_id: String,
        amount: i64,
        reason: String,
        idempotency_key: String,
    },
    LevelUp(LevelUp),
    StreakExtended {
        user_id: String,
        streak_type: String,
        count: u32,
    },
    StreakReset {
        user_id: String,
        streak_type: String,
        previous: u32,
    },
    NewLongestStreak {
        user_id: String,
        streak_type: String,
        longest: u32,
    },
    QuestStarted {
        user_id: String,
        quest_id: String,
    },
    QuestCompleted {
        user_id: String,
        quest_id: String,
        xp_earned: i64,
    },
    QuestAbandoned {
        user_id: String,
        quest_id: String,
    },
    ChallengeJoined {
        user_id: String,
        challenge_id: String,
    },
    ChallengeCompleted {
        user_id: String,
        challenge_id: String,
        xp_earned: i64,
    },
    BadgeUnlocked {
        user_id: String,
        badge_id: String,
        source: String,
    },
    RewardRedeemed {
        user_id: String,
        item_id: String,
        xp_spent: i64,
        redemption_code: String,
    },
}

impl EngineEvent {
    pub fn user_id(&self) -> &str {
        match self {
            Self::XpAwarded { user_id, .. }
            | Self::StreakExtended { user_id, .. }
            | Self::StreakReset { user_id, .. }
            | Self::NewLongestStreak { user_id, .. }
            | Self::QuestStarted { user_id, .. }
            | Self::QuestCompleted { user_id, .. }
            | Self::QuestAbandoned { user_id, .. }
            | Self::ChallengeJoined { user_id, .. }
            | Self::ChallengeCompleted { user_id, .. }
            | Self::BadgeUnlocked { user_id, .. }
            | Self::RewardRedeemed { user_id, .. } => user_id,
            Self::LevelUp(level_up) => &level_up.user_id,
        }
    }

    /// Short label for logs
    pub fn name(&self) -> &'static str {
        match self {
            Self::XpAwarded { .. } => "xp_awarded",
            Self::LevelUp(_) => "level_up",
            Self::StreakExtended { .. } => "streak_extended",
            Self::StreakReset { .. } => "streak_reset",
            Self::NewLongestStreak { .. } => "new_longest_streak",
            Self::QuestStarted { .. } => "quest_started",
            Self::QuestCompleted { .. } => "quest_completed",
            Self::QuestAbandoned { .. } => "quest_abandoned",
            Self::ChallengeJoined { .. } => "challenge_joined",
            Self::ChallengeCompleted { .. } => "challenge_completed",
            Self::BadgeUnlocked { .. } => "badge_unlocked",
            Self::RewardRedeemed { .. } => "reward_redeemed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = EngineEvent::LevelUp(LevelUp {
            user_id: "u1".into(),
            old_level: 1,
            new_level: 2,
            new_title: "Learner".into(),
        });
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "level_up");
        assert_eq!(json["new_level"], 2);
        assert_eq!(event.user_id(), "u1");
    }
}

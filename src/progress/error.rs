//! Error taxonomy for the progression engine

use std::time::Duration;

use chrono::NaiveDate;

/// Why a challenge refused a join or completion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClosedReason {
    NotYetOpen,
    Ended,
}

impl ClosedReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotYetOpen => "has not started yet",
            Self::Ended => "has already ended",
        }
    }
}

/// Every failure the engine can report
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("progression for user {user_id} was modified concurrently; retry with a fresh read")]
    Conflict { user_id: String },

    #[error("event '{key}' was already applied for user {user_id}")]
    DuplicateEvent { user_id: String, key: String },

    #[error(
        "insufficient balance: costs {cost} XP but only {available} XP is available ({shortfall} XP short)"
    )]
    InsufficientBalance {
        cost: i64,
        available: i64,
        shortfall: i64,
    },

    #[error("reward item '{item_id}' is out of stock")]
    OutOfStock { item_id: String },

    #[error("{kind} '{id}' was already started")]
    AlreadyStarted { kind: &'static str, id: String },

    #[error("{kind} '{id}' was already completed")]
    AlreadyCompleted { kind: &'static str, id: String },

    #[error("{kind} '{id}' was abandoned and cannot be started again")]
    Abandoned { kind: &'static str, id: String },

    #[error("{kind} '{id}' is not in progress")]
    NotStarted { kind: &'static str, id: String },

    #[error("challenge '{challenge_id}' is full ({max_participants} participants)")]
    ChallengeFull {
        challenge_id: String,
        max_participants: i64,
    },

    #[error("challenge '{challenge_id}' {}", .reason.as_str())]
    ChallengeClosed {
        challenge_id: String,
        reason: ClosedReason,
    },

    #[error(
        "out-of-order {streak_type} activity on {attempted} (last recorded {last}); refusing to rewind"
    )]
    OutOfOrderEvent {
        streak_type: String,
        last: NaiveDate,
        attempted: NaiveDate,
    },

    #[error("{kind} '{id}' requirements are not satisfied by the supplied evidence")]
    RequirementsNotMet { kind: &'static str, id: String },

    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("invalid XP amount {0}: must be positive")]
    InvalidAmount(i64),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{operation} timed out after {after:?}")]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    #[error("collaborator failed: {0}")]
    Collaborator(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("progress database lock poisoned")]
    LockPoisoned,

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl EngineError {
    /// The caller may try again with a fresh read
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::Timeout { .. })
    }

    /// The desired end state already holds; report success upstream
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            Self::DuplicateEvent { .. } | Self::AlreadyStarted { .. } | Self::AlreadyCompleted { .. }
        )
    }

    /// Short machine-readable kind, used in logs and CLI output
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Conflict { .. } => "conflict",
            Self::DuplicateEvent { .. } => "duplicate_event",
            Self::InsufficientBalance { .. } => "insufficient_balance",
            Self::OutOfStock { .. } => "out_of_stock",
            Self::AlreadyStarted { .. } => "already_started",
            Self::AlreadyCompleted { .. } => "already_completed",
            Self::Abandoned { .. } => "abandoned",
            Self::NotStarted { .. } => "not_started",
            Self::ChallengeFull { .. } => "challenge_full",
            Self::ChallengeClosed { .. } => "challenge_closed",
            Self::OutOfOrderEvent { .. } => "out_of_order_event",
            Self::RequirementsNotMet { .. } => "requirements_not_met",
            Self::NotFound { .. } => "not_found",
            Self::InvalidAmount(_) => "invalid_amount",
            Self::InvalidInput(_) => "invalid_input",
            Self::Timeout { .. } => "timeout",
            Self::Collaborator(_) => "collaborator",
            Self::Config(_) => "config",
            Self::LockPoisoned => "lock_poisoned",
            Self::Storage(_) => "storage",
        }
    }
}

pub type EngineResult<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_balance_states_shortfall() {
        let err = EngineError::InsufficientBalance {
            cost: 120,
            available: 30,
            shortfall: 90,
        };
        let msg = err.to_string();
        assert!(msg.contains("90 XP short"), "{msg}");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_classification() {
        let conflict = EngineError::Conflict {
            user_id: "u1".into(),
        };
        assert!(conflict.is_retryable());
        assert!(!conflict.is_benign());

        let dup = EngineError::DuplicateEvent {
            user_id: "u1".into(),
            key: "login:2026-01-01".into(),
        };
        assert!(dup.is_benign());
        assert_eq!(dup.kind(), "duplicate_event");

        let closed = EngineError::ChallengeClosed {
            challenge_id: "c1".into(),
            reason: ClosedReason::Ended,
        };
        assert_eq!(closed.to_string(), "challenge 'c1' has already ended");
    }
}

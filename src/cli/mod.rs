//! CLI command implementations
//!
//! Every command prints its result as pretty JSON on stdout; logs go to stderr.

pub mod catalog;
pub mod init;
pub mod quest;
pub mod status;
pub mod store;
pub mod xp;

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;

use questlog::config::EngineConfig;
use questlog::progress::{EngineError, ProgressionEngine};

/// Load the config and open the engine on the configured database
pub fn open_engine(config_path: Option<&Path>, db_path: Option<&Path>) -> Result<ProgressionEngine> {
    let config = EngineConfig::load(config_path)?;
    ProgressionEngine::open(&config, db_path).context("Failed to open progress database")
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse `--evidence` JSON
pub fn parse_evidence(raw: &str) -> Result<serde_json::Value> {
    serde_json::from_str(raw).with_context(|| format!("Evidence is not valid JSON: {raw}"))
}

/// What a failed command prints
#[derive(Debug, Serialize)]
pub struct ErrorReport {
    pub error: &'static str,
    pub message: String,
    pub retryable: bool,
}

impl ErrorReport {
    pub fn from_error(err: &anyhow::Error) -> Self {
        match err.downcast_ref::<EngineError>() {
            Some(engine_err) => Self {
                error: engine_err.kind(),
                message: engine_err.to_string(),
                retryable: engine_err.is_retryable(),
            },
            None => Self {
                error: "internal",
                message: format!("{err:#}"),
                retryable: false,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_errors_report_their_kind() {
        let err = anyhow::Error::from(EngineError::InsufficientBalance {
            cost: 120,
            available: 30,
            shortfall: 90,
        });
        let report = ErrorReport::from_error(&err);
        assert_eq!(report.error, "insufficient_balance");
        assert!(report.message.contains("90 XP short"));
        assert!(!report.retryable);

        let conflict = anyhow::Error::from(EngineError::Conflict {
            user_id: "u1".into(),
        })
        .context("purchase failed");
        let report = ErrorReport::from_error(&conflict);
        assert_eq!(report.error, "conflict");
        assert!(report.retryable);
    }

    #[test]
    fn test_other_errors_are_internal() {
        let err = parse_evidence("{not json").unwrap_err();
        let report = ErrorReport::from_error(&err);
        assert_eq!(report.error, "internal");
        assert!(report.message.contains("not valid JSON"));
    }
}

//! Configuration loading and management
//!
//! `~/.questlog/config.toml` holds engine tuning (retries, timeouts, day
//! boundary) and the level curve. Every field has a default, so an empty or
//! missing file is a valid configuration.

mod catalog;

pub use catalog::{CatalogFile, ChallengeEntry};

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::progress::{
    DEFAULT_LEVELS, DayBoundary, EngineError, Level, LevelCurve, LevelTable, LinearCurve,
    RetryPolicy,
};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Concurrency, timeout and formatting knobs
    #[serde(default)]
    pub engine: EngineSettings,

    /// XP-to-level curve
    #[serde(default)]
    pub leveling: LevelingConfig,

    /// Daily login rewards
    #[serde(default)]
    pub login: LoginSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Extra attempts after a version conflict before it is surfaced
    pub max_conflict_retries: u32,
    /// Upper bound on requirement evaluation and badge delivery
    pub collaborator_timeout_ms: u64,
    /// Upper bound on waiting for the SQLite write lock
    pub busy_timeout_ms: u64,
    /// Streak day boundary, minutes east of UTC
    pub streak_utc_offset_minutes: i32,
    pub redemption_code_prefix: String,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_conflict_retries: 5,
            collaborator_timeout_ms: 3000,
            busy_timeout_ms: 5000,
            streak_utc_offset_minutes: 0,
            redemption_code_prefix: "RWD".to_string(),
        }
    }
}

/// Level curve selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "curve", rename_all = "snake_case")]
pub enum LevelingConfig {
    Table {
        #[serde(default = "default_levels")]
        levels: Vec<Level>,
    },
    Linear {
        xp_per_level: i64,
    },
}

fn default_levels() -> Vec<Level> {
    DEFAULT_LEVELS.clone()
}

impl Default for LevelingConfig {
    fn default() -> Self {
        Self::Table {
            levels: default_levels(),
        }
    }
}

impl LevelingConfig {
    /// Build the configured curve, rejecting tables that are not monotonic
    pub fn build(&self) -> Result<Arc<dyn LevelCurve>, EngineError> {
        Ok(match self {
            Self::Table { levels } => Arc::new(LevelTable::new(levels.clone())?),
            Self::Linear { xp_per_level } => Arc::new(LinearCurve::new(*xp_per_level)?),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoginSettings {
    /// XP for the first login of each day (0 disables the award)
    pub daily_login_xp: i64,
}

impl Default for LoginSettings {
    fn default() -> Self {
        Self { daily_login_xp: 50 }
    }
}

impl EngineConfig {
    /// Get the data directory (~/.questlog)
    pub fn data_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".questlog")
    }

    /// Get the default config file path (~/.questlog/config.toml)
    pub fn default_path() -> PathBuf {
        Self::data_dir().join("config.toml")
    }

    /// Load configuration from a file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if given, else the default file if it exists, else defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = Self::default_path();
                if default_path.exists() {
                    Self::from_file(&default_path)
                } else {
                    tracing::debug!("No config at {}, using defaults", default_path.display());
                    Ok(Self::default())
                }
            }
        }
    }

    /// Check everything that can be checked without a database
    pub fn validate(&self) -> Result<(), EngineError> {
        self.leveling.build()?;
        self.day_boundary()?;
        if self.login.daily_login_xp < 0 {
            return Err(EngineError::Config("daily_login_xp must not be negative".into()));
        }
        if self.engine.redemption_code_prefix.trim().is_empty() {
            return Err(EngineError::Config("redemption_code_prefix must not be empty".into()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::with_retries(self.engine.max_conflict_retries)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.collaborator_timeout_ms)
    }

    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.engine.busy_timeout_ms)
    }

    pub fn day_boundary(&self) -> Result<DayBoundary, EngineError> {
        DayBoundary::from_offset_minutes(self.engine.streak_utc_offset_minutes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.retry_policy().max_attempts, 6);
        assert_eq!(config.login.daily_login_xp, 50);
    }

    #[test]
    fn test_linear_curve_config() {
        let config = EngineConfig::from_toml_str(
            r#"
            [engine]
            max_conflict_retries = 2
            streak_utc_offset_minutes = -300

            [leveling]
            curve = "linear"
            xp_per_level = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.engine.max_conflict_retries, 2);
        assert_eq!(config.engine.collaborator_timeout_ms, 3000);
        let curve = config.leveling.build().unwrap();
        assert_eq!(curve.level_of(499), 2);
        assert_eq!(curve.level_of(500), 3);
    }

    #[test]
    fn test_custom_table_is_validated() {
        let bad = EngineConfig::from_toml_str(
            r#"
            [leveling]
            curve = "table"

            [[leveling.levels]]
            level = 1
            xp_required = 0
            title = "One"

            [[leveling.levels]]
            level = 2
            xp_required = 0
            title = "Two"
            "#,
        );
        assert!(bad.is_err());

        let good = EngineConfig::from_toml_str(
            r#"
            [leveling]
            curve = "table"

            [[leveling.levels]]
            level = 1
            xp_required = 0
            title = "One"

            [[leveling.levels]]
            level = 2
            xp_required = 10
            title = "Two"
            "#,
        )
        .unwrap();
        let curve = good.leveling.build().unwrap();
        assert_eq!(curve.level_of(10), 2);
        assert_eq!(curve.max_level(), Some(2));
    }

    #[test]
    fn test_invalid_offset_rejected() {
        let err = EngineConfig::from_toml_str("[engine]\nstreak_utc_offset_minutes = 100000\n");
        assert!(err.is_err());
    }

    #[test]
    fn test_load_explicit_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[login]\ndaily_login_xp = 25\n").unwrap();

        let config = EngineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.login.daily_login_xp, 25);
        assert_eq!(config.engine, EngineConfig::default().engine);

        let missing = EngineConfig::load(Some(&dir.path().join("missing.toml")));
        assert!(missing.unwrap_err().to_string().contains("Failed to read config file"));
    }
}

//! Init command implementation

use anyhow::{Result, bail};
use std::path::PathBuf;

use questlog::config::EngineConfig;
use questlog::progress::ProgressDb;

/// Default configuration content for questlog init
pub const DEFAULT_CONFIG: &str = r#"# questlog configuration
# =======================
#
# Every key is optional; the values below are the defaults.

[engine]
# Extra attempts after a concurrent modification before giving up
max_conflict_retries = 5
# Upper bound on requirement checks and badge delivery
collaborator_timeout_ms = 3000
# Upper bound on waiting for the database write lock
busy_timeout_ms = 5000
# Streak days start at midnight in this offset (minutes east of UTC)
streak_utc_offset_minutes = 0
# Redemption codes look like RWD-MGX3K2Q1-9F03A1C7
redemption_code_prefix = "RWD"

[leveling]
# "table" uses the built-in 30-level table (or [[leveling.levels]] rows),
# "linear" grants a level every `xp_per_level` XP
curve = "table"

# [leveling]
# curve = "linear"
# xp_per_level = 500

[login]
# XP for the first login of each day (0 disables)
daily_login_xp = 50
"#;

/// Write the default config and create an empty database
pub fn init_command(config_path: Option<PathBuf>, db_path: Option<PathBuf>, force: bool) -> Result<()> {
    let config_path = config_path.unwrap_or_else(EngineConfig::default_path);

    if config_path.exists() && !force {
        bail!(
            "Configuration already exists: {}\nUse --force to overwrite.",
            config_path.display()
        );
    }

    if let Some(parent) = config_path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Fail before writing if the template ever stops parsing
    let config = EngineConfig::from_toml_str(DEFAULT_CONFIG)?;
    std::fs::write(&config_path, DEFAULT_CONFIG)?;
    println!("Created: {}", config_path.display());

    let db_path = db_path.unwrap_or_else(|| EngineConfig::data_dir().join("progress.db"));
    ProgressDb::open(&db_path, config.busy_timeout())?;
    println!("Database: {}", db_path.display());

    Ok(())
}

//! Shared test utilities for engine integration tests

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use questlog::config::{CatalogFile, EngineConfig};
use questlog::progress::{EngineEvent, EventSink, ProgressionEngine};

/// Content used across the scenario tests
pub const CATALOG: &str = r#"
[[quest]]
quest_id = "q-sql-basics"
title = "Finish the SQL basics track"
difficulty = "medium"
xp_reward = 100
badge_reward = "sql-starter"
requirements = { lessons_completed = 5 }

[[quest]]
quest_id = "q-profile"
title = "Complete your profile"
difficulty = "easy"
xp_reward = 20

[[challenge]]
challenge_id = "c-october-sprint"
title = "October sprint"
difficulty = "hard"
xp_reward = 300
badge_reward = "sprinter"
requirements = { lessons_completed = 10 }
starts_at = "2026-10-01T00:00:00Z"
ends_at = "2026-10-31T23:59:59Z"
max_participants = 3

[[reward_item]]
item_id = "sticker-pack"
name = "Sticker pack"
xp_cost = 120

[[reward_item]]
item_id = "mentor-call"
name = "30 minute mentor call"
xp_cost = 80
stock_quantity = 5
"#;

/// A database file in a fresh temp dir
pub struct TestDb {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestDb {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("progress.db");
        Self { dir, path }
    }

    pub fn engine(&self, config: &EngineConfig) -> ProgressionEngine {
        open_engine(&self.path, config)
    }
}

pub fn open_engine(path: &Path, config: &EngineConfig) -> ProgressionEngine {
    ProgressionEngine::open(config, Some(path)).expect("Failed to open engine")
}

/// Config with a deep retry budget, for tests that hammer one user
pub fn contended_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.engine.max_conflict_retries = 500;
    config
}

/// Engine with the default config and [`CATALOG`] loaded
pub fn seeded_engine() -> (TestDb, ProgressionEngine) {
    let db = TestDb::new();
    let engine = db.engine(&EngineConfig::default());
    load_catalog(&engine);
    (db, engine)
}

pub fn load_catalog(engine: &ProgressionEngine) {
    let catalog = CatalogFile::from_toml_str(CATALOG).expect("Failed to parse catalog");
    engine
        .catalog()
        .import(&catalog)
        .expect("Failed to import catalog");
}

/// Collects published events
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<EngineEvent>>,
}

impl CollectingSink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events.lock().unwrap().iter().map(|e| e.name()).collect()
    }
}

impl EventSink for CollectingSink {
    fn publish(&self, event: &EngineEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

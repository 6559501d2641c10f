//! End-to-end progression scenarios against a real database file

mod common;

use chrono::{NaiveDate, TimeZone, Utc};
use serde_json::json;

use common::{CollectingSink, TestDb, seeded_engine};
use questlog::config::{EngineConfig, LevelingConfig};
use questlog::progress::{EngineError, LEARNING_STREAK, QuestStatus, StreakChange};

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 10, d).unwrap()
}

#[tokio::test]
async fn test_earn_then_spend_scenario() {
    let (_db, engine) = seeded_engine();

    let login = engine.award_xp("u1", 50, "daily login", "login:2026-10-19").unwrap();
    assert!(login.applied);
    assert_eq!(login.progression.total_xp_earned, 50);
    assert_eq!(login.progression.spendable_xp, 50);

    engine.start_quest("u1", "q-sql-basics").unwrap();
    let quest = engine
        .complete_quest("u1", "q-sql-basics", &json!({ "lessons_completed": 5 }))
        .await
        .unwrap();
    let award = quest.award.expect("quest XP");
    assert_eq!(award.progression.total_xp_earned, 150);
    assert_eq!(award.progression.spendable_xp, 150);
    // 150 XP crosses the level 3 threshold
    assert!(award.leveled_up);
    assert_eq!(award.new_level, Some(3));

    let bought = engine.purchase("u1", "sticker-pack").unwrap();
    assert_eq!(bought.progression.spendable_xp, 30);
    assert_eq!(bought.progression.total_xp_earned, 150);
    assert!(!bought.reward.redemption_code.is_empty());

    let err = engine.purchase("u1", "sticker-pack").unwrap_err();
    assert!(matches!(err, EngineError::InsufficientBalance { shortfall: 90, .. }));
    assert!(err.to_string().contains("90 XP short"));

    let audit = engine.db().audit("u1").unwrap();
    assert!(audit.is_consistent());
    assert_eq!(audit.spent_total, 120);
}

#[test]
fn test_learning_streak_scenario() {
    let (_db, engine) = seeded_engine();
    let streaks = engine.streaks();

    let first = streaks.record_activity("u1", LEARNING_STREAK, day(1)).unwrap();
    assert_eq!(first.record.current_streak, 1);

    let second = streaks.record_activity("u1", LEARNING_STREAK, day(2)).unwrap();
    assert_eq!(second.record.current_streak, 2);
    assert!(second.is_new_longest);

    let same_day = streaks.record_activity("u1", LEARNING_STREAK, day(2)).unwrap();
    assert_eq!(same_day.change, StreakChange::SameDay);
    assert_eq!(same_day.record.current_streak, 2);

    let after_gap = streaks.record_activity("u1", LEARNING_STREAK, day(5)).unwrap();
    assert_eq!(after_gap.change, StreakChange::Reset);
    assert_eq!(after_gap.record.current_streak, 1);
    assert_eq!(after_gap.record.longest_streak, 2);

    let rewind = streaks.record_activity("u1", LEARNING_STREAK, day(3)).unwrap_err();
    assert!(matches!(rewind, EngineError::OutOfOrderEvent { .. }));
    let stored = streaks.get("u1", LEARNING_STREAK).unwrap().unwrap();
    assert_eq!(stored.last_activity_date, day(5));
}

#[test]
fn test_award_sum_and_replay() {
    let (_db, engine) = seeded_engine();
    let amounts = [5, 45, 100, 350, 1, 999];

    for (i, amount) in amounts.iter().enumerate() {
        engine
            .award_xp("u1", *amount, "lesson", &format!("lesson:{i}"))
            .unwrap();
    }
    // Replaying every key changes nothing
    for (i, amount) in amounts.iter().enumerate() {
        let replay = engine
            .award_xp("u1", *amount, "lesson", &format!("lesson:{i}"))
            .unwrap();
        assert!(!replay.applied);
    }

    let snapshot = engine.ledger().snapshot("u1").unwrap();
    let expected: i64 = amounts.iter().sum();
    assert_eq!(snapshot.total_xp_earned, expected);
    assert_eq!(
        snapshot.current_level,
        engine.level_curve().level_of(expected)
    );
    assert_eq!(engine.ledger().history("u1").unwrap().len(), amounts.len());
}

#[tokio::test]
async fn test_quest_completion_is_idempotent() {
    let (_db, engine) = seeded_engine();
    engine.start_quest("u1", "q-profile").unwrap();

    let first = engine.complete_quest("u1", "q-profile", &json!({})).await.unwrap();
    let second = engine.complete_quest("u1", "q-profile", &json!({})).await.unwrap();

    assert_eq!(first.user_quest.status, QuestStatus::Completed);
    assert_eq!(second.user_quest.status, QuestStatus::Completed);
    assert!(second.already_completed);
    assert_eq!(engine.ledger().snapshot("u1").unwrap().total_xp_earned, 20);
    assert!(
        engine
            .ledger()
            .has_applied("u1", "quest:q-profile:user:u1")
            .unwrap()
    );
}

#[tokio::test]
async fn test_challenge_flow_and_capacity() {
    let (_db, engine) = seeded_engine();
    let during = Utc.with_ymd_and_hms(2026, 10, 10, 9, 0, 0).unwrap();

    for user in ["u1", "u2", "u3"] {
        engine.join_challenge(user, "c-october-sprint", during).unwrap();
    }
    let full = engine
        .join_challenge("u4", "c-october-sprint", during)
        .unwrap_err();
    assert!(matches!(full, EngineError::ChallengeFull { .. }));
    assert!(full.to_string().contains("full"));

    // Rejoining is reported as success
    assert!(
        engine
            .join_challenge("u1", "c-october-sprint", during)
            .unwrap()
            .already_joined
    );

    let done = engine
        .complete_challenge(
            "u1",
            "c-october-sprint",
            &json!({ "lessons_completed": 10 }),
            during,
        )
        .await
        .unwrap();
    assert_eq!(done.award.unwrap().progression.total_xp_earned, 300);
    assert_eq!(done.badge_unlocked.as_deref(), Some("sprinter"));

    let after = Utc.with_ymd_and_hms(2026, 11, 2, 9, 0, 0).unwrap();
    let closed = engine
        .complete_challenge("u2", "c-october-sprint", &json!({ "lessons_completed": 10 }), after)
        .await
        .unwrap_err();
    assert!(matches!(closed, EngineError::ChallengeClosed { .. }));
}

#[test]
fn test_leaderboard_follows_progression() {
    let (_db, engine) = seeded_engine();
    engine.award_xp("early", 300, "seed", "seed").unwrap();
    engine.award_xp("late", 300, "seed", "seed").unwrap();
    engine.award_xp("top", 1_000, "seed", "seed").unwrap();

    let board = engine
        .leaderboard()
        .rank(&questlog::progress::LeaderboardScope::Global { limit: 10 })
        .unwrap();
    let order: Vec<&str> = board.iter().map(|e| e.user_id.as_str()).collect();
    assert_eq!(order, vec!["top", "early", "late"]);

    engine.award_xp("late", 1, "bump", "bump").unwrap();
    let late = engine.leaderboard().position_of("late").unwrap().unwrap();
    assert_eq!(late.rank, 2);
}

#[test]
fn test_events_reach_sink() {
    let db = TestDb::new();
    let sink = CollectingSink::new();
    let engine = db
        .engine(&EngineConfig::default())
        .with_event_sink(sink.clone());

    engine
        .record_login("u1", Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap())
        .unwrap();
    assert_eq!(sink.names(), vec!["streak_extended", "xp_awarded", "level_up"]);
}

#[test]
fn test_linear_curve_from_config() {
    let db = TestDb::new();
    let mut config = EngineConfig::default();
    config.leveling = LevelingConfig::Linear { xp_per_level: 100 };
    let engine = db.engine(&config);

    let outcome = engine.award_xp("u1", 250, "seed", "seed").unwrap();
    assert_eq!(outcome.progression.current_level, 3);
    let status = engine.status("u1").unwrap();
    assert_eq!(status.level.next_level_xp, Some(300));
}

#[test]
fn test_status_at_linear_curve_ceiling() {
    let db = TestDb::new();
    let mut config = EngineConfig::default();
    config.leveling = LevelingConfig::Linear { xp_per_level: 1 };
    let engine = db.engine(&config);

    engine.award_xp("u1", 5_000_000_000, "import", "import:legacy").unwrap();
    let status = engine.status("u1").unwrap();
    assert_eq!(status.level.level, u32::MAX);
    assert_eq!(status.level.next_level_xp, None);
}

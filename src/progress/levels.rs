//! XP and Level system
//!
//! Levels are content data: a threshold table or a linear curve, selected in
//! configuration. Both satisfy the same contract: every non-negative XP total
//! maps to exactly one level, and more XP never means a lower level.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use super::error::{EngineError, EngineResult};

/// Maps a lifetime XP total to a level
pub trait LevelCurve: Send + Sync {
    /// Level for the given total XP (always >= 1)
    fn level_of(&self, total_xp: i64) -> u32;

    /// Minimum XP required to reach `level` (None if the level does not exist)
    fn threshold(&self, level: u32) -> Option<i64>;

    /// Display title for a level
    fn title(&self, _level: u32) -> String {
        String::new()
    }

    /// Highest reachable level (None if unbounded)
    fn max_level(&self) -> Option<u32> {
        None
    }
}

/// Level definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub level: u32,
    pub xp_required: i64,
    pub title: String,
}

impl Level {
    fn new(level: u32, xp_required: i64, title: &str) -> Self {
        Self {
            level,
            xp_required,
            title: title.to_string(),
        }
    }
}

/// Default level thresholds (sorted by level)
pub static DEFAULT_LEVELS: Lazy<Vec<Level>> = Lazy::new(|| {
    vec![
        Level::new(1, 0, "Newcomer"),
        Level::new(2, 50, "Learner"),
        Level::new(3, 150, "Learner"),
        Level::new(4, 300, "Explorer"),
        Level::new(5, 500, "Explorer"),
        Level::new(6, 750, "Achiever"),
        Level::new(7, 1000, "Achiever"),
        Level::new(8, 1300, "Achiever"),
        Level::new(9, 1600, "Scholar"),
        Level::new(10, 2000, "Scholar"),
        Level::new(11, 2500, "Scholar"),
        Level::new(12, 3000, "Specialist"),
        Level::new(13, 3500, "Specialist"),
        Level::new(14, 4000, "Specialist"),
        Level::new(15, 5000, "Mentor"),
        Level::new(16, 6000, "Mentor"),
        Level::new(17, 7000, "Mentor"),
        Level::new(18, 8000, "Expert"),
        Level::new(19, 9500, "Expert"),
        Level::new(20, 11000, "Expert"),
        Level::new(21, 13000, "Master"),
        Level::new(22, 15000, "Master"),
        Level::new(23, 17500, "Master"),
        Level::new(24, 20000, "Sage"),
        Level::new(25, 23000, "Sage"),
        Level::new(26, 26500, "Sage"),
        Level::new(27, 30000, "Luminary"),
        Level::new(28, 35000, "Luminary"),
        Level::new(29, 40000, "Luminary"),
        Level::new(30, 50000, "Legend"),
    ]
});

/// Threshold table curve
#[derive(Debug, Clone)]
pub struct LevelTable {
    levels: Vec<Level>,
}

impl LevelTable {
    /// Build a table, rejecting anything that would break monotonicity or leave gaps
    pub fn new(levels: Vec<Level>) -> EngineResult<Self> {
        let Some(first) = levels.first() else {
            return Err(EngineError::Config("level table is empty".into()));
        };
        if first.level != 1 || first.xp_required != 0 {
            return Err(EngineError::Config(
                "level table must start at level 1 with 0 XP".into(),
            ));
        }
        for pair in levels.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if prev.level.checked_add(1) != Some(next.level) {
                return Err(EngineError::Config(format!(
                    "level {} follows level {}; levels must be consecutive",
                    next.level, prev.level
                )));
            }
            if next.xp_required <= prev.xp_required {
                return Err(EngineError::Config(format!(
                    "level {} requires {} XP, not more than level {} ({} XP)",
                    next.level, next.xp_required, prev.level, prev.xp_required
                )));
            }
        }
        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[Level] {
        &self.levels
    }

    fn entry_for(&self, total_xp: i64) -> &Level {
        // Validated non-empty in `new`
        let idx = self
            .levels
            .partition_point(|l| l.xp_required <= total_xp)
            .saturating_sub(1);
        &self.levels[idx]
    }
}

impl Default for LevelTable {
    fn default() -> Self {
        Self {
            levels: DEFAULT_LEVELS.clone(),
        }
    }
}

impl LevelCurve for LevelTable {
    fn level_of(&self, total_xp: i64) -> u32 {
        self.entry_for(total_xp).level
    }

    fn threshold(&self, level: u32) -> Option<i64> {
        self.levels
            .iter()
            .find(|l| l.level == level)
            .map(|l| l.xp_required)
    }

    fn title(&self, level: u32) -> String {
        self.levels
            .iter()
            .find(|l| l.level == level)
            .map(|l| l.title.clone())
            .unwrap_or_default()
    }

    fn max_level(&self) -> Option<u32> {
        self.levels.last().map(|l| l.level)
    }
}

/// Unbounded curve: one level per `xp_per_level` XP
#[derive(Debug, Clone, Copy)]
pub struct LinearCurve {
    xp_per_level: i64,
}

impl LinearCurve {
    pub fn new(xp_per_level: i64) -> EngineResult<Self> {
        if xp_per_level <= 0 {
            return Err(EngineError::Config(format!(
                "xp_per_level must be positive, got {xp_per_level}"
            )));
        }
        Ok(Self { xp_per_level })
    }
}

impl LevelCurve for LinearCurve {
    fn level_of(&self, total_xp: i64) -> u32 {
        let steps = total_xp.max(0) / self.xp_per_level;
        u32::try_from(steps)
            .ok()
            .and_then(|s| s.checked_add(1))
            .unwrap_or(u32::MAX)
    }

    fn threshold(&self, level: u32) -> Option<i64> {
        if level == 0 {
            return None;
        }
        i64::from(level - 1).checked_mul(self.xp_per_level)
    }

    fn title(&self, level: u32) -> String {
        format!("Level {level}")
    }
}

/// Where a user stands relative to the next level
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LevelProgress {
    pub total_xp: i64,
    pub level: u32,
    pub title: String,
    /// XP needed for current level
    pub current_level_xp: i64,
    /// XP needed for next level (None if max)
    pub next_level_xp: Option<i64>,
}

impl LevelProgress {
    pub fn new(curve: &dyn LevelCurve, total_xp: i64) -> Self {
        let level = curve.level_of(total_xp);
        Self {
            total_xp,
            level,
            title: curve.title(level),
            current_level_xp: curve.threshold(level).unwrap_or(0),
            next_level_xp: level.checked_add(1).and_then(|l| curve.threshold(l)),
        }
    }

    /// Calculate progress percentage to next level (0.0 - 1.0)
    pub fn progress_to_next(&self) -> f32 {
        match self.next_level_xp {
            Some(next) => {
                let xp_in_level = self.total_xp - self.current_level_xp;
                let xp_for_level = next - self.current_level_xp;
                if xp_for_level <= 0 {
                    1.0
                } else {
                    (xp_in_level as f32) / (xp_for_level as f32)
                }
            }
            None => 1.0,
        }
    }

    pub fn is_max_level(&self) -> bool {
        self.next_level_xp.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_for_xp() {
        let table = LevelTable::default();
        assert_eq!(table.level_of(0), 1);
        assert_eq!(table.level_of(49), 1);
        assert_eq!(table.level_of(50), 2);
        assert_eq!(table.level_of(150), 3);
        assert_eq!(table.level_of(50000), 30);
        assert_eq!(table.level_of(100000), 30); // Beyond max
    }

    #[test]
    fn test_table_is_monotonic() {
        let table = LevelTable::default();
        let mut last = 0;
        for xp in (0..60_000).step_by(7) {
            let level = table.level_of(xp);
            assert!(level >= last, "level dropped at {xp} XP");
            last = level;
        }
    }

    #[test]
    fn test_default_table_is_valid() {
        assert!(LevelTable::new(DEFAULT_LEVELS.clone()).is_ok());
    }

    #[test]
    fn test_table_rejects_gaps_and_bad_thresholds() {
        let gap = vec![Level::new(1, 0, "a"), Level::new(3, 10, "c")];
        assert!(LevelTable::new(gap).is_err());

        let flat = vec![Level::new(1, 0, "a"), Level::new(2, 0, "b")];
        assert!(LevelTable::new(flat).is_err());

        let no_base = vec![Level::new(1, 10, "a")];
        assert!(LevelTable::new(no_base).is_err());

        assert!(LevelTable::new(Vec::new()).is_err());

        let past_max = vec![
            Level::new(1, 0, "a"),
            Level::new(u32::MAX, 10, "b"),
            Level::new(0, 20, "c"),
        ];
        assert!(LevelTable::new(past_max).is_err());
    }

    #[test]
    fn test_linear_curve_saturates_at_top_level() {
        let curve = LinearCurve::new(1).unwrap();
        assert_eq!(curve.level_of(i64::from(u32::MAX) - 1), u32::MAX);
        assert_eq!(curve.level_of(5_000_000_000), u32::MAX);

        let progress = LevelProgress::new(&curve, 5_000_000_000);
        assert_eq!(progress.level, u32::MAX);
        assert!(progress.is_max_level());
        assert_eq!(progress.progress_to_next(), 1.0);
    }

    #[test]
    fn test_linear_curve() {
        let curve = LinearCurve::new(100).unwrap();
        assert_eq!(curve.level_of(0), 1);
        assert_eq!(curve.level_of(99), 1);
        assert_eq!(curve.level_of(100), 2);
        assert_eq!(curve.level_of(1050), 11);
        assert_eq!(curve.threshold(11), Some(1000));
        assert!(LinearCurve::new(0).is_err());
    }

    #[test]
    fn test_level_progress() {
        let table = LevelTable::default();
        let progress = LevelProgress::new(&table, 75); // Between level 2 (50) and level 3 (150)
        assert_eq!(progress.level, 2);
        assert_eq!(progress.title, "Learner");
        assert!((progress.progress_to_next() - 0.25).abs() < 0.01);

        let top = LevelProgress::new(&table, 60000);
        assert!(top.is_max_level());
        assert_eq!(top.progress_to_next(), 1.0);
    }
}

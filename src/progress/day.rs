//! Calendar-day normalization for streaks
//!
//! Streak continuity is judged on calendar days in one fixed reference zone
//! (a UTC offset from configuration, UTC by default), never in the caller's
//! local clock. Days are stored as "YYYY-MM-DD".

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};

use super::error::{EngineError, EngineResult};

const DAY_FORMAT: &str = "%Y-%m-%d";

/// Reference zone for day boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayBoundary {
    offset: FixedOffset,
}

impl DayBoundary {
    pub fn utc() -> Self {
        Self {
            offset: Utc.fix(),
        }
    }

    /// Offset east of UTC in minutes, e.g. 60 for UTC+1
    pub fn from_offset_minutes(minutes: i32) -> EngineResult<Self> {
        minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .map(|offset| Self { offset })
            .ok_or_else(|| EngineError::Config(format!("invalid UTC offset: {minutes} minutes")))
    }

    /// Calendar day an instant falls on
    pub fn day_of(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.offset).date_naive()
    }
}

impl Default for DayBoundary {
    fn default() -> Self {
        Self::utc()
    }
}

/// Format a day for storage
pub fn format_day(day: NaiveDate) -> String {
    day.format(DAY_FORMAT).to_string()
}

/// Parse a stored day
pub fn parse_day(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s, DAY_FORMAT).ok()
}

/// Current Unix time in milliseconds
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

//! Resolution of historical query ranges.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Query parameters accepted by range endpoints.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RangeQuery {
    pub days: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

impl RangeQuery {
    pub fn preset(days: u32) -> Self {
        Self {
            days: Some(days.to_string()),
            ..Self::default()
        }
    }

    pub fn between(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            days: None,
            from: Some(from.into()),
            to: Some(to.into()),
        }
    }
}

/// What a range query may ask for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangePolicy {
    pub presets: Vec<u32>,
    pub max_days: i64,
}

impl Default for RangePolicy {
    fn default() -> Self {
        Self {
            presets: vec![2, 3, 5],
            max_days: 31,
        }
    }
}

/// A resolved, validated `[from, to]` interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeRange {
    pub fn span(&self) -> Duration {
        self.to - self.from
    }
}

/// Why a range query was rejected. All variants surface as `invalid_range`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeError {
    Missing,
    UnknownPreset(String),
    Unparsable(String),
    Inverted,
    TooLong { days: i64, max_days: i64 },
}

impl fmt::Display for RangeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RangeError::Missing => write!(f, "either days or from/to is required"),
            RangeError::UnknownPreset(d) => write!(f, "unsupported days preset: {}", d),
            RangeError::Unparsable(s) => write!(f, "invalid timestamp: {}", s),
            RangeError::Inverted => write!(f, "from must be before to"),
            RangeError::TooLong { days, max_days } => {
                write!(f, "range of {} days exceeds {} days", days, max_days)
            }
        }
    }
}

impl std::error::Error for RangeError {}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date (midnight UTC).
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, RangeError> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
        .ok_or_else(|| RangeError::Unparsable(raw.to_string()))
}

impl RangeQuery {
    /// Resolve against `now`.
    ///
    /// A recognised `days` preset wins; otherwise both `from` and `to` must
    /// be present, ordered, and no further apart than `policy.max_days`.
    pub fn resolve(&self, policy: &RangePolicy, now: DateTime<Utc>) -> Result<TimeRange, RangeError> {
        if let Some(days) = self.days.as_deref().map(str::trim).filter(|d| !d.is_empty()) {
            let preset = days
                .parse::<u32>()
                .ok()
                .filter(|d| policy.presets.contains(d));
            match preset {
                Some(d) => {
                    return Ok(TimeRange {
                        from: now - Duration::days(d as i64),
                        to: now,
                    })
                }
                None if self.from.is_none() && self.to.is_none() => {
                    return Err(RangeError::UnknownPreset(days.to_string()))
                }
                None => {}
            }
        }

        let (from, to) = match (self.from.as_deref(), self.to.as_deref()) {
            (Some(from), Some(to)) => (parse_instant(from)?, parse_instant(to)?),
            _ => return Err(RangeError::Missing),
        };
        if from >= to {
            return Err(RangeError::Inverted);
        }
        if to - from > Duration::days(policy.max_days) {
            return Err(RangeError::TooLong {
                days: (to - from).num_days(),
                max_days: policy.max_days,
            });
        }
        Ok(TimeRange { from, to })
    }
}

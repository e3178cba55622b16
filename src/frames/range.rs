// src/frames/range.rs
//
// Time ranges: parsing externally supplied start/end values, frame counts,
// and the "now minus lag" default base time.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;

use super::address::TimePoint;

/// Source of "now". Injected so default ranges are testable.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// How far a range extends past its start.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub enum RangeExtent {
    /// Up to and including this instant
    Until(TimePoint),
    /// Exactly this many frames
    Frames(usize),
    /// The configured default frame count
    Default,
}

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct TimeRange {
    pub start: TimePoint,
    pub extent: RangeExtent,
}

impl TimeRange {
    pub fn until(start: TimePoint, end: TimePoint) -> Self {
        Self {
            start,
            extent: RangeExtent::Until(end),
        }
    }

    pub fn frames(start: TimePoint, count: usize) -> Self {
        Self {
            start,
            extent: RangeExtent::Frames(count),
        }
    }

    pub fn starting_at(start: TimePoint) -> Self {
        Self {
            start,
            extent: RangeExtent::Default,
        }
    }

    /// Build a range from optional external parameters.
    ///
    /// Malformed values count as absent. An end without a start runs from
    /// `default_start`. With neither there is no range, and the caller
    /// falls back to the default range.
    pub fn from_params(
        start: Option<&str>,
        end: Option<&str>,
        default_start: TimePoint,
    ) -> Option<Self> {
        let start = start.and_then(parse_time_param);
        let end = end.and_then(parse_time_param);
        match (start, end) {
            (Some(start), Some(end)) => Some(Self::until(start, end)),
            (Some(start), None) => Some(Self::starting_at(start)),
            (None, Some(end)) => Some(Self::until(default_start, end)),
            (None, None) => None,
        }
    }

    /// Start floored to the interval boundary.
    pub fn base(&self, interval_minutes: u32) -> TimePoint {
        floor_to_interval(self.start, interval_minutes)
    }

    /// Number of candidate frames, always at least 1.
    ///
    /// With an end: `max(1, round((end - base) / interval)) + 1`.
    pub fn frame_count(&self, interval_minutes: u32, default_count: usize) -> usize {
        match &self.extent {
            RangeExtent::Until(end) => {
                let base = self.base(interval_minutes);
                let minutes = (*end - base).num_seconds() as f64 / 60.0;
                let steps = (minutes / interval_minutes as f64).round();
                (steps.max(1.0) as usize) + 1
            }
            RangeExtent::Frames(n) => (*n).max(1),
            RangeExtent::Default => default_count.max(1),
        }
    }
}

/// Parse an RFC 3339 instant, a `YYYY-MM-DDTHH:MM[:SS]` UTC time, or a
/// `YYYY-MM-DD` date (midnight UTC). Anything else is `None`.
pub fn parse_time_param(value: &str) -> Option<TimePoint> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(value) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Ok(t) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(t.and_utc());
        }
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
    }
    tlog!("[range] Ignoring malformed time parameter: {:?}", value);
    None
}

/// Round down to the previous interval boundary, dropping seconds.
/// `interval_minutes` must divide an hour evenly.
pub fn floor_to_interval(t: TimePoint, interval_minutes: u32) -> TimePoint {
    let step = interval_minutes.max(1) as i64 * 60;
    let secs = t.timestamp();
    let floored = secs - secs.rem_euclid(step);
    DateTime::from_timestamp(floored, 0).unwrap_or(t)
}

/// Default base: `now - lag_hours`, floored to the interval boundary.
pub fn default_base_time(now: TimePoint, lag_hours: u32, interval_minutes: u32) -> TimePoint {
    floor_to_interval(now - Duration::hours(lag_hours as i64), interval_minutes)
}

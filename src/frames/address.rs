// src/frames/address.rs
//
// Frame addressing: (base time, frame index, interval) -> locator + display time.
// Pure; equal inputs always give the same locator.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use serde::Serialize;

/// Absolute UTC instant at minute resolution.
pub type TimePoint = DateTime<Utc>;

/// One candidate frame and where it lives.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct FrameAddress {
    pub index: usize,
    pub locator: String,
    pub time_point: TimePoint,
}

impl FrameAddress {
    pub fn display_time(&self) -> DisplayTime {
        DisplayTime::from_time_point(&self.time_point)
    }
}

/// Zero-padded calendar fields of a frame, for human display.
#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct DisplayTime {
    pub year: String,
    pub month: String,
    pub day: String,
    pub hour: String,
    pub minute: String,
}

impl DisplayTime {
    pub fn from_time_point(t: &TimePoint) -> Self {
        Self {
            year: format!("{:04}", t.year()),
            month: format!("{:02}", t.month()),
            day: format!("{:02}", t.day()),
            hour: format!("{:02}", t.hour()),
            minute: format!("{:02}", t.minute()),
        }
    }
}

/// Time of frame `index`: `base + index * interval_minutes`.
pub fn frame_time(base: TimePoint, index: usize, interval_minutes: u32) -> TimePoint {
    base + Duration::minutes(index as i64 * interval_minutes as i64)
}

/// Locator template over a configured resource namespace:
/// `{root}/{YYYY}/{MM}/{DD}/{HH}/{YYYY}{MM}{DD}_{HH}{mm}Z{suffix}`
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FrameAddressing {
    root: String,
    suffix: String,
    interval_minutes: u32,
}

impl FrameAddressing {
    pub fn new(root: &str, suffix: &str, interval_minutes: u32) -> Self {
        Self {
            root: root.trim_end_matches('/').to_string(),
            suffix: suffix.to_string(),
            interval_minutes,
        }
    }

    pub fn interval_minutes(&self) -> u32 {
        self.interval_minutes
    }

    pub fn locator_for(&self, t: &TimePoint) -> String {
        let d = DisplayTime::from_time_point(t);
        format!(
            "{root}/{y}/{mo}/{dd}/{h}/{y}{mo}{dd}_{h}{mi}Z{suffix}",
            root = self.root,
            y = d.year,
            mo = d.month,
            dd = d.day,
            h = d.hour,
            mi = d.minute,
            suffix = self.suffix,
        )
    }

    pub fn address(&self, base: TimePoint, index: usize) -> FrameAddress {
        let time_point = frame_time(base, index, self.interval_minutes);
        FrameAddress {
            index,
            locator: self.locator_for(&time_point),
            time_point,
        }
    }
}

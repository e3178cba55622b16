// src/settings.rs
//
// Engine settings. Loaded from TOML, every field optional with a default.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::render::LayerStyle;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EngineSettings {
    /// Root of the resource namespace; locators are built beneath it
    #[serde(default = "default_resource_root")]
    pub resource_root: String,
    /// Appended to each frame's file name, e.g. ".zarrpyramid"
    #[serde(default = "default_resource_suffix")]
    pub resource_suffix: String,
    /// Appended to a locator to form the existence-check URL
    #[serde(default = "default_metadata_suffix")]
    pub metadata_suffix: String,
    /// Minutes between consecutive frames
    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u32,
    /// Frame count used when no explicit end is supplied
    #[serde(default = "default_frame_count")]
    pub default_frame_count: usize,
    /// Upper bound on frames in one range; longer ranges are truncated
    #[serde(default = "default_max_frame_count")]
    pub max_frame_count: usize,
    /// Hours subtracted from "now" for the default range
    #[serde(default = "default_lag_hours")]
    pub default_lag_hours: u32,
    /// How long to wait for an explicit range before falling back to the default (ms)
    #[serde(default = "default_startup_wait_ms")]
    pub startup_wait_ms: u64,
    /// Existence checks in flight at once
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Per-check timeout (ms)
    #[serde(default = "default_check_timeout_ms")]
    pub check_timeout_ms: u64,
    /// Initial delay between playback ticks (ms)
    #[serde(default = "default_speed_ms")]
    pub speed_ms: u64,
    #[serde(default = "default_min_speed_ms")]
    pub min_speed_ms: u64,
    #[serde(default = "default_max_speed_ms")]
    pub max_speed_ms: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Style forwarded to the rendering surface with every frame
    #[serde(default)]
    pub layer: LayerStyle,
}

fn default_resource_root() -> String {
    "https://tmrwwxappspuma.blob.core.windows.net/prod-chimp-inference-viz/GOES_EAST_FD".to_string()
}
fn default_resource_suffix() -> String {
    ".zarrpyramid".to_string()
}
fn default_metadata_suffix() -> String {
    "/.zmetadata".to_string()
}
fn default_interval_minutes() -> u32 {
    10
}
fn default_frame_count() -> usize {
    72 // 12 hours at 10-minute spacing
}
fn default_max_frame_count() -> usize {
    1008 // one week
}
fn default_lag_hours() -> u32 {
    14
}
fn default_startup_wait_ms() -> u64 {
    1000
}
fn default_batch_size() -> usize {
    3
}
fn default_check_timeout_ms() -> u64 {
    10_000
}
fn default_speed_ms() -> u64 {
    1500
}
fn default_min_speed_ms() -> u64 {
    100
}
fn default_max_speed_ms() -> u64 {
    3000
}
fn default_user_agent() -> String {
    concat!("framelapse/", env!("CARGO_PKG_VERSION")).to_string()
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            resource_root: default_resource_root(),
            resource_suffix: default_resource_suffix(),
            metadata_suffix: default_metadata_suffix(),
            interval_minutes: default_interval_minutes(),
            default_frame_count: default_frame_count(),
            max_frame_count: default_max_frame_count(),
            default_lag_hours: default_lag_hours(),
            startup_wait_ms: default_startup_wait_ms(),
            batch_size: default_batch_size(),
            check_timeout_ms: default_check_timeout_ms(),
            speed_ms: default_speed_ms(),
            min_speed_ms: default_min_speed_ms(),
            max_speed_ms: default_max_speed_ms(),
            user_agent: default_user_agent(),
            layer: LayerStyle::default(),
        }
    }
}

impl EngineSettings {
    /// Parse settings from TOML text and validate them.
    pub fn from_toml_str(content: &str) -> Result<Self, String> {
        let settings: EngineSettings =
            toml::from_str(content).map_err(|e| format!("Failed to parse settings: {}", e))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings.
    ///
    /// An explicit path must exist. Without one, the per-user file
    /// (`<config dir>/framelapse/settings.toml`) is used when present,
    /// otherwise defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, String> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match user_settings_path() {
                Some(p) if p.exists() => p,
                _ => {
                    tlog!("[settings] No settings file found, using defaults");
                    return Ok(Self::default());
                }
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| format!("Failed to read settings file {}: {}", path.display(), e))?;
        let settings = Self::from_toml_str(&content)?;
        tlog!("[settings] Loaded {}", path.display());
        Ok(settings)
    }

    /// Reject values the engine cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if self.interval_minutes == 0 || 60 % self.interval_minutes != 0 {
            return Err(format!(
                "interval_minutes must divide an hour evenly (got {})",
                self.interval_minutes
            ));
        }
        if self.default_frame_count == 0 {
            return Err("default_frame_count must be at least 1".to_string());
        }
        if self.default_frame_count > self.max_frame_count {
            return Err(format!(
                "default_frame_count {} exceeds max_frame_count {}",
                self.default_frame_count, self.max_frame_count
            ));
        }
        if self.batch_size == 0 {
            return Err("batch_size must be at least 1".to_string());
        }
        if self.min_speed_ms == 0 || self.min_speed_ms > self.max_speed_ms {
            return Err(format!(
                "Invalid speed range {}..={}ms",
                self.min_speed_ms, self.max_speed_ms
            ));
        }
        if self.speed_ms < self.min_speed_ms || self.speed_ms > self.max_speed_ms {
            return Err(format!(
                "speed_ms {} outside {}..={}ms",
                self.speed_ms, self.min_speed_ms, self.max_speed_ms
            ));
        }
        Ok(())
    }

    /// Clamp a requested tick delay to the configured speed range.
    pub fn clamp_speed(&self, speed_ms: u64) -> u64 {
        speed_ms.clamp(self.min_speed_ms, self.max_speed_ms)
    }
}

/// Default per-user settings location.
pub fn user_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("framelapse").join("settings.toml"))
}

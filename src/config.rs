//! Runtime configuration for the check-in and points system.
//!
//! All knobs deserialize from a single JSON document with full defaults, so
//! a missing or partial config file still yields a working setup. Config is
//! immutable for the process lifetime; hosts that support live reload build
//! a fresh [`crate::model::AppState`] from the new values.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// How often the check-in window resets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CycleType {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

impl CycleType {
    /// User-facing name of the window, used in limit messages.
    pub fn noun(self) -> &'static str {
        match self {
            CycleType::Daily => "today",
            CycleType::Weekly => "this week",
            CycleType::Monthly => "this month",
        }
    }
}

/// Cycle boundary settings. The "day" ends at `reset_hour:reset_minute`,
/// not at midnight; times earlier than the boundary belong to the previous
/// effective date.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CycleConfig {
    pub reset_hour: u32,
    pub reset_minute: u32,
    pub cycle_type: CycleType,
    pub max_checkins_per_cycle: u32,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            reset_hour: 0,
            reset_minute: 0,
            cycle_type: CycleType::Daily,
            max_checkins_per_cycle: 1,
        }
    }
}

/// A fixed calendar day (month/day, any year) that grants extra points.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpecialDay {
    pub month: u32,
    pub day: u32,
    pub bonus: i64,
    pub name: String,
}

/// Reward tuning for a single check-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PointsConfig {
    /// Inclusive bounds for the random base award.
    pub min_points: i64,
    pub max_points: i64,
    pub consecutive_bonus_enabled: bool,
    pub consecutive_bonus_per_day: i64,
    pub max_consecutive_bonus: i64,
    pub weekend_bonus_enabled: bool,
    pub weekend_bonus: i64,
    pub special_days: Vec<SpecialDay>,
}

impl Default for PointsConfig {
    fn default() -> Self {
        Self {
            min_points: 5,
            max_points: 15,
            consecutive_bonus_enabled: true,
            consecutive_bonus_per_day: 2,
            max_consecutive_bonus: 20,
            weekend_bonus_enabled: true,
            weekend_bonus: 5,
            special_days: Vec::new(),
        }
    }
}

/// How far back check-in history and transaction logs are kept.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionConfig {
    /// Entries older than this many days are purged by the retention pass.
    pub horizon_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { horizon_days: 365 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub cycle: CycleConfig,
    pub points: PointsConfig,
    pub retention: RetentionConfig,
}

impl AppConfig {
    /// Loads config from a JSON file, falling back to defaults when the file
    /// is missing or unreadable. A malformed file is reported and replaced
    /// with defaults rather than aborting startup.
    pub fn load_or_default(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(cfg) => cfg,
                Err(err) => {
                    tracing::warn!(target: "config", path = %path.display(), %err, "config file malformed, using defaults");
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }
}

//! TOML-based engine configuration.
//!
//! Stored at `~/.config/duos/config.toml`. Every field has a serde default
//! so a partial file (or none at all) yields a working configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::history::DEFAULT_LOOKBACK_WEEKS;
use crate::scoring::ScoringConfig;
use crate::storage::data_dir;

/// Weekly trigger schedule: which weekday and wall-clock time (UTC) the
/// reshuffle runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Day of week, lowercase English name ("sunday", "monday", ...)
    #[serde(default = "default_weekday")]
    pub weekday: String,
    #[serde(default = "default_hour")]
    pub hour: u32,
    #[serde(default)]
    pub minute: u32,
}

fn default_weekday() -> String {
    "sunday".to_string()
}
fn default_hour() -> u32 {
    8
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            weekday: default_weekday(),
            hour: default_hour(),
            minute: 0,
        }
    }
}

impl ScheduleConfig {
    /// Parse the configured weekday name.
    pub fn weekday(&self) -> Result<chrono::Weekday, ConfigError> {
        self.weekday
            .parse()
            .map_err(|_| ConfigError::InvalidValue {
                key: "schedule.weekday".to_string(),
                message: format!("unknown weekday '{}'", self.weekday),
            })
    }
}

/// Engine configuration.
///
/// Serialized to/from TOML at `~/.config/duos/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub scoring: ScoringConfig,

    #[serde(default)]
    pub schedule: ScheduleConfig,

    /// History lookback window for repeat-avoidance, in weeks
    #[serde(default = "default_lookback_weeks")]
    pub lookback_weeks: i64,

    /// Bound on a single reshuffle run; a run exceeding it is failed
    #[serde(default = "default_run_timeout_secs")]
    pub run_timeout_secs: u64,
}

fn default_lookback_weeks() -> i64 {
    DEFAULT_LOOKBACK_WEEKS
}
fn default_run_timeout_secs() -> u64 {
    120
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            schedule: ScheduleConfig::default(),
            lookback_weeks: default_lookback_weeks(),
            run_timeout_secs: default_run_timeout_secs(),
        }
    }
}

impl EngineConfig {
    fn path() -> Result<PathBuf, ConfigError> {
        let dir = data_dir().map_err(|e| ConfigError::LoadFailed {
            path: PathBuf::from("~/.config/duos"),
            message: e.to_string(),
        })?;
        Ok(dir.join("config.toml"))
    }

    /// Load the configuration file, falling back to defaults when the file
    /// does not exist.
    pub fn load_or_default() -> Self {
        match Self::load() {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("using default configuration: {e}");
                Self::default()
            }
        }
    }

    /// Load the configuration from disk.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::path()?;
        let raw = std::fs::read_to_string(&path).map_err(|e| ConfigError::LoadFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        toml::from_str(&raw).map_err(|e| ConfigError::LoadFailed {
            path,
            message: e.to_string(),
        })
    }

    /// Save the configuration to disk.
    pub fn save(&self) -> Result<(), ConfigError> {
        let path = Self::path()?;
        let raw = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, raw).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })
    }
}

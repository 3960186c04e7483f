use std::time::Duration;
use serde::{Deserialize, Serialize};

use crate::device::constants::DEFAULT_SCAN_DURATION;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// How long (milliseconds) discovery scans before picking a device.
    pub scan_duration_ms: u64,
    pub log_level: String,
}

impl Config {
    pub fn scan_duration(&self) -> Duration {
        Duration::from_millis(self.scan_duration_ms)
    }

    pub fn log_level_filter(&self) -> log::LevelFilter {
        self.log_level.parse().unwrap_or(log::LevelFilter::Info)
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            scan_duration_ms: DEFAULT_SCAN_DURATION,
            log_level: "info".to_string(),
        }
    }
}

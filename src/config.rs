use crate::persistence::read_file;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Default timer tick interval in milliseconds
pub const DEFAULT_TICK_MS: u64 = 1_000;

/// Default interval between periodic flushes of a running timer
pub const DEFAULT_FLUSH_SECS: u64 = 10;

/// Default day checker poll interval
pub const DEFAULT_DAY_CHECK_SECS: u64 = 10;

/// Default goal offered for new tasks
pub const DEFAULT_GOAL_MINUTES: u32 = 10;

/// Settings stored in config.json; every field is optional on disk
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tick_interval_ms: u64,
    pub flush_interval_secs: u64,
    pub day_check_interval_secs: u64,
    pub notifications: bool,
    pub default_goal_minutes: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_MS,
            flush_interval_secs: DEFAULT_FLUSH_SECS,
            day_check_interval_secs: DEFAULT_DAY_CHECK_SECS,
            notifications: true,
            default_goal_minutes: DEFAULT_GOAL_MINUTES,
        }
    }
}

impl Config {
    /// Load config.json, falling back to defaults when it is missing or unreadable
    pub fn load<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        let content = match read_file(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "could not read config, using defaults");
                return Self::default();
            }
        };
        if content.trim().is_empty() {
            return Self::default();
        }
        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "invalid config, using defaults");
            Self::default()
        })
    }

    /// Timer tick; never zero
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }

    /// Day checker poll interval; never zero
    pub fn day_check_interval(&self) -> Duration {
        Duration::from_secs(self.day_check_interval_secs.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::atomic_write;
    use tempfile::tempdir;

    #[test]
    fn test_missing_config_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let config = Config::load(temp_dir.path().join("config.json"));
        assert_eq!(config, Config::default());
        assert_eq!(config.tick_interval(), Duration::from_millis(1_000));
        assert_eq!(config.day_check_interval(), Duration::from_secs(10));
    }

    #[test]
    fn test_partial_config_fills_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        atomic_write(&path, r#"{ "flush_interval_secs": 30, "notifications": false }"#).unwrap();

        let config = Config::load(&path);
        assert_eq!(config.flush_interval(), Duration::from_secs(30));
        assert!(!config.notifications);
        assert_eq!(config.tick_interval_ms, DEFAULT_TICK_MS);
    }

    #[test]
    fn test_invalid_config_uses_defaults() {
        let temp_dir = tempdir().unwrap();
        let path = temp_dir.path().join("config.json");
        atomic_write(&path, "tick = fast").unwrap();

        assert_eq!(Config::load(&path), Config::default());
    }

    #[test]
    fn test_zero_intervals_are_clamped() {
        let config = Config {
            tick_interval_ms: 0,
            day_check_interval_secs: 0,
            ..Config::default()
        };
        assert_eq!(config.tick_interval(), Duration::from_millis(1));
        assert_eq!(config.day_check_interval(), Duration::from_secs(1));
    }
}

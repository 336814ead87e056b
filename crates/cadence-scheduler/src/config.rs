//! Scheduler configuration.

use cadence_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tunables for the scheduling engine and the timer loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Upper bound on one revision resolution, in seconds.
    #[serde(default = "default_resolution_timeout_secs")]
    pub resolution_timeout_secs: u64,

    /// Timer loop period, in milliseconds.
    #[serde(default = "default_timer_tick_millis")]
    pub timer_tick_millis: u64,

    /// Entries kept by the in-memory health log.
    #[serde(default = "default_health_history_limit")]
    pub health_history_limit: usize,
}

fn default_resolution_timeout_secs() -> u64 {
    30
}

fn default_timer_tick_millis() -> u64 {
    1000
}

fn default_health_history_limit() -> usize {
    256
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            resolution_timeout_secs: default_resolution_timeout_secs(),
            timer_tick_millis: default_timer_tick_millis(),
            health_history_limit: default_health_history_limit(),
        }
    }
}

impl SchedulerConfig {
    /// Load from a YAML file. Missing keys take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would stall the engine: a zero resolution timeout
    /// fails every attempt and a zero tick spins the timer loop.
    pub fn validate(&self) -> Result<()> {
        if self.resolution_timeout_secs == 0 {
            return Err(Error::Settings(
                "resolution_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.timer_tick_millis == 0 {
            return Err(Error::Settings("timer_tick_millis must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn with_resolution_timeout(mut self, timeout: Duration) -> Self {
        self.resolution_timeout_secs = timeout.as_secs().max(1);
        self
    }

    pub fn with_timer_tick(mut self, tick: Duration) -> Self {
        self.timer_tick_millis = (tick.as_millis() as u64).max(1);
        self
    }

    pub fn with_health_history_limit(mut self, limit: usize) -> Self {
        self.health_history_limit = limit;
        self
    }

    pub fn resolution_timeout(&self) -> Duration {
        Duration::from_secs(self.resolution_timeout_secs.max(1))
    }

    pub fn timer_tick(&self) -> Duration {
        Duration::from_millis(self.timer_tick_millis.max(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.resolution_timeout(), Duration::from_secs(30));
        assert_eq!(config.timer_tick(), Duration::from_secs(1));
        assert_eq!(config.health_history_limit, 256);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let config: SchedulerConfig = serde_yaml::from_str("timer_tick_millis: 250\n").unwrap();
        assert_eq!(config.timer_tick(), Duration::from_millis(250));
        assert_eq!(config.resolution_timeout_secs, 30);
    }

    #[test]
    fn test_builders() {
        let config = SchedulerConfig::default()
            .with_resolution_timeout(Duration::from_secs(5))
            .with_health_history_limit(8);
        assert_eq!(config.resolution_timeout_secs, 5);
        assert_eq!(config.health_history_limit, 8);
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let config: SchedulerConfig =
            serde_yaml::from_str("resolution_timeout_secs: 0\n").unwrap();
        assert!(matches!(config.validate(), Err(Error::Settings(_))));
        assert_eq!(config.resolution_timeout(), Duration::from_secs(1));

        let config: SchedulerConfig = serde_yaml::from_str("timer_tick_millis: 0\n").unwrap();
        assert!(config.validate().is_err());
        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_from_file() {
        let dir = std::env::temp_dir().join(format!("cadence-config-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let valid = dir.join("scheduler.yaml");
        std::fs::write(&valid, "resolution_timeout_secs: 10\nhealth_history_limit: 16\n").unwrap();
        let config = SchedulerConfig::from_file(&valid).unwrap();
        assert_eq!(config.resolution_timeout(), Duration::from_secs(10));
        assert_eq!(config.health_history_limit, 16);
        assert_eq!(config.timer_tick_millis, 1000);

        let invalid = dir.join("zero.yaml");
        std::fs::write(&invalid, "resolution_timeout_secs: 0\n").unwrap();
        assert!(matches!(
            SchedulerConfig::from_file(&invalid),
            Err(Error::Settings(_))
        ));

        assert!(matches!(
            SchedulerConfig::from_file(dir.join("missing.yaml")),
            Err(Error::Io(_))
        ));

        std::fs::remove_dir_all(&dir).unwrap();
    }
}

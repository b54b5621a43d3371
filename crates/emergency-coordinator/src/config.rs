//! Configuration management for the emergency coordinator.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::coordinator::CoordinatorConfig;
use crate::error::{Error, Result};
use crate::event::{OperatorId, OperatorIdentity};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "emergency-coordinator";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "events.db";

/// Prefix of environment overrides. Nested keys are separated by `__`,
/// e.g. `EMCOORD_FEED__POLL_INTERVAL_MS`.
const ENV_PREFIX: &str = "EMCOORD_";

/// Largest accepted UTC offset, in minutes.
const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `EMCOORD_`)
/// 2. TOML config file at `~/.config/emergency-coordinator/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Storage configuration.
    pub storage: StorageConfig,
    /// Feed configuration.
    pub feed: FeedConfig,
    /// Coordinator configuration.
    pub coordinator: CoordinatorSection,
    /// Dispatch configuration.
    pub dispatch: DispatchConfig,
}

/// Storage-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Path to the database file.
    /// Defaults to `~/.local/share/emergency-coordinator/events.db`
    pub database_path: Option<PathBuf>,
}

/// Feed-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    /// How often the polling feed reads the store, in milliseconds.
    pub poll_interval_ms: u64,
    /// Buffered deltas per subscription.
    pub channel_capacity: usize,
}

/// Coordinator-related configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorSection {
    /// Operator to start with when none is given on the command line.
    pub operator_id: Option<i64>,
    /// Driver name used in outbound messages.
    pub driver_name: Option<String>,
    /// Buffered operator commands.
    pub command_capacity: usize,
}

/// Which dispatcher to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DispatchBackend {
    /// Write messages to the store's outbox table.
    #[default]
    Outbox,
    /// Only log messages.
    Log,
}

/// Dispatch-related configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Dispatcher backend.
    pub backend: DispatchBackend,
    /// Send a message as soon as a non-student event arrives.
    pub announce_new_events: bool,
    /// Offset applied to times in message text.
    pub utc_offset_minutes: i32,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            channel_capacity: 256,
        }
    }
}

impl Default for CoordinatorSection {
    fn default() -> Self {
        Self {
            operator_id: None,
            driver_name: None,
            command_capacity: 64,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// Configuration is loaded in this order (later sources override earlier):
    /// 1. Default values
    /// 2. TOML config file (if exists)
    /// 3. Environment variables (prefixed with `EMCOORD_`)
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);
        let config: Config = Self::figment(&config_file).extract()?;
        config.validate()?;
        Ok(config)
    }

    fn figment(config_file: &Path) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.feed.poll_interval_ms == 0 {
            return Err(invalid("feed.poll_interval_ms must be greater than 0"));
        }
        if self.feed.channel_capacity == 0 {
            return Err(invalid("feed.channel_capacity must be greater than 0"));
        }
        if self.coordinator.command_capacity == 0 {
            return Err(invalid("coordinator.command_capacity must be greater than 0"));
        }
        if let Some(id) = self.coordinator.operator_id {
            if id <= 0 {
                return Err(invalid(format!(
                    "coordinator.operator_id must be positive, got {id}"
                )));
            }
        }
        if self.dispatch.utc_offset_minutes.abs() > MAX_UTC_OFFSET_MINUTES {
            return Err(invalid(format!(
                "dispatch.utc_offset_minutes ({}) must be within ±{MAX_UTC_OFFSET_MINUTES}",
                self.dispatch.utc_offset_minutes
            )));
        }
        Ok(())
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.storage
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the poll interval as a Duration.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.feed.poll_interval_ms)
    }

    /// The configured identity, if an operator id is set.
    #[must_use]
    pub fn identity(&self) -> Option<OperatorIdentity> {
        let identity = OperatorIdentity::new(OperatorId(self.coordinator.operator_id?));
        Some(match &self.coordinator.driver_name {
            Some(name) => identity.with_display_name(name.clone()),
            None => identity,
        })
    }

    /// Runtime settings for the coordinator loop.
    #[must_use]
    pub fn coordinator_config(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            command_capacity: self.coordinator.command_capacity,
            feed_capacity: self.feed.channel_capacity,
            driver_name: self.coordinator.driver_name.clone(),
            announce_new_events: self.dispatch.announce_new_events,
            utc_offset_minutes: self.dispatch.utc_offset_minutes,
            ..CoordinatorConfig::default()
        }
    }
}

fn invalid(message: impl Into<String>) -> Error {
    Error::ConfigValidation {
        message: message.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(config.storage.database_path.is_none());
        assert_eq!(config.feed.poll_interval_ms, 500);
        assert_eq!(config.feed.channel_capacity, 256);
        assert_eq!(config.coordinator.command_capacity, 64);
        assert!(config.coordinator.operator_id.is_none());
        assert_eq!(config.dispatch.backend, DispatchBackend::Outbox);
        assert!(!config.dispatch.announce_new_events);
        assert_eq!(config.dispatch.utc_offset_minutes, 0);
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_validate_zero_poll_interval() {
        let mut config = Config::default();
        config.feed.poll_interval_ms = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("poll_interval_ms"));
    }

    #[test]
    fn test_validate_zero_capacities() {
        let mut config = Config::default();
        config.feed.channel_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.coordinator.command_capacity = 0;
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("command_capacity"));
    }

    #[test]
    fn test_validate_operator_id() {
        let mut config = Config::default();
        config.coordinator.operator_id = Some(0);
        assert!(config.validate().is_err());

        config.coordinator.operator_id = Some(12);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_utc_offset() {
        let mut config = Config::default();
        config.dispatch.utc_offset_minutes = 14 * 60;
        assert!(config.validate().is_ok());

        config.dispatch.utc_offset_minutes = -(14 * 60 + 1);
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("utc_offset_minutes"));
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        let path = config.database_path();
        assert!(path.ends_with("emergency-coordinator/events.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.storage.database_path = Some(PathBuf::from("/tmp/custom.db"));
        assert_eq!(config.database_path(), PathBuf::from("/tmp/custom.db"));
    }

    #[test]
    fn test_identity() {
        let mut config = Config::default();
        assert!(config.identity().is_none());

        config.coordinator.operator_id = Some(7);
        config.coordinator.driver_name = Some("Anan".to_string());
        let identity = config.identity().unwrap();
        assert_eq!(identity.operator_id, OperatorId(7));
        assert_eq!(identity.display_name.as_deref(), Some("Anan"));
    }

    #[test]
    fn test_coordinator_config_mapping() {
        let mut config = Config::default();
        config.dispatch.announce_new_events = true;
        config.dispatch.utc_offset_minutes = 420;
        config.feed.channel_capacity = 32;

        let runtime = config.coordinator_config();
        assert!(runtime.announce_new_events);
        assert_eq!(runtime.utc_offset_minutes, 420);
        assert_eq!(runtime.feed_capacity, 32);
        assert_eq!(runtime.command_capacity, 64);
    }

    #[test]
    fn test_poll_interval() {
        let config = Config::default();
        assert_eq!(config.poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = std::env::temp_dir().join(format!("emcoord_config_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(
            &path,
            r#"
[feed]
poll_interval_ms = 250

[coordinator]
operator_id = 3
driver_name = "Somchai"

[dispatch]
backend = "log"
utc_offset_minutes = 420
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.feed.poll_interval_ms, 250);
        assert_eq!(config.feed.channel_capacity, 256);
        assert_eq!(config.coordinator.operator_id, Some(3));
        assert_eq!(config.dispatch.backend, DispatchBackend::Log);
        assert_eq!(config.dispatch.utc_offset_minutes, 420);

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_from_rejects_invalid_file() {
        let dir = std::env::temp_dir().join(format!("emcoord_config_bad_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[feed]\npoll_interval_ms = 0\n").unwrap();

        let err = Config::load_from(Some(path)).unwrap_err();
        assert!(matches!(err, Error::ConfigValidation { .. }));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_serialize_roundtrip() {
        let mut config = Config::default();
        config.coordinator.operator_id = Some(5);
        let json = serde_json::to_string(&config).unwrap();
        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(config, parsed);
    }
}

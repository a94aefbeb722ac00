//! # Configuration Management Module
//!
//! Runtime configuration for the hunterlog binary: where player data lives,
//! how often the background jobs run, how far back the discipline history
//! reaches and how logging is set up. Player-facing settings (multiplier,
//! penalties, caps) are not here; they live in the player state.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use hunterlog::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("hunterlog.toml").await?;
//!     let config = Config::load("hunterlog.toml").await?;
//!     println!("Storage backend: {}", config.storage.backend);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [storage]
//! backend = "sled"
//! path = "./data"
//!
//! [scheduler]
//! discipline_interval_minutes = 15
//! rollover_interval_minutes = 60
//!
//! [history]
//! max_window_days = 3650
//!
//! [logging]
//! level = "info"
//! file = "hunterlog.log"
//! ```
//!
//! Every section may be omitted. Zero or missing intervals fall back to the
//! defaults.

use std::fmt;
use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::engine::history::MAX_HISTORY_WINDOW_DAYS;
use crate::engine::scheduler::{
    SchedulerConfig as JobIntervals, DEFAULT_DISCIPLINE_INTERVAL_MINUTES,
    DEFAULT_ROLLOVER_INTERVAL_MINUTES,
};
use crate::storage::{FileStore, SledStore, Storage};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sled,
    File,
    Memory,
}

impl fmt::Display for StorageBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StorageBackend::Sled => "sled",
            StorageBackend::File => "file",
            StorageBackend::Memory => "memory",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
    #[serde(default = "default_data_path")]
    pub path: String,
}

fn default_data_path() -> String {
    "./data".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            path: default_data_path(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Minutes between discipline refreshes
    #[serde(default)]
    pub discipline_interval_minutes: Option<u64>,
    /// Minutes between rollover checks
    #[serde(default)]
    pub rollover_interval_minutes: Option<u64>,
}

fn minutes_or(value: Option<u64>, fallback: u64) -> Duration {
    let minutes = value.filter(|m| *m > 0).unwrap_or(fallback);
    Duration::from_secs(minutes.saturating_mul(60))
}

impl SchedulerConfig {
    pub fn discipline_interval(&self) -> Duration {
        minutes_or(self.discipline_interval_minutes, DEFAULT_DISCIPLINE_INTERVAL_MINUTES)
    }

    pub fn rollover_interval(&self) -> Duration {
        minutes_or(self.rollover_interval_minutes, DEFAULT_ROLLOVER_INTERVAL_MINUTES)
    }

    pub fn intervals(&self) -> JobIntervals {
        JobIntervals {
            discipline_interval: self.discipline_interval(),
            rollover_interval: self.rollover_interval(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_window_days")]
    pub max_window_days: u32,
}

fn default_max_window_days() -> u32 {
    MAX_HISTORY_WINDOW_DAYS
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_window_days: default_max_window_days(),
        }
    }
}

impl HistoryConfig {
    /// The configured window, 1 day at the least.
    pub fn window_days(&self) -> u32 {
        self.max_window_days.max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Load `path`, or fall back to defaults when the file does not exist.
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            Ok(Self::default())
        }
    }

    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config {
            logging: LoggingConfig {
                file: Some("hunterlog.log".to_string()),
                ..LoggingConfig::default()
            },
            scheduler: SchedulerConfig {
                discipline_interval_minutes: Some(DEFAULT_DISCIPLINE_INTERVAL_MINUTES),
                rollover_interval_minutes: Some(DEFAULT_ROLLOVER_INTERVAL_MINUTES),
            },
            ..Config::default()
        };
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Open the configured storage backend.
    pub fn open_storage(&self) -> Result<Storage> {
        let path = &self.storage.path;
        let storage = match self.storage.backend {
            StorageBackend::Sled => Storage::new(
                SledStore::open(path)
                    .map_err(|e| anyhow!("Failed to open sled store at {}: {}", path, e))?,
            ),
            StorageBackend::File => Storage::new(
                FileStore::open(path)
                    .map_err(|e| anyhow!("Failed to open data dir {}: {}", path, e))?,
            ),
            StorageBackend::Memory => Storage::in_memory(),
        };
        Ok(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config: Config = toml::from_str("").expect("parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.storage.backend, StorageBackend::Sled);
        assert_eq!(config.history.window_days(), 3650);
        assert_eq!(config.scheduler.discipline_interval(), Duration::from_secs(15 * 60));
        assert_eq!(config.scheduler.rollover_interval(), Duration::from_secs(60 * 60));
    }

    #[test]
    fn zero_intervals_fall_back() {
        let config: Config = toml::from_str(
            r#"
            [storage]
            backend = "file"
            path = "/tmp/hunter"

            [scheduler]
            discipline_interval_minutes = 0
            rollover_interval_minutes = 5
            "#,
        )
        .expect("parse");
        assert_eq!(config.storage.backend, StorageBackend::File);
        assert_eq!(config.scheduler.discipline_interval(), Duration::from_secs(15 * 60));
        assert_eq!(config.scheduler.intervals().rollover_interval, Duration::from_secs(5 * 60));
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let parsed: std::result::Result<Config, _> =
            toml::from_str("[storage]\nbackend = \"redis\"\n");
        assert!(parsed.is_err());
    }
}

//! Configuration module for Tusk

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::models::FeedKind;
use crate::paths;

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Quiet window before the relationship cache is refreshed for a newly
    /// active account
    #[serde(default = "default_sync_quiet_secs")]
    pub sync_quiet_secs: u64,

    /// Delay before a failed page load is retried
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Number of records to request per page
    #[serde(default = "default_page_limit")]
    pub page_limit: usize,

    /// Keep an on-disk copy of home and notification feeds
    #[serde(default = "default_cache_feeds")]
    pub cache_feeds: bool,

    /// Feed shown by `tusk timeline` without an argument
    #[serde(default)]
    pub default_feed: FeedKind,
}

fn default_sync_quiet_secs() -> u64 {
    3
}

fn default_retry_delay_secs() -> u64 {
    3
}

fn default_page_limit() -> usize {
    40
}

fn default_cache_feeds() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            sync_quiet_secs: default_sync_quiet_secs(),
            retry_delay_secs: default_retry_delay_secs(),
            page_limit: default_page_limit(),
            cache_feeds: default_cache_feeds(),
            default_feed: FeedKind::default(),
        }
    }
}

impl Config {
    /// Get the default config file path
    pub fn default_path() -> Result<PathBuf> {
        paths::config_path()
    }

    /// Load config from the default path or create default
    pub fn load() -> Result<Self> {
        let path = Self::default_path()?;
        Self::load_from(&path)
    }

    /// Load config from a specific path
    pub fn load_from(path: &PathBuf) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path).context("Failed to read config file")?;
            toml::from_str(&content).context("Failed to parse config file")
        } else {
            Ok(Self::default())
        }
    }

    /// Save config to the default path
    pub fn save(&self) -> Result<()> {
        let path = Self::default_path()?;
        self.save_to(&path)
    }

    /// Save config to a specific path
    pub fn save_to(&self, path: &PathBuf) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, content).context("Failed to write config file")?;

        Ok(())
    }

    /// Quiet window as a [`Duration`]
    pub const fn sync_quiet(&self) -> Duration {
        Duration::from_secs(self.sync_quiet_secs)
    }

    /// Retry delay as a [`Duration`]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

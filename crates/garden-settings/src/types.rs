//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase", default)]` so a settings
//! file may specify any subset of fields.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type for the garden store.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GardenSettings {
    /// Where and how the database is opened.
    pub storage: StorageSettings,
    /// Eviction timeouts and the open-byte budget.
    pub retention: RetentionSettings,
    /// Size caps for free-text fields.
    pub limits: LimitSettings,
    /// Change-notification channel settings.
    pub events: EventSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl GardenSettings {
    /// Reject values the store cannot operate with.
    pub fn validate(&self) -> Result<()> {
        if self.storage.pool_size == 0 {
            return Err(SettingsError::InvalidValue("storage.poolSize must be at least 1".into()));
        }
        if self.events.channel_capacity == 0 {
            return Err(SettingsError::InvalidValue(
                "events.channelCapacity must be at least 1".into(),
            ));
        }
        if self.limits.max_content_bytes == 0 {
            return Err(SettingsError::InvalidValue(
                "limits.maxContentBytes must be positive".into(),
            ));
        }
        if self.limits.max_title_chars == 0 || self.limits.max_topic_chars == 0 {
            return Err(SettingsError::InvalidValue(
                "limits.maxTitleChars and limits.maxTopicChars must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Database location and connection tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StorageSettings {
    /// Database file. `None` means `~/.garden/garden.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    /// Keep the database in memory (lost when the process exits).
    pub in_memory: bool,
    /// Maximum pooled connections.
    pub pool_size: u32,
    /// `SQLite` busy timeout in milliseconds.
    pub busy_timeout_ms: u32,
    /// Page cache size in KiB.
    pub cache_size_kib: i64,
}

impl StorageSettings {
    /// The database file this configuration points at.
    pub fn resolved_path(&self) -> PathBuf {
        self.path
            .as_ref()
            .map_or_else(|| crate::loader::garden_dir().join("garden.db"), PathBuf::from)
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: None,
            in_memory: false,
            pool_size: 4,
            busy_timeout_ms: 30_000,
            cache_size_kib: 8192,
        }
    }
}

/// Per-bin expiry and the memory budget used by pruning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetentionSettings {
    /// Days of inactivity before a Home session moves to Waste (0 = never).
    pub home_timeout_days: u32,
    /// Days of inactivity before an Archive session moves to Waste (0 = never).
    pub archive_timeout_days: u32,
    /// Days of inactivity before a Waste session is deleted (0 = never).
    pub waste_timeout_days: u32,
    /// Bytes of leaf content kept loaded across all bins during a prune.
    pub open_byte_budget: usize,
}

impl Default for RetentionSettings {
    fn default() -> Self {
        Self {
            home_timeout_days: 90,
            archive_timeout_days: 365,
            waste_timeout_days: 30,
            open_byte_budget: 1024 * 1024,
        }
    }
}

/// Caps applied by sanitization.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LimitSettings {
    /// Maximum leaf content size in bytes.
    pub max_content_bytes: usize,
    /// Maximum session title length in characters.
    pub max_title_chars: usize,
    /// Maximum topic length in characters.
    pub max_topic_chars: usize,
}

impl Default for LimitSettings {
    fn default() -> Self {
        Self {
            max_content_bytes: 16 * 1024 * 1024,
            max_title_chars: 256,
            max_topic_chars: 64,
        }
    }
}

/// Change-notification settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventSettings {
    /// Buffered events per subscriber before the oldest are dropped.
    pub channel_capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self {
            channel_capacity: 256,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default level filter (overridden by `RUST_LOG`).
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

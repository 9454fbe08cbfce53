//! Database configuration
//!
//! Loaded from `labcore.toml` in the database directory when present,
//! otherwise every field takes its default.
//!
//! ```toml
//! [events]
//! partition_window_secs = 86400
//! max_events = 10000000
//!
//! [retention]
//! enabled = true
//! max_age_secs = 7776000
//! interval_secs = 3600
//!
//! [limits]
//! max_attribute_bytes = 1048576
//! max_nesting_depth = 32
//! max_name_len = 256
//!
//! [query]
//! page_size = 256
//!
//! [durability]
//! sync_on_commit = true
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use labcore_core::{LabError, LabResult, Limits};

/// File name of the config inside a database directory
pub const CONFIG_FILE_NAME: &str = "labcore.toml";

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LabConfig {
    /// Event log partitioning and capacity
    #[serde(default)]
    pub events: EventsConfig,

    /// Background retention
    #[serde(default)]
    pub retention: RetentionConfig,

    /// Write-time size limits
    #[serde(default)]
    pub limits: Limits,

    /// Cursor paging
    #[serde(default)]
    pub query: QueryConfig,

    /// Write-ahead log behavior
    #[serde(default)]
    pub durability: DurabilityConfig,
}

/// Event log settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventsConfig {
    /// Width of one partition window
    #[serde(default = "default_partition_window_secs")]
    pub partition_window_secs: u64,

    /// Appends fail with `StorageExhausted` once this many events are held
    #[serde(default)]
    pub max_events: Option<usize>,
}

/// Retention settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetentionConfig {
    /// Start the retention thread when the database opens
    #[serde(default)]
    pub enabled: bool,

    /// Events older than this are pruned
    #[serde(default = "default_max_age_secs")]
    pub max_age_secs: u64,

    /// Time between retention runs
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

/// Query settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Items fetched per cursor page
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

/// Durability settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DurabilityConfig {
    /// fsync the write-ahead log after every commit
    #[serde(default = "default_true")]
    pub sync_on_commit: bool,
}

// Default value functions
fn default_partition_window_secs() -> u64 {
    24 * 60 * 60
}

fn default_max_age_secs() -> u64 {
    90 * 24 * 60 * 60
}

fn default_interval_secs() -> u64 {
    60 * 60
}

fn default_page_size() -> usize {
    256
}

fn default_true() -> bool {
    true
}

impl Default for EventsConfig {
    fn default() -> Self {
        Self {
            partition_window_secs: default_partition_window_secs(),
            max_events: None,
        }
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_age_secs: default_max_age_secs(),
            interval_secs: default_interval_secs(),
        }
    }
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

impl Default for DurabilityConfig {
    fn default() -> Self {
        Self {
            sync_on_commit: true,
        }
    }
}

impl LabConfig {
    /// Parse and validate a TOML document
    pub fn from_toml_str(s: &str) -> LabResult<Self> {
        let config: LabConfig =
            toml::from_str(s).map_err(|e| LabError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a file
    pub fn load(path: impl AsRef<Path>) -> LabResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            LabError::invalid_config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&text)
    }

    /// Load from a file if it exists, defaults otherwise
    pub fn load_or_default(path: impl AsRef<Path>) -> LabResult<Self> {
        let path = path.as_ref();
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Serialize as pretty TOML
    pub fn to_toml_string(&self) -> LabResult<String> {
        toml::to_string_pretty(self).map_err(|e| LabError::serialization(e.to_string()))
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> LabResult<()> {
        if self.events.partition_window_secs == 0 {
            return Err(LabError::invalid_config(
                "events.partition_window_secs must be positive",
            ));
        }
        if self.events.max_events == Some(0) {
            return Err(LabError::invalid_config("events.max_events must be positive"));
        }
        if self.retention.interval_secs == 0 {
            return Err(LabError::invalid_config(
                "retention.interval_secs must be positive",
            ));
        }
        if self.query.page_size == 0 {
            return Err(LabError::invalid_config("query.page_size must be positive"));
        }
        if self.limits.max_attribute_bytes == 0
            || self.limits.max_nesting_depth == 0
            || self.limits.max_name_len == 0
        {
            return Err(LabError::invalid_config("limits must be positive"));
        }
        Ok(())
    }

    /// Partition window as a duration
    pub fn partition_window(&self) -> Duration {
        Duration::from_secs(self.events.partition_window_secs)
    }

    /// Retention age as a duration
    pub fn retention_max_age(&self) -> Duration {
        Duration::from_secs(self.retention.max_age_secs)
    }

    /// Retention interval as a duration
    pub fn retention_interval(&self) -> Duration {
        Duration::from_secs(self.retention.interval_secs)
    }
}

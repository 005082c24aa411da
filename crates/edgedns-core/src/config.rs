//! Configuration types for the DNS reconciliation engine
//!
//! This module defines all configuration structures used throughout the crate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EdgeDnsConfig {
    /// Task executor settings
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Domain records cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Task/lock/inventory store
    #[serde(default)]
    pub store: StoreConfig,
}

impl EdgeDnsConfig {
    /// Create a new configuration with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.executor.validate()?;
        self.cache.validate()?;
        self.store.validate()?;
        Ok(())
    }
}

/// A provider account: backend type code plus its API parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    /// Provider account id
    pub id: i64,

    /// Backend type code (`alidns`, `cloudFlare`, `dnspod`, ...)
    pub type_code: String,

    /// Decoded API parameters
    #[serde(default)]
    pub params: HashMap<String, String>,
}

impl ProviderConfig {
    /// Create a provider configuration without parameters
    pub fn new(id: i64, type_code: impl Into<String>) -> Self {
        Self {
            id,
            type_code: type_code.into(),
            params: HashMap::new(),
        }
    }

    /// Add an API parameter
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// Get the provider type code
    pub fn type_name(&self) -> &str {
        &self.type_code
    }

    /// Validate the provider configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.type_code.is_empty() {
            return Err(crate::Error::config(format!(
                "Provider {} has an empty type code",
                self.id
            )));
        }
        Ok(())
    }
}

/// Task executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutorConfig {
    /// Seconds between two ticks
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Name of the durable lock electing the tick's single executor
    #[serde(default = "default_lock_key")]
    pub lock_key: String,

    /// Capacity of the executor event channel
    ///
    /// When full, new events are dropped (with a warning log).
    ///
    /// Default: 1000 events
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl ExecutorConfig {
    /// Poll period
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Lock TTL: one second shorter than the poll period, at least one second
    ///
    /// A crashed holder therefore never blocks the fleet past the next tick.
    pub fn lock_ttl_secs(&self) -> u64 {
        self.poll_interval_secs.saturating_sub(1).max(1)
    }

    /// Validate the executor configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.poll_interval_secs == 0 {
            return Err(crate::Error::config("Poll interval must be > 0"));
        }
        if self.lock_key.is_empty() {
            return Err(crate::Error::config("Lock key cannot be empty"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            lock_key: default_lock_key(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

/// Domain records cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Absolute lifetime of a cached record list, independent of versions
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,

    /// Seconds between two expiry sweeps
    #[serde(default = "default_cache_clean_interval_secs")]
    pub clean_interval_secs: u64,
}

impl CacheConfig {
    /// Entry lifetime
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Sweep period
    pub fn clean_interval(&self) -> Duration {
        Duration::from_secs(self.clean_interval_secs)
    }

    /// Validate the cache configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.ttl_secs == 0 {
            return Err(crate::Error::config("Cache TTL must be > 0"));
        }
        if self.clean_interval_secs == 0 {
            return Err(crate::Error::config("Cache clean interval must be > 0"));
        }
        Ok(())
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_cache_ttl_secs(),
            clean_interval_secs: default_cache_clean_interval_secs(),
        }
    }
}

/// Store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    /// JSON file store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,
}

impl StoreConfig {
    /// Validate the store configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            StoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("File store path cannot be empty"))
            }
            _ => Ok(()),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_lock_key() -> String {
    "dns_task_executor".to_string()
}

fn default_event_channel_capacity() -> usize {
    1000
}

fn default_cache_ttl_secs() -> u64 {
    24 * 3600
}

fn default_cache_clean_interval_secs() -> u64 {
    3600
}

//! Store configuration.
//!
//! Loading configuration from disk or the environment is left to the host
//! application. This module only defines the shape it must deserialize
//! into, with the same defaults a store gets when an option is omitted.
//!
//! ```
//! use tagged_cache::config::CacheConfig;
//!
//! let config = CacheConfig::from_json(r#"{
//!     "default": "redis",
//!     "stores": {
//!         "redis": { "type": "redis", "host": "10.0.0.5", "prefix": "app:", "expire": 600 },
//!         "local": { "type": "memory" }
//!     }
//! }"#).unwrap();
//!
//! assert_eq!(config.default, "redis");
//! assert_eq!(config.stores["redis"].tag_prefix, "tag:");
//! assert_eq!(config.stores["redis"].pool.max_connections, 10);
//! ```

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Default number of pooled connections per store.
const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Default time an acquire waits for a free connection, in seconds.
const DEFAULT_WAIT_TIMEOUT_SECS: f64 = 10.0;

/// Top-level cache configuration: a default store name plus named stores.
#[derive(Clone, Debug, Deserialize)]
pub struct CacheConfig {
    /// Store used when a caller passes an empty store name.
    #[serde(default = "default_store_name")]
    pub default: String,

    /// Store configurations keyed by store name.
    #[serde(default)]
    pub stores: HashMap<String, StoreConfig>,
}

fn default_store_name() -> String {
    "memory".to_string()
}

impl Default for CacheConfig {
    fn default() -> Self {
        let mut stores = HashMap::new();
        stores.insert(default_store_name(), StoreConfig::default());
        CacheConfig {
            default: default_store_name(),
            stores,
        }
    }
}

impl CacheConfig {
    /// Empty configuration with the given default store name.
    pub fn new(default: impl Into<String>) -> Self {
        CacheConfig {
            default: default.into(),
            stores: HashMap::new(),
        }
    }

    /// Parse a JSON document.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if the document is malformed.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::ConfigError(e.to_string()))
    }

    /// Add or replace a named store.
    pub fn with_store(mut self, name: impl Into<String>, store: StoreConfig) -> Self {
        self.stores.insert(name.into(), store);
        self
    }

    /// Map an empty name to the default store name.
    pub fn resolve_name<'a>(&'a self, name: &'a str) -> &'a str {
        if name.is_empty() {
            &self.default
        } else {
            name
        }
    }

    /// Look up a store by (already resolved) name.
    pub fn store(&self, name: &str) -> Option<&StoreConfig> {
        self.stores.get(name)
    }
}

/// Configuration of one logical store.
///
/// Field names follow the option keys accepted in configuration files.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend type tag (`memory`, `redis`, or a registered custom type).
    #[serde(rename = "type")]
    pub backend: String,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Backend namespace / database index.
    pub select: u32,
    /// Connect timeout in seconds (0 = no timeout).
    pub timeout: u64,
    /// Default entry expiry in seconds (0 = never expire).
    pub expire: u64,
    /// Prefix applied to every key before it reaches the backend.
    pub prefix: String,
    /// Prefix applied to tag names to form tag membership keys.
    pub tag_prefix: String,
    /// Expiry refreshed on a tag membership set on every append (0 = none).
    pub tag_expire: u64,
    pub pool: PoolConfig,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            backend: "memory".to_string(),
            host: "127.0.0.1".to_string(),
            port: 6379,
            username: None,
            password: None,
            select: 0,
            timeout: 0,
            expire: 0,
            prefix: String::new(),
            tag_prefix: "tag:".to_string(),
            tag_expire: 0,
            pool: PoolConfig::default(),
        }
    }
}

impl StoreConfig {
    /// Store configuration for the given backend type with default options.
    pub fn new(backend: impl Into<String>) -> Self {
        StoreConfig {
            backend: backend.into(),
            ..Default::default()
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn with_tag_prefix(mut self, tag_prefix: impl Into<String>) -> Self {
        self.tag_prefix = tag_prefix.into();
        self
    }

    pub fn with_expire(mut self, seconds: u64) -> Self {
        self.expire = seconds;
        self
    }

    pub fn with_tag_expire(mut self, seconds: u64) -> Self {
        self.tag_expire = seconds;
        self
    }

    pub fn with_pool(mut self, pool: PoolConfig) -> Self {
        self.pool = pool;
        self
    }

    /// Connect timeout, `None` when unbounded.
    pub fn connect_timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }

    /// Password, treating an empty string as absent.
    pub fn password(&self) -> Option<&str> {
        self.password.as_deref().filter(|p| !p.is_empty())
    }
}

/// Connection pool bounds for a pooled store.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    /// Maximum number of simultaneously existing connections.
    pub max_connections: usize,
    /// Seconds an acquire waits for a free connection before failing
    /// with `PoolExhausted`. `None` waits indefinitely.
    pub wait_timeout: Option<f64>,
    /// Seconds allowed for creating a new connection.
    pub create_timeout: Option<f64>,
    /// Seconds allowed for the heartbeat check of an idle connection.
    pub recycle_timeout: Option<f64>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            max_connections: DEFAULT_MAX_CONNECTIONS,
            wait_timeout: Some(DEFAULT_WAIT_TIMEOUT_SECS),
            create_timeout: None,
            recycle_timeout: None,
        }
    }
}

impl PoolConfig {
    pub fn new(max_connections: usize) -> Self {
        PoolConfig {
            max_connections,
            ..Default::default()
        }
    }

    pub fn with_wait_timeout(mut self, wait: Option<Duration>) -> Self {
        self.wait_timeout = wait.map(|d| d.as_secs_f64());
        self
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout.and_then(seconds)
    }

    pub fn create_timeout(&self) -> Option<Duration> {
        self.create_timeout.and_then(seconds)
    }

    pub fn recycle_timeout(&self) -> Option<Duration> {
        self.recycle_timeout.and_then(seconds)
    }
}

// Negative or non-finite values are treated as unset.
fn seconds(value: f64) -> Option<Duration> {
    Duration::try_from_secs_f64(value).ok()
}

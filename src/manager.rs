//! Store manager: the single entry point for obtaining a [`Driver`].
//!
//! Owns three registries:
//!
//! - backend factories keyed by backend type (`memory`, `redis`, custom)
//! - cached drivers keyed by store name, built on first use
//! - pooled backends keyed by store name, which outlive driver eviction
//!
//! Whether a store gets a pool is decided by its factory's
//! [`pooled`](BackendFactory::pooled) capability, never by the type name.

use crate::backend::{BackendFactory, CacheBackend, InMemoryFactory};
use crate::config::CacheConfig;
use crate::driver::{Driver, UnitOfWork};
use crate::error::{Error, Result};
use crate::pool::PoolStats;
use dashmap::DashMap;
use std::sync::Arc;

/// Resolves store names to cached drivers.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tagged_cache::{CacheConfig, StoreManager, Ttl};
/// use tagged_cache::config::StoreConfig;
///
/// # #[tokio::main]
/// # async fn main() -> tagged_cache::Result<()> {
/// let config = CacheConfig::new("local").with_store("local", StoreConfig::new("memory"));
/// let manager = StoreManager::new(config);
///
/// let driver = manager.store("")?;
/// assert_eq!(driver.name(), "local");
/// assert!(Arc::ptr_eq(&driver, &manager.store("local")?));
///
/// let mut work = driver.begin();
/// work.set("k", &1u32, Ttl::Default).await?;
/// # Ok(())
/// # }
/// ```
pub struct StoreManager {
    config: CacheConfig,
    factories: DashMap<String, Arc<dyn BackendFactory>>,
    drivers: DashMap<String, Arc<Driver>>,
    pools: DashMap<String, Arc<dyn CacheBackend>>,
}

impl StoreManager {
    /// Manager with the built-in backend types registered.
    pub fn new(config: CacheConfig) -> Self {
        let manager = StoreManager {
            config,
            factories: DashMap::new(),
            drivers: DashMap::new(),
            pools: DashMap::new(),
        };

        manager.register_backend("memory", InMemoryFactory);
        #[cfg(feature = "redis")]
        manager.register_backend("redis", crate::backend::RedisFactory);

        manager
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Register (or replace) the factory for a backend type.
    ///
    /// Only affects drivers built afterwards.
    pub fn register_backend(&self, kind: impl Into<String>, factory: impl BackendFactory + 'static) {
        let kind = kind.into();
        debug!("Registered cache backend type [{}]", kind);
        self.factories.insert(kind, Arc::new(factory));
    }

    /// Driver for `name` (empty = default store), built on first use.
    ///
    /// # Errors
    /// - `Error::UnknownStore`: no configuration for the resolved name
    /// - `Error::UnsupportedBackend`: the configured type has no factory
    /// - `Error::ConfigError`: the factory rejected the configuration
    pub fn store(&self, name: &str) -> Result<Arc<Driver>> {
        let name = self.config.resolve_name(name);

        if let Some(driver) = self.drivers.get(name) {
            return Ok(Arc::clone(&driver));
        }

        let driver = self
            .drivers
            .entry(name.to_string())
            .or_try_insert_with(|| self.build_driver(name).map(Arc::new))?;
        Ok(Arc::clone(&driver))
    }

    /// Open a unit of work on the named store.
    pub fn begin(&self, name: &str) -> Result<UnitOfWork> {
        Ok(self.store(name)?.begin())
    }

    /// Evict a cached driver. Returns whether one was cached.
    ///
    /// Units of work already running keep their driver and connection. The
    /// store's pool, if any, is kept for the rebuilt driver.
    pub fn forget_driver(&self, name: &str) -> bool {
        let name = self.config.resolve_name(name);
        let removed = self.drivers.remove(name).is_some();
        if removed {
            debug!("Forgot driver for store [{}]", name);
        }
        removed
    }

    /// Evict several cached drivers.
    pub fn forget_drivers<I, S>(&self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for name in names {
            self.forget_driver(name.as_ref());
        }
    }

    /// Whether a driver is currently cached for `name`.
    pub fn has_driver(&self, name: &str) -> bool {
        self.drivers.contains_key(self.config.resolve_name(name))
    }

    /// Occupancy of the store's pool, `None` for non-pooled or unbuilt stores.
    pub fn pool_stats(&self, name: &str) -> Option<PoolStats> {
        self.pools
            .get(self.config.resolve_name(name))
            .and_then(|backend| backend.pool_stats())
    }

    fn build_driver(&self, name: &str) -> Result<Driver> {
        let config = self
            .config
            .store(name)
            .ok_or_else(|| Error::UnknownStore(name.to_string()))?;

        let factory = self
            .factories
            .get(&config.backend)
            .map(|f| Arc::clone(&f))
            .ok_or_else(|| Error::UnsupportedBackend(config.backend.clone()))?;

        let backend = if factory.pooled() {
            let backend = self
                .pools
                .entry(name.to_string())
                .or_try_insert_with(|| factory.build(name, config))?;
            Arc::clone(&backend)
        } else {
            factory.build(name, config)?
        };

        info!(
            "✓ Driver for store [{}] created ({} backend)",
            name,
            backend.kind()
        );
        Ok(Driver::new(name, config.clone(), backend))
    }
}

impl std::fmt::Debug for StoreManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreManager")
            .field("default", &self.config.default)
            .field("drivers", &self.drivers.len())
            .field("pools", &self.pools.len())
            .finish()
    }
}

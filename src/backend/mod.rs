//! Cache backend implementations.
//!
//! A backend only provides raw storage primitives on already-prefixed keys
//! and opaque bytes. Key namespacing, expiry defaults, value encoding and
//! tagging live in [`Driver`](crate::Driver) so every backend behaves the
//! same way.
//!
//! Three traits split the concerns:
//!
//! - [`BackendConnection`]: the command set, executed on one connection
//! - [`CacheBackend`]: hands out a connection for one unit of work
//! - [`BackendFactory`]: builds a backend from a store configuration and
//!   declares whether it needs a per-store connection [`Pool`]

use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::pool::{ConnectionFactory, Pool, PoolStats, PooledConnection};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

pub mod inmemory;
#[cfg(feature = "redis")]
pub mod redis;

pub use inmemory::{InMemoryBackend, InMemoryFactory};
#[cfg(feature = "redis")]
pub use redis::{RedisConfig, RedisConnection, RedisConnector, RedisFactory};

/// Raw storage commands executed on one connection.
///
/// **IMPORTANT:** Methods take `&mut self`: a connection is never used by
/// two units of work at the same time.
#[async_trait]
pub trait BackendConnection: Send {
    /// Whether a live entry exists for `key`.
    async fn exists(&mut self, key: &str) -> Result<bool>;

    /// Raw bytes stored under `key`, `None` on miss.
    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store bytes, replacing any previous value and expiry.
    /// `ttl = None` stores a permanent entry.
    async fn set(&mut self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Delete keys, returning how many existed. Missing keys are ignored.
    async fn delete(&mut self, keys: &[String]) -> Result<u64>;

    /// Atomically add `delta` to an integer value (absent counts as 0).
    ///
    /// Returns `Ok(None)` when the existing value is not an integer.
    async fn incr_by(&mut self, key: &str, delta: i64) -> Result<Option<i64>>;

    /// Add `member` to the set stored at `key`.
    async fn set_add(&mut self, key: &str, member: &str) -> Result<()>;

    /// Members of the set stored at `key` (empty when absent).
    async fn set_members(&mut self, key: &str) -> Result<Vec<String>>;

    /// Set the expiry of an existing key.
    async fn expire(&mut self, key: &str, ttl: Duration) -> Result<()>;

    /// Remove every entry of the backend scope (not only this crate's prefix).
    async fn flush(&mut self) -> Result<()>;

    /// Heartbeat.
    async fn ping(&mut self) -> Result<bool> {
        Ok(true)
    }
}

/// A physical backend that can lend connections.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Backend type tag, for logs.
    fn kind(&self) -> &'static str;

    /// Borrow a connection for one unit of work.
    ///
    /// The connection is returned when the box is dropped.
    ///
    /// # Errors
    /// Returns `Err` if no connection can be obtained (`PoolExhausted`,
    /// `ConnectionFault`).
    async fn connect(&self) -> Result<Box<dyn BackendConnection>>;

    /// Pool occupancy, for pooled backends.
    fn pool_stats(&self) -> Option<PoolStats> {
        None
    }
}

/// Builds backends for one backend type.
pub trait BackendFactory: Send + Sync {
    /// Whether connections must be borrowed from a per-store pool.
    ///
    /// The store manager caches pooled backends per store name so the pool
    /// outlives driver eviction; direct backends are rebuilt with the driver.
    fn pooled(&self) -> bool;

    /// Build a backend for the named store.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if the store configuration is unusable.
    fn build(&self, store: &str, config: &StoreConfig) -> Result<Arc<dyn CacheBackend>>;
}

/// Backend lending connections out of a [`Pool`].
pub struct PooledBackend<F: ConnectionFactory> {
    pool: Pool<F>,
    kind: &'static str,
}

impl<F: ConnectionFactory> PooledBackend<F> {
    pub fn new(kind: &'static str, pool: Pool<F>) -> Self {
        PooledBackend { pool, kind }
    }

    pub fn pool(&self) -> &Pool<F> {
        &self.pool
    }
}

#[async_trait]
impl<F> CacheBackend for PooledBackend<F>
where
    F: ConnectionFactory,
    F::Connection: BackendConnection,
{
    fn kind(&self) -> &'static str {
        self.kind
    }

    async fn connect(&self) -> Result<Box<dyn BackendConnection>> {
        let conn = self.pool.acquire().await?;
        Ok(Box::new(conn))
    }

    fn pool_stats(&self) -> Option<PoolStats> {
        Some(self.pool.status())
    }
}

impl<F: ConnectionFactory> Drop for PooledBackend<F> {
    fn drop(&mut self) {
        self.pool.shutdown();
    }
}

impl<F: ConnectionFactory> PooledConnection<F> {
    // Transport faults poison the connection so it is not returned to the pool.
    fn observe<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(Error::ConnectionFault(ref msg)) = result {
            warn!("⚠ Connection fault, discarding connection: {}", msg);
            self.mark_broken();
        }
        result
    }
}

#[async_trait]
impl<F> BackendConnection for PooledConnection<F>
where
    F: ConnectionFactory,
    F::Connection: BackendConnection,
{
    async fn exists(&mut self, key: &str) -> Result<bool> {
        let result = (**self).exists(key).await;
        self.observe(result)
    }

    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let result = (**self).get(key).await;
        self.observe(result)
    }

    async fn set(&mut self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let result = (**self).set(key, value, ttl).await;
        self.observe(result)
    }

    async fn delete(&mut self, keys: &[String]) -> Result<u64> {
        let result = (**self).delete(keys).await;
        self.observe(result)
    }

    async fn incr_by(&mut self, key: &str, delta: i64) -> Result<Option<i64>> {
        let result = (**self).incr_by(key, delta).await;
        self.observe(result)
    }

    async fn set_add(&mut self, key: &str, member: &str) -> Result<()> {
        let result = (**self).set_add(key, member).await;
        self.observe(result)
    }

    async fn set_members(&mut self, key: &str) -> Result<Vec<String>> {
        let result = (**self).set_members(key).await;
        self.observe(result)
    }

    async fn expire(&mut self, key: &str, ttl: Duration) -> Result<()> {
        let result = (**self).expire(key, ttl).await;
        self.observe(result)
    }

    async fn flush(&mut self) -> Result<()> {
        let result = (**self).flush().await;
        self.observe(result)
    }

    async fn ping(&mut self) -> Result<bool> {
        let result = (**self).ping().await;
        self.observe(result)
    }
}

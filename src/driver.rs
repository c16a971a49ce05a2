//! Store driver and unit-of-work scoped connection discipline.
//!
//! A [`Driver`] binds one store configuration to one physical backend. It
//! never runs commands itself: callers open a [`UnitOfWork`] with
//! [`Driver::begin`] and issue every operation through it.
//!
//! The unit of work borrows a backend connection on its first operation,
//! reuses that connection for every later operation, and returns it when the
//! handle is dropped. Dropping happens on success, on `?` early returns and
//! when the owning task is cancelled, so the return is unconditional.
//!
//! ```
//! use std::sync::Arc;
//! use tagged_cache::{Driver, Ttl};
//! use tagged_cache::backend::InMemoryBackend;
//! use tagged_cache::config::StoreConfig;
//!
//! # #[tokio::main]
//! # async fn main() -> tagged_cache::Result<()> {
//! let driver = Arc::new(Driver::new(
//!     "local",
//!     StoreConfig::default().with_prefix("app:"),
//!     Arc::new(InMemoryBackend::new()),
//! ));
//!
//! let mut work = driver.begin();
//! work.set("user:1", &"alice", Ttl::Default).await?;
//! assert_eq!(work.get::<String>("user:1").await?, Some("alice".to_string()));
//! work.finish();
//! # Ok(())
//! # }
//! ```

use crate::backend::{BackendConnection, CacheBackend};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::key::{validate_key, validate_tag, KeySpace};
use crate::serialization;
use crate::tag::TagSet;
use crate::ttl::Ttl;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// One logical store bound to one backend.
pub struct Driver {
    name: String,
    config: StoreConfig,
    keys: KeySpace,
    backend: Arc<dyn CacheBackend>,
}

impl Driver {
    pub fn new(
        name: impl Into<String>,
        config: StoreConfig,
        backend: Arc<dyn CacheBackend>,
    ) -> Self {
        let keys = KeySpace::from(&config);
        Driver {
            name: name.into(),
            config,
            keys,
            backend,
        }
    }

    /// Open a unit of work. No connection is borrowed until the first operation.
    pub fn begin(self: &Arc<Self>) -> UnitOfWork {
        UnitOfWork {
            driver: Arc::clone(self),
            conn: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Resolve a write's expiry against this store's default.
    pub fn resolve_ttl(&self, ttl: Ttl) -> Option<Duration> {
        ttl.resolve(self.config.expire)
    }
}

impl std::fmt::Debug for Driver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("name", &self.name)
            .field("backend", &self.backend.kind())
            .field("keys", &self.keys)
            .finish()
    }
}

/// Scope of one logical operation against a [`Driver`].
///
/// Holds at most one borrowed connection, exclusively, for its whole life.
/// A transport fault drops that connection (it is discarded, not pooled)
/// and the next operation borrows a fresh one.
pub struct UnitOfWork {
    driver: Arc<Driver>,
    conn: Option<Box<dyn BackendConnection>>,
}

impl UnitOfWork {
    pub fn driver(&self) -> &Arc<Driver> {
        &self.driver
    }

    /// Whether a connection is currently borrowed.
    pub fn is_connected(&self) -> bool {
        self.conn.is_some()
    }

    /// End the unit of work, returning its connection.
    pub fn finish(self) {}

    async fn connection(&mut self) -> Result<&mut Box<dyn BackendConnection>> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => {
                let conn = self.driver.backend.connect().await?;
                trace!("Store [{}] borrowed a connection", self.driver.name);
                conn
            }
        };
        Ok(self.conn.insert(conn))
    }

    fn settle<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(Error::ConnectionFault(msg)) = &result {
            if self.conn.take().is_some() {
                warn!(
                    "⚠ Store [{}] dropped its connection after a fault: {}",
                    self.driver.name, msg
                );
            }
        }
        result
    }

    async fn raw_get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        validate_key(key)?;
        let key = self.driver.keys.cache_key(key);
        let conn = self.connection().await?;
        let result = conn.get(&key).await;
        self.settle(result)
    }

    /// Whether a live entry exists for `key`.
    pub async fn has(&mut self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let key = self.driver.keys.cache_key(key);
        let conn = self.connection().await?;
        let result = conn.exists(&key).await;
        self.settle(result)
    }

    /// Stored value for `key`, `None` on miss.
    ///
    /// # Errors
    /// Besides backend faults, returns the codec error if the stored bytes
    /// are not a value of this crate's format (see [`serialization::decode`]).
    pub async fn get<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        match self.raw_get(key).await? {
            Some(bytes) => serialization::decode(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Stored value for `key`, or `default` when absent or null.
    pub async fn get_or<T: Serialize + DeserializeOwned>(&mut self, key: &str, default: T) -> Result<T> {
        Ok(self.get_present(key).await?.unwrap_or(default))
    }

    // A stored null reads as a miss.
    async fn get_present<T: Serialize + DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        let value = self.get::<T>(key).await?;
        Ok(value.filter(|v| !serialization::is_null(v)))
    }

    /// Current value of a counter maintained by [`inc`](Self::inc)/[`dec`](Self::dec).
    pub async fn counter(&mut self, key: &str) -> Result<Option<i64>> {
        match self.raw_get(key).await? {
            Some(bytes) => serialization::decode_counter(&bytes).map(Some),
            None => Ok(None),
        }
    }

    /// Store a value, replacing any previous value and expiry.
    ///
    /// Returns `Ok(true)` once the backend accepted the write.
    pub async fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T, ttl: Ttl) -> Result<bool> {
        validate_key(key)?;
        let bytes = serialization::encode(value)?;
        let ttl = self.driver.resolve_ttl(ttl);
        let key = self.driver.keys.cache_key(key);
        let conn = self.connection().await?;
        let result = conn.set(&key, bytes, ttl).await;
        self.settle(result).map(|()| true)
    }

    /// Remove `key`. `Ok(true)` iff an entry was removed.
    pub async fn delete(&mut self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let keys = [self.driver.keys.cache_key(key)];
        let conn = self.connection().await?;
        let result = conn.delete(&keys).await;
        self.settle(result).map(|removed| removed > 0)
    }

    /// Atomically add `step`. Absent keys start at 0.
    ///
    /// Returns `Ok(None)` when the existing value is not numeric.
    pub async fn inc(&mut self, key: &str, step: i64) -> Result<Option<i64>> {
        validate_key(key)?;
        let key = self.driver.keys.cache_key(key);
        let conn = self.connection().await?;
        let result = conn.incr_by(&key, step).await;
        self.settle(result)
    }

    /// Atomically subtract `step`. See [`inc`](Self::inc).
    pub async fn dec(&mut self, key: &str, step: i64) -> Result<Option<i64>> {
        let delta = step.checked_neg().ok_or_else(|| {
            Error::InvalidArgument(format!("decrement step {} out of range", step))
        })?;
        self.inc(key, delta).await
    }

    /// Flush the whole backend scope.
    ///
    /// **WARNING:** this is not limited to this store's key prefix: every
    /// entry in the backend database is removed, tagged or not.
    pub async fn clear(&mut self) -> Result<bool> {
        let conn = self.connection().await?;
        let result = conn.flush().await;
        self.settle(result).map(|()| true)
    }

    /// Add `member` to the membership set stored under logical key `name`,
    /// refreshing the set's expiry to the store's `tag_expire`.
    pub async fn append(&mut self, name: &str, member: &str) -> Result<()> {
        validate_key(name)?;
        let key = self.driver.keys.cache_key(name);
        let tag_expire = self.driver.config.tag_expire;

        let conn = self.connection().await?;
        let mut result = conn.set_add(&key, member).await;
        if result.is_ok() && tag_expire > 0 {
            result = conn.expire(&key, Duration::from_secs(tag_expire)).await;
        }
        self.settle(result)
    }

    /// Backend keys currently recorded under `tag`.
    pub async fn tag_items(&mut self, tag: &str) -> Result<Vec<String>> {
        validate_tag(tag)?;
        let key = self.driver.keys.tag_set_key(tag);
        let conn = self.connection().await?;
        let result = conn.set_members(&key).await;
        self.settle(result)
    }

    /// Delete already-prefixed backend keys. Missing keys are ignored.
    pub async fn clear_tag(&mut self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let conn = self.connection().await?;
        let result = conn.delete(keys).await;
        self.settle(result).map(|_| ())
    }

    /// Read and remove `key`.
    pub async fn pull<T: DeserializeOwned>(&mut self, key: &str) -> Result<Option<T>> {
        let value = self.get(key).await?;
        if value.is_some() {
            self.delete(key).await?;
        }
        Ok(value)
    }

    /// Cached value for `key`, or the result of `compute` which is then
    /// stored with `ttl`. `compute` runs at most once, and only on a miss
    /// (absent or stored null).
    pub async fn remember<T, F, Fut>(&mut self, key: &str, compute: F, ttl: Ttl) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if let Some(value) = self.get_present(key).await? {
            return Ok(value);
        }

        let value = compute().await;
        self.set(key, &value, ttl).await?;
        Ok(value)
    }

    /// Values for several keys, in order, `None` for misses.
    pub async fn get_multiple<T: DeserializeOwned>(&mut self, keys: &[&str]) -> Result<Vec<Option<T>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    /// Store several values in iteration order.
    ///
    /// Stops at the first write that is not accepted and returns `Ok(false)`;
    /// earlier writes are kept.
    pub async fn set_multiple<K, V, I>(&mut self, items: I, ttl: Ttl) -> Result<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        for (key, value) in items {
            if !self.set(key.as_ref(), &value, ttl).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Remove several keys at once. `Ok(true)` iff at least one entry was removed.
    pub async fn delete_multiple(&mut self, keys: &[&str]) -> Result<bool> {
        let mut backend_keys = Vec::with_capacity(keys.len());
        for key in keys {
            validate_key(key)?;
            backend_keys.push(self.driver.keys.cache_key(key));
        }
        if backend_keys.is_empty() {
            return Ok(false);
        }

        let conn = self.connection().await?;
        let result = conn.delete(&backend_keys).await;
        self.settle(result).map(|removed| removed > 0)
    }

    /// Tag-scoped view of this unit of work.
    pub fn tag<I, S>(&mut self, tags: I) -> TagSet<'_>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TagSet::new(tags.into_iter().map(Into::into).collect(), self)
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if self.conn.take().is_some() {
            trace!("Store [{}] released its connection", self.driver.name);
        }
    }
}

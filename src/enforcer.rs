//! Cache enforcer - policy layer in front of the store manager.
//!
//! Adds three policies on top of a [`Driver`]:
//!
//! - every write is tagged with the caller's tags plus [`DEFAULT_TAG`], so
//!   the default tag is a catch-all invalidation path
//! - an unset ttl means [`DEFAULT_EXPIRE`] seconds; `Some(0)` means permanent
//! - faults never reach the caller: they are reported once to a
//!   [`FaultReporter`] and the call returns the default / `false`
//!
//! A miss on [`get`](Enforcer::get) warms the cache with the default, unless
//! the default is blank (null, empty list, empty map).

use crate::driver::{Driver, UnitOfWork};
use crate::error::{Error, Result};
use crate::manager::StoreManager;
use crate::observability::{FaultRecord, FaultReporter, LogReporter};
use crate::serialization;
use crate::ttl::Ttl;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

/// Tag attached to every entry written through an [`Enforcer`].
pub const DEFAULT_TAG: &str = "sys";

/// Expiry, in seconds, of entries written without an explicit ttl.
pub const DEFAULT_EXPIRE: u64 = 14400;

/// Fault-containing cache facade bound to one store.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use tagged_cache::{CacheConfig, Enforcer, StoreManager};
///
/// # #[tokio::main]
/// # async fn main() {
/// let manager = Arc::new(StoreManager::new(CacheConfig::default()));
/// let cache = Enforcer::new(manager);
///
/// let answer = cache.get("answer", 42u32, None, Some("math")).await;
/// assert_eq!(answer, 42);
/// assert!(cache.has("answer").await);
///
/// assert!(cache.clear(Some("math")).await);
/// assert!(!cache.has("answer").await);
/// # }
/// ```
#[derive(Clone)]
pub struct Enforcer {
    manager: Arc<StoreManager>,
    store: String,
    reporter: Arc<dyn FaultReporter>,
}

impl Enforcer {
    /// Enforcer on the manager's default store.
    pub fn new(manager: Arc<StoreManager>) -> Self {
        Self::for_store(manager, "")
    }

    /// Enforcer on a named store.
    pub fn for_store(manager: Arc<StoreManager>, store: impl Into<String>) -> Self {
        Enforcer {
            manager,
            store: store.into(),
            reporter: Arc::new(LogReporter),
        }
    }

    /// Set custom fault reporter.
    pub fn with_reporter(mut self, reporter: Arc<dyn FaultReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn store_name(&self) -> &str {
        self.manager.config().resolve_name(&self.store)
    }

    /// Deduplicate caller tags (keeping first-seen order) and append [`DEFAULT_TAG`].
    pub fn resolve_tags<I, S>(tags: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut resolved = dedupe(tags);
        if !resolved.iter().any(|t| t == DEFAULT_TAG) {
            resolved.push(DEFAULT_TAG.to_string());
        }
        resolved
    }

    /// `None` means [`DEFAULT_EXPIRE`], `Some(0)` means permanent.
    pub fn resolve_ttl(ttl: Option<u64>) -> Ttl {
        Ttl::from(ttl.unwrap_or(DEFAULT_EXPIRE))
    }

    /// Cached value for `key`, or `default`.
    ///
    /// On a miss a non-blank `default` is stored under the resolved tags and
    /// ttl before it is returned.
    pub async fn get<T, I, S>(&self, key: &str, default: T, ttl: Option<u64>, tags: I) -> T
    where
        T: Serialize + DeserializeOwned,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.get_with(key, || async move { default }, ttl, tags).await
    }

    /// Like [`get`](Self::get), with the default computed by `compute`.
    ///
    /// `compute` runs only on a miss or a fault, and at most once.
    pub async fn get_with<T, F, Fut, I, S>(
        &self,
        key: &str,
        compute: F,
        ttl: Option<u64>,
        tags: I,
    ) -> T
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let timer = Instant::now();

        let mut work = match self.begin() {
            Ok(work) => work,
            Err(e) => {
                self.report("get", key, e);
                return compute().await;
            }
        };

        match self.lookup::<T>(&mut work, key).await {
            Ok(Some(value)) => {
                self.reporter.record_hit(key, timer.elapsed());
                value
            }
            Ok(None) => {
                self.reporter.record_miss(key, timer.elapsed());
                let value = compute().await;
                if serialization::is_blank(&value) {
                    debug!("Blank value for [{}] not cached", key);
                    return value;
                }

                let tags = Self::resolve_tags(tags);
                if let Err(e) = work
                    .tag(tags)
                    .set(key, &value, Self::resolve_ttl(ttl))
                    .await
                {
                    self.report("set", key, e);
                }
                value
            }
            Err(e) => {
                self.report("get", key, e);
                // The faulting connection is gone; release the unit of work
                // before running caller code.
                drop(work);
                compute().await
            }
        }
    }

    /// Store `value` under the resolved tags and ttl. `false` on fault.
    pub async fn set<T, I, S>(&self, key: &str, value: &T, ttl: Option<u64>, tags: I) -> bool
    where
        T: Serialize + ?Sized,
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags = Self::resolve_tags(tags);
        let ttl = Self::resolve_ttl(ttl);
        self.contain("set", key, |mut work| async move {
            work.tag(tags).set(key, value, ttl).await
        })
        .await
    }

    /// Remove `key`. `false` if nothing was removed or on fault.
    pub async fn delete(&self, key: &str) -> bool {
        self.contain("delete", key, |mut work| async move { work.delete(key).await })
            .await
    }

    /// Whether `key` exists. `false` on fault.
    pub async fn has(&self, key: &str) -> bool {
        self.contain("has", key, |mut work| async move { work.has(key).await })
            .await
    }

    /// Clear every entry recorded under the given tags, or under
    /// [`DEFAULT_TAG`] when no tag is given. `false` on fault.
    pub async fn clear<I, S>(&self, tags: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut resolved = dedupe(tags);
        if resolved.is_empty() {
            resolved.push(DEFAULT_TAG.to_string());
        }

        let label = resolved.join(",");
        self.contain("clear", &label, |mut work| async move {
            work.tag(resolved).clear().await
        })
        .await
    }

    fn begin(&self) -> Result<UnitOfWork> {
        self.driver().map(|driver| driver.begin())
    }

    fn driver(&self) -> Result<Arc<Driver>> {
        self.manager.store(&self.store)
    }

    // Stored nulls and entries this build cannot decode are treated as
    // misses and overwritten.
    async fn lookup<T>(&self, work: &mut UnitOfWork, key: &str) -> Result<Option<T>>
    where
        T: Serialize + DeserializeOwned,
    {
        match work.get::<T>(key).await {
            Ok(Some(value)) if serialization::is_null(&value) => Ok(None),
            Err(
                e @ (Error::InvalidCacheEntry(_)
                | Error::VersionMismatch { .. }
                | Error::DeserializationError(_)),
            ) => {
                warn!("Undecodable cache entry [{}] treated as miss: {}", key, e);
                Ok(None)
            }
            other => other,
        }
    }

    async fn contain<F, Fut>(&self, operation: &'static str, key: &str, op: F) -> bool
    where
        F: FnOnce(UnitOfWork) -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let result = match self.begin() {
            Ok(work) => op(work).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(done) => done,
            Err(e) => {
                self.report(operation, key, e);
                false
            }
        }
    }

    fn report(&self, operation: &'static str, key: &str, error: Error) {
        let record = FaultRecord::new(operation, key, self.store_name(), error);
        self.reporter.report(&record);
    }
}

fn dedupe<I, S>(tags: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut unique: Vec<String> = Vec::new();
    for tag in tags.into_iter().map(Into::into) {
        if !unique.contains(&tag) {
            unique.push(tag);
        }
    }
    unique
}

impl std::fmt::Debug for Enforcer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Enforcer")
            .field("store", &self.store_name())
            .finish()
    }
}

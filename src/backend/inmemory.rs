//! In-memory cache backend (default, thread-safe, async).
//!
//! Uses DashMap for lock-free concurrent access with per-key sharding.
//! Automatically handles TTL expiration on access.

use super::{BackendConnection, BackendFactory, CacheBackend};
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

/// Stored value: opaque bytes or a set of members (tag membership).
enum Slot {
    Bytes(Vec<u8>),
    Set(HashSet<String>),
}

/// In-memory cache entry with optional expiration.
struct CacheEntry {
    slot: Slot,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn new(slot: Slot, ttl: Option<Duration>) -> Self {
        let expires_at = ttl.map(|d| Instant::now() + d);
        CacheEntry { slot, expires_at }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|exp| Instant::now() > exp)
    }

    fn size(&self) -> usize {
        match &self.slot {
            Slot::Bytes(data) => data.len(),
            Slot::Set(members) => members.iter().map(String::len).sum(),
        }
    }
}

/// Thread-safe async in-memory cache backend.
///
/// Clones share the same store, so a clone doubles as a "connection".
/// No async locks required - operations are non-blocking.
///
/// # Example
///
/// ```
/// use tagged_cache::backend::{BackendConnection, InMemoryBackend};
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut backend = InMemoryBackend::new();
///
///     backend.set("key1", b"value".to_vec(), None).await?;
///     assert!(backend.get("key1").await?.is_some());
///
///     backend.set("key2", b"expires".to_vec(), Some(Duration::from_secs(300))).await?;
///     assert_eq!(backend.incr_by("hits", 2).await?, Some(2));
///
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, CacheEntry>>,
}

impl InMemoryBackend {
    /// Create a new in-memory cache backend.
    pub fn new() -> Self {
        InMemoryBackend {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Get the current number of entries in cache.
    pub fn len(&self) -> usize {
        self.store.len()
    }

    /// Check if cache is empty.
    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    /// Get memory statistics.
    pub fn stats(&self) -> CacheStats {
        let total_bytes: usize = self.store.iter().map(|entry| entry.size()).sum();
        let expired_count = self.store.iter().filter(|entry| entry.is_expired()).count();

        CacheStats {
            total_entries: self.store.len(),
            expired_entries: expired_count,
            total_bytes,
        }
    }

    /// Print cache statistics to debug log.
    pub fn log_stats(&self) {
        let stats = self.stats();
        debug!(
            "Cache Stats: {} entries ({} expired), {} bytes",
            stats.total_entries, stats.expired_entries, stats.total_bytes
        );
    }

    // Drops an expired entry so the key behaves as absent.
    fn purge_expired(&self, key: &str) {
        self.store.remove_if(key, |_, entry| entry.is_expired());
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BackendConnection for InMemoryBackend {
    async fn exists(&mut self, key: &str) -> Result<bool> {
        if let Some(entry) = self.store.get(key) {
            return Ok(!entry.is_expired());
        }

        Ok(false)
    }

    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.store.get(key) {
            if !entry.is_expired() {
                if let Slot::Bytes(data) = &entry.slot {
                    debug!("✓ InMemory GET {} -> HIT", key);
                    return Ok(Some(data.clone()));
                }
                return Err(Error::BackendError(format!(
                    "WRONGTYPE key [{}] holds a set",
                    key
                )));
            }
        }

        self.purge_expired(key);
        debug!("✓ InMemory GET {} -> MISS", key);
        Ok(None)
    }

    async fn set(&mut self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let entry = CacheEntry::new(Slot::Bytes(value), ttl);
        self.store.insert(key.to_string(), entry);

        if let Some(d) = ttl {
            debug!("✓ InMemory SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ InMemory SET {}", key);
        }

        Ok(())
    }

    async fn delete(&mut self, keys: &[String]) -> Result<u64> {
        let mut removed = 0;
        for key in keys {
            if let Some((_, entry)) = self.store.remove(key.as_str()) {
                if !entry.is_expired() {
                    removed += 1;
                }
            }
        }

        debug!("✓ InMemory DELETE {} keys ({} existed)", keys.len(), removed);
        Ok(removed)
    }

    async fn incr_by(&mut self, key: &str, delta: i64) -> Result<Option<i64>> {
        self.purge_expired(key);

        // The entry guard holds the shard lock, making read-modify-write atomic.
        let value = match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                let current = match &entry.slot {
                    Slot::Bytes(data) => std::str::from_utf8(data)
                        .ok()
                        .and_then(|s| s.parse::<i64>().ok()),
                    Slot::Set(_) => None,
                };
                let Some(next) = current.and_then(|n| n.checked_add(delta)) else {
                    debug!("✓ InMemory INCRBY {} -> not an integer", key);
                    return Ok(None);
                };
                entry.slot = Slot::Bytes(next.to_string().into_bytes());
                next
            }
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::new(
                    Slot::Bytes(delta.to_string().into_bytes()),
                    None,
                ));
                delta
            }
        };

        debug!("✓ InMemory INCRBY {} {} -> {}", key, delta, value);
        Ok(Some(value))
    }

    async fn set_add(&mut self, key: &str, member: &str) -> Result<()> {
        self.purge_expired(key);

        let mut entry = self
            .store
            .entry(key.to_string())
            .or_insert_with(|| CacheEntry::new(Slot::Set(HashSet::new()), None));

        match &mut entry.slot {
            Slot::Set(members) => {
                members.insert(member.to_string());
                debug!("✓ InMemory SADD {} {}", key, member);
                Ok(())
            }
            Slot::Bytes(_) => Err(Error::BackendError(format!(
                "WRONGTYPE key [{}] does not hold a set",
                key
            ))),
        }
    }

    async fn set_members(&mut self, key: &str) -> Result<Vec<String>> {
        self.purge_expired(key);

        match self.store.get(key) {
            Some(entry) => match &entry.slot {
                Slot::Set(members) => Ok(members.iter().cloned().collect()),
                Slot::Bytes(_) => Err(Error::BackendError(format!(
                    "WRONGTYPE key [{}] does not hold a set",
                    key
                ))),
            },
            None => Ok(Vec::new()),
        }
    }

    async fn expire(&mut self, key: &str, ttl: Duration) -> Result<()> {
        self.purge_expired(key);

        if let Some(mut entry) = self.store.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
            debug!("✓ InMemory EXPIRE {} {:?}", key, ttl);
        }
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        self.store.clear();
        warn!("⚠ InMemory FLUSH executed - all cache cleared!");
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for InMemoryBackend {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn connect(&self) -> Result<Box<dyn BackendConnection>> {
        Ok(Box::new(self.clone()))
    }
}

/// Factory for the `memory` backend type.
///
/// Not pooled: every built backend is an independent store, dropped with the
/// driver that owns it.
#[derive(Clone, Copy, Debug, Default)]
pub struct InMemoryFactory;

impl BackendFactory for InMemoryFactory {
    fn pooled(&self) -> bool {
        false
    }

    fn build(&self, store: &str, _config: &StoreConfig) -> Result<Arc<dyn CacheBackend>> {
        debug!("✓ Building in-memory backend for store [{}]", store);
        Ok(Arc::new(InMemoryBackend::new()))
    }
}

/// Cache statistics.
#[derive(Clone, Debug)]
pub struct CacheStats {
    pub total_entries: usize,
    pub expired_entries: usize,
    pub total_bytes: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_inmemory_backend_set_get() {
        let mut backend = InMemoryBackend::new();

        backend
            .set("key1", b"value1".to_vec(), None)
            .await
            .expect("Failed to set");

        let result = backend.get("key1").await.expect("Failed to get");
        assert_eq!(result, Some(b"value1".to_vec()));
    }

    #[tokio::test]
    async fn test_inmemory_backend_miss() {
        let mut backend = InMemoryBackend::new();

        let result = backend.get("nonexistent").await.expect("Failed to get");
        assert_eq!(result, None);
    }

    #[tokio::test]
    async fn test_inmemory_backend_delete_counts_existing() {
        let mut backend = InMemoryBackend::new();

        backend
            .set("key1", b"value1".to_vec(), None)
            .await
            .expect("Failed to set");
        assert!(backend.exists("key1").await.expect("Failed to check exists"));

        let removed = backend
            .delete(&keys(&["key1", "missing"]))
            .await
            .expect("Failed to delete");
        assert_eq!(removed, 1);
        assert!(!backend.exists("key1").await.expect("Failed to check exists"));

        let removed = backend.delete(&keys(&["key1"])).await.expect("Failed to delete");
        assert_eq!(removed, 0);
    }

    #[tokio::test]
    async fn test_inmemory_backend_ttl_expiration() {
        let mut backend = InMemoryBackend::new();

        backend
            .set("key1", b"value1".to_vec(), Some(Duration::from_millis(100)))
            .await
            .expect("Failed to set");

        assert!(backend.get("key1").await.expect("Failed to get").is_some());

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert!(backend.get("key1").await.expect("Failed to get").is_none());
        assert!(!backend.exists("key1").await.expect("Failed to check exists"));
    }

    #[tokio::test]
    async fn test_inmemory_backend_incr_by() {
        let mut backend = InMemoryBackend::new();

        assert_eq!(backend.incr_by("n", 5).await.unwrap(), Some(5));
        assert_eq!(backend.incr_by("n", -2).await.unwrap(), Some(3));
        assert_eq!(backend.get("n").await.unwrap(), Some(b"3".to_vec()));
    }

    #[tokio::test]
    async fn test_inmemory_backend_incr_non_numeric() {
        let mut backend = InMemoryBackend::new();

        backend.set("s", b"abc".to_vec(), None).await.unwrap();
        assert_eq!(backend.incr_by("s", 1).await.unwrap(), None);
        assert_eq!(backend.get("s").await.unwrap(), Some(b"abc".to_vec()));
    }

    #[tokio::test]
    async fn test_inmemory_backend_incr_keeps_expiry() {
        let mut backend = InMemoryBackend::new();

        backend
            .set("n", b"1".to_vec(), Some(Duration::from_millis(50)))
            .await
            .unwrap();
        assert_eq!(backend.incr_by("n", 1).await.unwrap(), Some(2));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(backend.incr_by("n", 1).await.unwrap(), Some(1));
    }

    #[tokio::test]
    async fn test_inmemory_backend_sets() {
        let mut backend = InMemoryBackend::new();

        backend.set_add("tags", "a").await.unwrap();
        backend.set_add("tags", "b").await.unwrap();
        backend.set_add("tags", "a").await.unwrap();

        let mut members = backend.set_members("tags").await.unwrap();
        members.sort();
        assert_eq!(members, vec!["a".to_string(), "b".to_string()]);
        assert!(backend.set_members("none").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_inmemory_backend_set_type_mismatch() {
        let mut backend = InMemoryBackend::new();

        backend.set("plain", b"v".to_vec(), None).await.unwrap();
        assert!(matches!(
            backend.set_add("plain", "m").await,
            Err(Error::BackendError(_))
        ));

        backend.set_add("members", "m").await.unwrap();
        assert!(matches!(
            backend.get("members").await,
            Err(Error::BackendError(_))
        ));
    }

    #[tokio::test]
    async fn test_inmemory_backend_expire() {
        let mut backend = InMemoryBackend::new();

        backend.set_add("tags", "a").await.unwrap();
        backend
            .expire("tags", Duration::from_millis(50))
            .await
            .unwrap();
        assert!(backend.exists("tags").await.unwrap());

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(backend.set_members("tags").await.unwrap().is_empty());

        // Expiring a missing key is a no-op.
        backend
            .expire("missing", Duration::from_secs(1))
            .await
            .unwrap();
        assert!(!backend.exists("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_inmemory_backend_flush() {
        let mut backend = InMemoryBackend::new();

        backend
            .set("key1", b"value1".to_vec(), None)
            .await
            .expect("Failed to set");
        backend.set_add("key2", "m").await.expect("Failed to sadd");

        assert_eq!(backend.len(), 2);

        backend.flush().await.expect("Failed to flush");

        assert_eq!(backend.len(), 0);
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn test_inmemory_backend_stats() {
        let mut backend = InMemoryBackend::new();

        backend
            .set("key1", b"value_with_data".to_vec(), None)
            .await
            .expect("Failed to set");
        backend
            .set("key2", b"data".to_vec(), None)
            .await
            .expect("Failed to set");

        let stats = backend.stats();
        assert_eq!(stats.total_entries, 2);
        assert_eq!(stats.expired_entries, 0);
        assert_eq!(stats.total_bytes, 19);
    }

    #[tokio::test]
    async fn test_connect_shares_store() {
        let backend = InMemoryBackend::new();

        let mut first = backend.connect().await.expect("connect");
        let mut second = backend.connect().await.expect("connect");

        first.set("key", b"value".to_vec(), None).await.unwrap();
        assert_eq!(second.get("key").await.unwrap(), Some(b"value".to_vec()));
        assert!(backend.pool_stats().is_none());
    }

    #[tokio::test]
    async fn test_factory_builds_isolated_stores() {
        let factory = InMemoryFactory;
        assert!(!factory.pooled());

        let a = factory.build("a", &StoreConfig::default()).unwrap();
        let b = factory.build("b", &StoreConfig::default()).unwrap();

        a.connect().await.unwrap().set("k", b"1".to_vec(), None).await.unwrap();
        assert!(!b.connect().await.unwrap().exists("k").await.unwrap());
        assert_eq!(a.kind(), "memory");
    }

    #[tokio::test]
    async fn test_inmemory_backend_concurrent_incr() {
        let backend = InMemoryBackend::new();
        let mut handles = vec![];

        for _ in 0..10 {
            let mut b = backend.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    b.incr_by("counter", 1).await.expect("Failed to incr");
                }
            }));
        }

        for handle in handles {
            handle.await.expect("Task failed");
        }

        let mut b = backend.clone();
        assert_eq!(b.get("counter").await.unwrap(), Some(b"100".to_vec()));
    }
}

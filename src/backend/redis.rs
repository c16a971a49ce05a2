//! Redis cache backend implementation.
//!
//! Connections are borrowed from a per-store [`Pool`] and reused for one
//! unit of work. AUTH and SELECT happen once, when the pool opens a
//! connection, by encoding them in the connection URL.

use super::{BackendConnection, BackendFactory, CacheBackend, PooledBackend};
use crate::config::{PoolConfig, StoreConfig};
use crate::error::{Error, Result};
use crate::pool::{ConnectionFactory, Pool};
use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use redis::aio::MultiplexedConnection;
use redis::Client;
use std::sync::Arc;
use std::time::Duration;

/// Heartbeat bound for an idle connection when no recycle timeout is configured.
const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(2);

/// Configuration for Redis backend.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: u32,
    pub connection_timeout: Option<Duration>,
    pub pool: PoolConfig,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig::from(&StoreConfig::new("redis"))
    }
}

impl From<&StoreConfig> for RedisConfig {
    fn from(store: &StoreConfig) -> Self {
        RedisConfig {
            host: store.host.clone(),
            port: store.port,
            username: store.username.clone().filter(|u| !u.is_empty()),
            password: store.password().map(str::to_string),
            database: store.select,
            connection_timeout: store.connect_timeout(),
            pool: store.pool.clone(),
        }
    }
}

impl RedisConfig {
    /// Build Redis connection string. Credentials are percent-encoded.
    pub fn connection_string(&self) -> String {
        let encode = |s: &str| utf8_percent_encode(s, NON_ALPHANUMERIC).to_string();

        if let Some(password) = self.password.as_deref().map(encode) {
            if let Some(username) = self.username.as_deref().map(encode) {
                format!(
                    "redis://{}:{}@{}:{}/{}",
                    username, password, self.host, self.port, self.database
                )
            } else {
                format!(
                    "redis://default:{}@{}:{}/{}",
                    password, self.host, self.port, self.database
                )
            }
        } else {
            format!("redis://{}:{}/{}", self.host, self.port, self.database)
        }
    }
}

/// Opens, heartbeats and closes Redis connections for a [`Pool`].
pub struct RedisConnector {
    client: Client,
    address: String,
    connect_timeout: Option<Duration>,
    heartbeat_timeout: Duration,
}

impl RedisConnector {
    /// # Errors
    /// Returns `Error::ConfigError` if the connection URL is invalid.
    pub fn new(config: &RedisConfig) -> Result<Self> {
        let client = Client::open(config.connection_string())
            .map_err(|e| Error::ConfigError(format!("Invalid Redis address: {}", e)))?;

        Ok(RedisConnector {
            client,
            address: format!("{}:{}/{}", config.host, config.port, config.database),
            connect_timeout: config.connection_timeout,
            heartbeat_timeout: config.pool.recycle_timeout().unwrap_or(HEARTBEAT_TIMEOUT),
        })
    }
}

#[async_trait]
impl ConnectionFactory for RedisConnector {
    type Connection = RedisConnection;

    async fn create(&self) -> Result<RedisConnection> {
        let connecting = self.client.get_multiplexed_async_connection();
        let conn = match self.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connecting).await.map_err(|_| {
                Error::ConnectionFault(format!(
                    "Redis connect to {} timed out after {:?}",
                    self.address, limit
                ))
            })??,
            None => connecting.await?,
        };

        info!("✓ Redis connection established: {}", self.address);
        Ok(RedisConnection { conn })
    }

    async fn health_check(&self, conn: &mut RedisConnection) -> bool {
        matches!(
            tokio::time::timeout(self.heartbeat_timeout, conn.ping()).await,
            Ok(Ok(true))
        )
    }

    fn close(&self, _conn: &mut RedisConnection) {
        debug!("✓ Redis connection to {} closed", self.address);
    }
}

/// One Redis connection, owned by a single unit of work while borrowed.
pub struct RedisConnection {
    conn: MultiplexedConnection,
}

// Sub-second expiries are rounded up so they never become "no expiry".
fn millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl BackendConnection for RedisConnection {
    async fn exists(&mut self, key: &str) -> Result<bool> {
        let found: u64 = redis::cmd("EXISTS")
            .arg(key)
            .query_async(&mut self.conn)
            .await?;
        Ok(found > 0)
    }

    async fn get(&mut self, key: &str) -> Result<Option<Vec<u8>>> {
        let value: Option<Vec<u8>> = redis::cmd("GET")
            .arg(key)
            .query_async(&mut self.conn)
            .await?;

        if value.is_some() {
            debug!("✓ Redis GET {} -> HIT", key);
        } else {
            debug!("✓ Redis GET {} -> MISS", key);
        }

        Ok(value)
    }

    async fn set(&mut self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if let Some(duration) = ttl {
            cmd.arg("PX").arg(millis(duration));
        }
        cmd.query_async::<()>(&mut self.conn).await?;

        match ttl {
            Some(d) => debug!("✓ Redis SET {} (TTL: {:?})", key, d),
            None => debug!("✓ Redis SET {}", key),
        }
        Ok(())
    }

    async fn delete(&mut self, keys: &[String]) -> Result<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let removed: u64 = redis::cmd("DEL")
            .arg(keys)
            .query_async(&mut self.conn)
            .await?;

        debug!("✓ Redis DEL {} keys ({} existed)", keys.len(), removed);
        Ok(removed)
    }

    async fn incr_by(&mut self, key: &str, delta: i64) -> Result<Option<i64>> {
        let result: redis::RedisResult<i64> = redis::cmd("INCRBY")
            .arg(key)
            .arg(delta)
            .query_async(&mut self.conn)
            .await;

        match result {
            Ok(value) => {
                debug!("✓ Redis INCRBY {} {} -> {}", key, delta, value);
                Ok(Some(value))
            }
            // ERR: not an integer or overflow; WRONGTYPE: a set lives there
            Err(e) if matches!(e.code(), Some("ERR") | Some("WRONGTYPE")) => {
                debug!("✓ Redis INCRBY {} rejected: {}", key, e);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn set_add(&mut self, key: &str, member: &str) -> Result<()> {
        redis::cmd("SADD")
            .arg(key)
            .arg(member)
            .query_async::<()>(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn set_members(&mut self, key: &str) -> Result<Vec<String>> {
        let members: Vec<String> = redis::cmd("SMEMBERS")
            .arg(key)
            .query_async(&mut self.conn)
            .await?;
        Ok(members)
    }

    async fn expire(&mut self, key: &str, ttl: Duration) -> Result<()> {
        redis::cmd("PEXPIRE")
            .arg(key)
            .arg(millis(ttl))
            .query_async::<()>(&mut self.conn)
            .await?;
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        redis::cmd("FLUSHDB")
            .query_async::<()>(&mut self.conn)
            .await?;

        warn!("⚠ Redis FLUSHDB executed - all cache cleared!");
        Ok(())
    }

    async fn ping(&mut self) -> Result<bool> {
        let pong: String = redis::cmd("PING").query_async(&mut self.conn).await?;
        Ok(pong.contains("PONG"))
    }
}

/// Factory for the `redis` backend type. Always pooled.
#[derive(Clone, Copy, Debug, Default)]
pub struct RedisFactory;

impl BackendFactory for RedisFactory {
    fn pooled(&self) -> bool {
        true
    }

    fn build(&self, store: &str, config: &StoreConfig) -> Result<Arc<dyn CacheBackend>> {
        let redis = RedisConfig::from(config);
        let connector = RedisConnector::new(&redis)?;
        let pool = Pool::new(format!("redis:{}", store), connector, &redis.pool)?;

        info!(
            "✓ Redis backend initialized for store [{}]: {}:{} (max {} connections)",
            store, redis.host, redis.port, redis.pool.max_connections
        );

        Ok(Arc::new(PooledBackend::new("redis", pool)))
    }
}

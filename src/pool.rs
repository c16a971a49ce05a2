//! Bounded connection pool with create / health-check / close hooks.
//!
//! A [`Pool`] owns idle connections for exactly one store configuration.
//! Connections are created lazily on demand up to `max_connections`; an
//! acquire beyond the bound waits until one is released, or fails with
//! `Error::PoolExhausted` once the configured wait timeout elapses.
//!
//! Borrowed connections come back as [`PooledConnection`] guards. Dropping
//! the guard releases the connection, which makes the return unconditional:
//! it happens on success, on error and when the borrowing task is cancelled.
//! A guard marked broken (after a transport fault) is closed and discarded
//! instead of going back to the idle set. Idle connections are heartbeat
//! checked before they are handed out again; a failed check closes the
//! connection and the pool transparently creates a replacement.
//!
//! ```ignore
//! let pool = Pool::new("redis", RedisConnector::new(&config)?, &config.pool)?;
//! let mut conn = pool.acquire().await?;
//! conn.ping().await?;
//! drop(conn); // back to the idle set
//! ```

use crate::config::PoolConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use deadpool::managed::{self, Metrics, Object, PoolError, RecycleError, RecycleResult, TimeoutType};
use deadpool::Runtime;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// Lifecycle hooks for the connections of one pool.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Send + 'static;

    /// Open a new connection.
    ///
    /// # Errors
    /// Returns `Err` (typically `Error::ConnectionFault`) if the backend is unreachable.
    async fn create(&self) -> Result<Self::Connection>;

    /// Heartbeat an idle connection before it is reused.
    async fn health_check(&self, conn: &mut Self::Connection) -> bool;

    /// Release backend resources of a connection that is being discarded.
    fn close(&self, _conn: &mut Self::Connection) {}
}

/// deadpool manager delegating to a [`ConnectionFactory`].
struct Lifecycle<F> {
    factory: Arc<F>,
    label: String,
}

impl<F: ConnectionFactory> managed::Manager for Lifecycle<F> {
    type Type = F::Connection;
    type Error = Error;

    async fn create(&self) -> Result<F::Connection> {
        let conn = self.factory.create().await?;
        debug!("✓ Pool [{}] opened a new connection", self.label);
        Ok(conn)
    }

    async fn recycle(&self, conn: &mut F::Connection, _: &Metrics) -> RecycleResult<Error> {
        if self.factory.health_check(conn).await {
            return Ok(());
        }

        warn!(
            "⚠ Pool [{}] heartbeat failed, discarding idle connection",
            self.label
        );
        self.factory.close(conn);
        Err(RecycleError::Message("heartbeat failed".into()))
    }
}

/// Pool occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    /// Configured bound.
    pub max_size: usize,
    /// Connections currently existing (idle + borrowed).
    pub size: usize,
    /// Idle connections ready to be borrowed.
    pub idle: usize,
    /// Acquires currently waiting for a connection.
    pub waiting: usize,
}

impl PoolStats {
    /// Connections currently checked out.
    pub fn borrowed(&self) -> usize {
        self.size.saturating_sub(self.idle)
    }
}

/// Bounded pool of connections produced by `F`.
pub struct Pool<F: ConnectionFactory> {
    inner: managed::Pool<Lifecycle<F>>,
    factory: Arc<F>,
    label: Arc<str>,
}

impl<F: ConnectionFactory> Clone for Pool<F> {
    fn clone(&self) -> Self {
        Pool {
            inner: self.inner.clone(),
            factory: Arc::clone(&self.factory),
            label: Arc::clone(&self.label),
        }
    }
}

impl<F: ConnectionFactory> Pool<F> {
    /// Create an empty pool. No connection is opened until the first acquire.
    ///
    /// # Errors
    /// Returns `Error::ConfigError` if `max_connections` is zero.
    pub fn new(label: impl Into<String>, factory: F, config: &PoolConfig) -> Result<Self> {
        let label: String = label.into();
        if config.max_connections == 0 {
            return Err(Error::ConfigError(format!(
                "pool [{}]: max_connections must be at least 1",
                label
            )));
        }

        let factory = Arc::new(factory);
        let manager = Lifecycle {
            factory: Arc::clone(&factory),
            label: label.clone(),
        };

        let inner = managed::Pool::builder(manager)
            .max_size(config.max_connections)
            .wait_timeout(config.wait_timeout())
            .create_timeout(config.create_timeout())
            .recycle_timeout(config.recycle_timeout())
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| Error::ConfigError(format!("pool [{}]: {}", label, e)))?;

        info!(
            "✓ Pool [{}] created (max connections: {})",
            label, config.max_connections
        );

        Ok(Pool {
            inner,
            factory,
            label: label.into(),
        })
    }

    /// Borrow a connection, creating one if none is idle and the bound allows.
    ///
    /// # Errors
    /// - `Error::PoolExhausted`: no connection freed up within the wait timeout
    /// - `Error::ConnectionFault`: creating a connection failed, or the pool is shut down
    pub async fn acquire(&self) -> Result<PooledConnection<F>> {
        match self.inner.get().await {
            Ok(object) => Ok(PooledConnection {
                object: Some(object),
                factory: Arc::clone(&self.factory),
                broken: false,
            }),
            Err(PoolError::Timeout(TimeoutType::Wait)) => {
                warn!("⚠ Pool [{}] exhausted", self.label);
                Err(Error::PoolExhausted(format!(
                    "no connection available in pool [{}]",
                    self.label
                )))
            }
            Err(PoolError::Timeout(kind)) => Err(Error::ConnectionFault(format!(
                "pool [{}]: {:?} timeout",
                self.label, kind
            ))),
            Err(PoolError::Backend(e)) => Err(e),
            Err(PoolError::Closed) => Err(Error::ConnectionFault(format!(
                "pool [{}] closed",
                self.label
            ))),
            Err(e) => Err(Error::ConnectionFault(format!(
                "pool [{}]: {}",
                self.label, e
            ))),
        }
    }

    /// Return a connection. Equivalent to dropping the guard.
    pub fn release(&self, conn: PooledConnection<F>) {
        drop(conn);
    }

    pub fn status(&self) -> PoolStats {
        let status = self.inner.status();
        PoolStats {
            max_size: status.max_size,
            size: status.size,
            idle: status.available as usize,
            waiting: status.waiting,
        }
    }

    /// Close the pool: idle connections are dropped and every pending or
    /// future acquire fails.
    pub fn shutdown(&self) {
        info!("Pool [{}] shutting down", self.label);
        self.inner.close();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

/// A connection checked out of a [`Pool`].
///
/// Exclusively owned by one borrower. Dropping it returns the connection,
/// unless it was marked broken, in which case it is closed and discarded.
pub struct PooledConnection<F: ConnectionFactory> {
    object: Option<Object<Lifecycle<F>>>,
    factory: Arc<F>,
    broken: bool,
}

impl<F: ConnectionFactory> PooledConnection<F> {
    /// Flag the connection so it is discarded instead of reused.
    pub fn mark_broken(&mut self) {
        self.broken = true;
    }

    pub fn is_broken(&self) -> bool {
        self.broken
    }
}

impl<F: ConnectionFactory> Deref for PooledConnection<F> {
    type Target = F::Connection;

    fn deref(&self) -> &Self::Target {
        self.object
            .as_ref()
            .expect("pooled connection is only taken on drop")
    }
}

impl<F: ConnectionFactory> DerefMut for PooledConnection<F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.object
            .as_mut()
            .expect("pooled connection is only taken on drop")
    }
}

impl<F: ConnectionFactory> Drop for PooledConnection<F> {
    fn drop(&mut self) {
        let Some(object) = self.object.take() else {
            return;
        };

        if self.broken {
            let mut conn = Object::take(object);
            self.factory.close(&mut conn);
            warn!("⚠ Discarded broken pooled connection");
        }
    }
}

//! # tagged-cache
//!
//! A tag-aware caching layer over interchangeable storage backends.
//!
//! ## Features
//!
//! - **Uniform operations:** has / get / set / delete / inc / dec / pull / remember
//! - **Tag invalidation:** group keys under tags and clear them in one call
//! - **Bounded pooling:** networked backends share a per-store connection pool
//! - **Unit-of-work scoping:** one borrowed connection per logical operation,
//!   returned on drop, even on error or cancellation
//! - **Fault containment:** the [`Enforcer`] policy layer turns backend outages
//!   into cache misses and reports them
//!
//! ## Layers
//!
//! | Layer | Faults | Use for |
//! |-------|--------|---------|
//! | [`Enforcer`] | contained, reported | application code |
//! | [`UnitOfWork`] / [`TagSet`] | returned as `Err` | explicit control |
//! | [`backend::BackendConnection`] | returned as `Err` | custom backends |
//!
//! ## Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use tagged_cache::{CacheConfig, StoreManager, Ttl};
//! use tagged_cache::config::StoreConfig;
//!
//! # #[tokio::main]
//! # async fn main() -> tagged_cache::Result<()> {
//! let config = CacheConfig::new("main")
//!     .with_store("main", StoreConfig::new("memory").with_prefix("app:"));
//! let manager = Arc::new(StoreManager::new(config));
//!
//! let mut work = manager.begin("")?;
//! work.tag(["users"]).set("user:1", &"alice", Ttl::Default).await?;
//! assert_eq!(work.tag_items("users").await?, vec!["app:user:1".to_string()]);
//!
//! work.tag(["users"]).clear().await?;
//! assert!(!work.has("user:1").await?);
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod config;
pub mod driver;
pub mod enforcer;
pub mod error;
pub mod key;
pub mod manager;
pub mod observability;
pub mod pool;
pub mod serialization;
pub mod tag;
pub mod ttl;

// Re-exports for convenience
pub use backend::{BackendConnection, BackendFactory, CacheBackend};
pub use config::{CacheConfig, PoolConfig, StoreConfig};
pub use driver::{Driver, UnitOfWork};
pub use enforcer::{Enforcer, DEFAULT_EXPIRE, DEFAULT_TAG};
pub use error::{Error, Result};
pub use manager::StoreManager;
pub use observability::{FaultRecord, FaultReporter};
pub use pool::{ConnectionFactory, Pool, PoolStats, PooledConnection};
pub use tag::TagSet;
pub use ttl::Ttl;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

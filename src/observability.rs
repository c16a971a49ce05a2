//! Fault reporting and hit/miss hooks for the policy layer.
//!
//! [`Enforcer`](crate::Enforcer) never lets a backend fault reach its caller.
//! Instead every contained fault is handed, exactly once, to a
//! [`FaultReporter`] as a structured [`FaultRecord`].
//!
//! Implement the trait to forward faults to your monitoring system:
//!
//! ```
//! use tagged_cache::observability::{FaultRecord, FaultReporter};
//!
//! struct Alerting;
//!
//! impl FaultReporter for Alerting {
//!     fn report(&self, record: &FaultRecord) {
//!         // counter!("cache_faults", "op" => record.operation).increment(1);
//!         eprintln!("{} {} failed: {}", record.operation, record.key, record.detail);
//!     }
//! }
//! ```
//!
//! Default behavior uses [`LogReporter`], which logs via the `log` crate.

use crate::error::Error;
use std::fmt;
use std::time::Duration;

/// A fault contained by the policy layer.
#[derive(Clone, Debug)]
pub struct FaultRecord {
    /// Operation name (`get`, `set`, `delete`, `has`, `clear`).
    pub operation: &'static str,
    /// Logical key, or the tag list for `clear`.
    pub key: String,
    /// Store the operation ran against.
    pub store: String,
    /// The underlying fault.
    pub detail: Error,
}

impl FaultRecord {
    pub fn new(
        operation: &'static str,
        key: impl Into<String>,
        store: impl Into<String>,
        detail: Error,
    ) -> Self {
        FaultRecord {
            operation,
            key: key.into(),
            store: store.into(),
            detail,
        }
    }
}

impl fmt::Display for FaultRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cache {} [{}] on store [{}]: {}",
            self.operation, self.key, self.store, self.detail
        )
    }
}

/// Sink for contained faults.
pub trait FaultReporter: Send + Sync {
    /// Report a contained fault. Called once per fault.
    fn report(&self, record: &FaultRecord);

    /// Record a cache hit.
    fn record_hit(&self, key: &str, duration: Duration) {
        debug!("Cache HIT: {} took {:?}", key, duration);
    }

    /// Record a cache miss.
    fn record_miss(&self, key: &str, duration: Duration) {
        debug!("Cache MISS: {} took {:?}", key, duration);
    }
}

/// Logs faults at `error!` level.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogReporter;

impl FaultReporter for LogReporter {
    fn report(&self, record: &FaultRecord) {
        error!("✗ {}", record);
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoOpReporter;

impl FaultReporter for NoOpReporter {
    fn report(&self, _record: &FaultRecord) {}
    fn record_hit(&self, _key: &str, _duration: Duration) {}
    fn record_miss(&self, _key: &str, _duration: Duration) {}
}

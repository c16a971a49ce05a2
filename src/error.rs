//! Error types for the tagged cache.

use std::fmt;

/// Result type for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the tagged cache.
///
/// The pool, backend, driver and manager layers return these explicitly.
/// Only [`Enforcer`](crate::Enforcer) swallows them (after reporting) and
/// substitutes a safe default.
#[derive(Debug, Clone)]
pub enum Error {
    /// No pooled connection became available within the configured wait bound.
    ///
    /// **Recovery:** Retry after backoff.
    PoolExhausted(String),

    /// Transport-level failure on a borrowed connection.
    ///
    /// The faulting connection is discarded instead of being returned to
    /// the pool, so the next borrow gets a fresh one.
    ///
    /// **Recovery:** Retry the operation.
    ConnectionFault(String),

    /// No store configuration exists for the resolved store name.
    UnknownStore(String),

    /// The store's configured backend type has no registered implementation.
    UnsupportedBackend(String),

    /// Malformed key, value, ttl or tag input.
    InvalidArgument(String),

    /// Serialization failed when encoding a value for the backend.
    SerializationError(String),

    /// Deserialization failed when decoding backend bytes.
    DeserializationError(String),

    /// Stored bytes are not a cache envelope (bad magic).
    ///
    /// **Recovery:** Evict the entry and recompute.
    InvalidCacheEntry(String),

    /// Schema version mismatch between code and cached data.
    VersionMismatch {
        /// Expected schema version (from compiled code)
        expected: u32,
        /// Found schema version (from cached entry)
        found: u32,
    },

    /// The backend rejected a command (wrong value type, protocol error).
    BackendError(String),

    /// Invalid configuration detected while building a pool or backend.
    ///
    /// **Recovery:** Fix configuration and restart.
    ConfigError(String),

    /// Generic error with custom message.
    Other(String),
}

impl Error {
    /// Whether retrying the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::PoolExhausted(_) | Error::ConnectionFault(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::PoolExhausted(msg) => write!(f, "Pool exhausted: {}", msg),
            Error::ConnectionFault(msg) => write!(f, "Connection fault: {}", msg),
            Error::UnknownStore(name) => write!(f, "Store [{}] not found", name),
            Error::UnsupportedBackend(kind) => write!(f, "Driver [{}] not supported", kind),
            Error::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            Error::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Error::DeserializationError(msg) => write!(f, "Deserialization error: {}", msg),
            Error::InvalidCacheEntry(msg) => write!(f, "Invalid cache entry: {}", msg),
            Error::VersionMismatch { expected, found } => {
                write!(
                    f,
                    "Cache version mismatch: expected {}, found {}",
                    expected, found
                )
            }
            Error::BackendError(msg) => write!(f, "Backend error: {}", msg),
            Error::ConfigError(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::ConfigError(e.to_string())
        } else if e.is_syntax() || e.is_eof() {
            Error::ConfigError(format!("malformed config: {}", e))
        } else {
            Error::SerializationError(e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::ConnectionFault(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(feature = "redis")]
impl From<redis::RedisError> for Error {
    fn from(e: redis::RedisError) -> Self {
        if e.is_io_error() || e.is_connection_dropped() || e.is_timeout() {
            Error::ConnectionFault(format!("Redis error: {}", e))
        } else {
            Error::BackendError(format!("Redis error: {}", e))
        }
    }
}

//! Value codec: postcard payloads inside a versioned envelope.
//!
//! Backends only ever see opaque bytes. Every value written through a
//! [`UnitOfWork`](crate::UnitOfWork) is wrapped as:
//!
//! ```text
//! ┌─────────────────┬─────────────────┬──────────────────────────┐
//! │  MAGIC (4 bytes)│VERSION (varint) │POSTCARD PAYLOAD (N bytes)│
//! └─────────────────┴─────────────────┴──────────────────────────┘
//!   "TAGC"              u32                postcard::to_allocvec(T)
//! ```
//!
//! Counters are the exception: `inc`/`dec` operate on the backend's native
//! integer representation (ASCII decimal), which [`decode_counter`] reads.
//!
//! ```rust
//! use tagged_cache::serialization::{encode, decode};
//!
//! # fn main() -> tagged_cache::Result<()> {
//! let bytes = encode(&vec![1u32, 2, 3])?;
//! let back: Vec<u32> = decode(&bytes)?;
//! assert_eq!(back, vec![1, 2, 3]);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Magic header identifying values written by this crate.
pub const VALUE_MAGIC: [u8; 4] = *b"TAGC";

/// Current schema version.
///
/// Increment when cached types change shape; entries written with another
/// version are rejected with `Error::VersionMismatch` and treated as misses
/// by the policy layer.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Versioned envelope around a cached value.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ValueEnvelope<T> {
    pub magic: [u8; 4],
    pub version: u32,
    pub payload: T,
}

impl<T> ValueEnvelope<T> {
    pub fn new(payload: T) -> Self {
        Self {
            magic: VALUE_MAGIC,
            version: CURRENT_SCHEMA_VERSION,
            payload,
        }
    }
}

/// Encode a value for storage.
///
/// # Errors
///
/// Returns `Error::SerializationError` if postcard cannot encode the value.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let envelope = ValueEnvelope::new(value);
    postcard::to_allocvec(&envelope).map_err(|e| {
        error!("Cache value serialization failed: {}", e);
        Error::SerializationError(e.to_string())
    })
}

/// Decode stored bytes, validating magic and schema version.
///
/// # Errors
///
/// - `Error::InvalidCacheEntry`: bytes were not written by [`encode`]
/// - `Error::VersionMismatch`: written by another schema version
/// - `Error::DeserializationError`: corrupted payload
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    if bytes.len() < VALUE_MAGIC.len() || bytes[..VALUE_MAGIC.len()] != VALUE_MAGIC {
        warn!("Invalid cache entry: missing {:?} magic", VALUE_MAGIC);
        return Err(Error::InvalidCacheEntry(format!(
            "expected magic {:?}",
            VALUE_MAGIC
        )));
    }

    let envelope: ValueEnvelope<T> = postcard::from_bytes(bytes).map_err(|e| {
        error!("Cache value deserialization failed: {}", e);
        Error::DeserializationError(e.to_string())
    })?;

    if envelope.version != CURRENT_SCHEMA_VERSION {
        warn!(
            "Cache version mismatch: expected {}, got {}",
            CURRENT_SCHEMA_VERSION, envelope.version
        );
        return Err(Error::VersionMismatch {
            expected: CURRENT_SCHEMA_VERSION,
            found: envelope.version,
        });
    }

    Ok(envelope.payload)
}

/// Read a counter maintained by `inc`/`dec`.
///
/// # Errors
///
/// Returns `Error::DeserializationError` if the bytes are not a decimal integer.
pub fn decode_counter(bytes: &[u8]) -> Result<i64> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| Error::DeserializationError("value is not an integer".to_string()))
}

/// Whether a value serializes to null (`None`, `()`, unit structs).
///
/// A stored null is not a hit: readers that fall back to a default treat it
/// as a miss.
pub fn is_null<T: Serialize + ?Sized>(value: &T) -> bool {
    matches!(serde_json::to_value(value), Ok(serde_json::Value::Null))
}

/// Whether a value is "nothing worth caching": null, or an empty list/map.
///
/// Values that cannot be represented as JSON are never blank.
pub fn is_blank<T: Serialize + ?Sized>(value: &T) -> bool {
    match serde_json::to_value(value) {
        Ok(serde_json::Value::Null) => true,
        Ok(serde_json::Value::Array(items)) => items.is_empty(),
        Ok(serde_json::Value::Object(fields)) => fields.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Serialize, Deserialize, PartialEq, Debug, Clone)]
    struct Profile {
        id: u64,
        name: String,
        active: bool,
    }

    #[test]
    fn test_roundtrip() {
        let profile = Profile {
            id: 123,
            name: "test".to_string(),
            active: true,
        };

        let bytes = encode(&profile).unwrap();
        let back: Profile = decode(&bytes).unwrap();

        assert_eq!(profile, back);
        assert_eq!(&bytes[0..4], b"TAGC");
    }

    #[test]
    fn test_foreign_bytes_rejected() {
        let result: Result<Profile> = decode(b"42");
        assert!(matches!(result, Err(Error::InvalidCacheEntry(_))));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let mut envelope = ValueEnvelope::new(7u32);
        envelope.version = 999;

        let bytes = postcard::to_allocvec(&envelope).unwrap();
        match decode::<u32>(&bytes) {
            Err(Error::VersionMismatch { expected, found }) => {
                assert_eq!(expected, CURRENT_SCHEMA_VERSION);
                assert_eq!(found, 999);
            }
            other => panic!("Expected VersionMismatch, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_payload_rejected() {
        let mut bytes = encode(&"a fairly long string payload".to_string()).unwrap();
        bytes.truncate(bytes.len() / 2);

        let result: Result<String> = decode(&bytes);
        assert!(matches!(result, Err(Error::DeserializationError(_))));
    }

    #[test]
    fn test_decode_counter() {
        assert_eq!(decode_counter(b"42").unwrap(), 42);
        assert_eq!(decode_counter(b"-3").unwrap(), -3);
        assert!(decode_counter(b"abc").is_err());
    }

    #[test]
    fn test_is_null() {
        assert!(is_null(&Option::<u32>::None));
        assert!(is_null(&()));
        assert!(!is_null(&Some(0u32)));
        assert!(!is_null(&Vec::<u32>::new()));
        assert!(!is_null(&""));
    }

    #[test]
    fn test_is_blank() {
        assert!(is_blank(&Option::<u32>::None));
        assert!(is_blank(&Vec::<u32>::new()));
        assert!(is_blank(&HashMap::<String, u32>::new()));
        assert!(is_blank(&()));

        assert!(!is_blank(&0u32));
        assert!(!is_blank(&""));
        assert!(!is_blank(&false));
        assert!(!is_blank(&vec![1]));
        assert!(!is_blank(&Some(1)));
    }
}

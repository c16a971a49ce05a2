//! Entry expiry.
//!
//! A write can ask for three different things, and they must not collapse
//! into each other:
//!
//! | Value | Meaning |
//! |-------|---------|
//! | `Ttl::Default` | use the store's configured `expire` |
//! | `Ttl::Never` (or `0`) | permanent entry |
//! | `Ttl::After(d)` | expire after `d` |
//!
//! ```
//! use tagged_cache::Ttl;
//! use std::time::Duration;
//!
//! assert_eq!(Ttl::from(0u64), Ttl::Never);
//! assert_eq!(Ttl::from(None::<u64>), Ttl::Default);
//! assert_eq!(Ttl::from(Some(60u64)), Ttl::After(Duration::from_secs(60)));
//! ```

use std::time::Duration;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Ttl {
    /// Use the store's configured default expiry.
    #[default]
    Default,
    /// Never expire.
    Never,
    /// Expire after the given duration.
    After(Duration),
}

impl Ttl {
    /// Resolve against a store default (in seconds, 0 = never).
    ///
    /// Returns `None` for a permanent entry.
    pub fn resolve(self, store_default: u64) -> Option<Duration> {
        match self {
            Ttl::Default => Ttl::from(store_default).resolve(0),
            Ttl::Never => None,
            Ttl::After(d) if d.is_zero() => None,
            Ttl::After(d) => Some(d),
        }
    }
}

impl From<u64> for Ttl {
    fn from(seconds: u64) -> Self {
        if seconds == 0 {
            Ttl::Never
        } else {
            Ttl::After(Duration::from_secs(seconds))
        }
    }
}

impl From<Option<u64>> for Ttl {
    fn from(seconds: Option<u64>) -> Self {
        seconds.map_or(Ttl::Default, Ttl::from)
    }
}

impl From<Duration> for Ttl {
    fn from(d: Duration) -> Self {
        if d.is_zero() {
            Ttl::Never
        } else {
            Ttl::After(d)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_uses_store_expire() {
        assert_eq!(Ttl::Default.resolve(300), Some(Duration::from_secs(300)));
        assert_eq!(Ttl::Default.resolve(0), None);
    }

    #[test]
    fn test_zero_means_never() {
        assert_eq!(Ttl::from(0u64).resolve(300), None);
        assert_eq!(Ttl::from(Duration::ZERO).resolve(300), None);
        assert_eq!(Ttl::After(Duration::ZERO).resolve(300), None);
    }

    #[test]
    fn test_explicit_ttl_wins() {
        assert_eq!(Ttl::from(5u64).resolve(300), Some(Duration::from_secs(5)));
    }
}

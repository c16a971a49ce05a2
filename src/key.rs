//! Key namespacing.
//!
//! Every logical key is turned into `<prefix><key>` before it reaches the
//! backend. Tag membership sets live under `<prefix><tag_prefix><tag>`.

use crate::config::StoreConfig;
use crate::error::{Error, Result};

/// Key prefixes of one store.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeySpace {
    prefix: String,
    tag_prefix: String,
}

impl KeySpace {
    pub fn new(prefix: impl Into<String>, tag_prefix: impl Into<String>) -> Self {
        KeySpace {
            prefix: prefix.into(),
            tag_prefix: tag_prefix.into(),
        }
    }

    /// Backend key for a logical key.
    pub fn cache_key(&self, name: &str) -> String {
        format!("{}{}", self.prefix, name)
    }

    /// Logical key of a tag's membership set (not yet prefixed).
    pub fn tag_key(&self, tag: &str) -> String {
        format!("{}{}", self.tag_prefix, tag)
    }

    /// Backend key of a tag's membership set.
    pub fn tag_set_key(&self, tag: &str) -> String {
        self.cache_key(&self.tag_key(tag))
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }
}

impl From<&StoreConfig> for KeySpace {
    fn from(config: &StoreConfig) -> Self {
        KeySpace::new(config.prefix.clone(), config.tag_prefix.clone())
    }
}

/// Reject empty keys.
pub fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument("cache key must not be empty".to_string()));
    }
    Ok(())
}

/// Reject empty tag names.
pub fn validate_tag(tag: &str) -> Result<()> {
    if tag.is_empty() {
        return Err(Error::InvalidArgument("tag name must not be empty".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_key_prefixing() {
        let keys = KeySpace::new("app:", "tag:");
        assert_eq!(keys.cache_key("user:1"), "app:user:1");
    }

    #[test]
    fn test_tag_set_key_goes_through_key_prefix() {
        let keys = KeySpace::new("app:", "tag:");
        assert_eq!(keys.tag_key("users"), "tag:users");
        assert_eq!(keys.tag_set_key("users"), "app:tag:users");
    }

    #[test]
    fn test_keyspace_from_store_config() {
        let config = StoreConfig::default().with_prefix("p_");
        let keys = KeySpace::from(&config);
        assert_eq!(keys.cache_key("x"), "p_x");
        assert_eq!(keys.tag_set_key("t"), "p_tag:t");
    }

    #[test]
    fn test_validation() {
        assert!(validate_key("k").is_ok());
        assert!(matches!(validate_key(""), Err(Error::InvalidArgument(_))));
        assert!(matches!(validate_tag(""), Err(Error::InvalidArgument(_))));
    }
}

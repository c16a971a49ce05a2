//! Tag sets: group keys under tag names for bulk invalidation.
//!
//! Every tag owns a membership set stored in the backend under
//! `<prefix><tag_prefix><tag>`. Its members are the backend keys of the
//! entries written through the tag set. Members may outlive their entries
//! (expiry is not tracked), so clearing a tag tolerates stale members.

use crate::driver::UnitOfWork;
use crate::error::Result;
use crate::key::validate_tag;
use crate::ttl::Ttl;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;

/// A fixed list of tag names bound to a unit of work.
///
/// Obtained from [`UnitOfWork::tag`].
pub struct TagSet<'w> {
    tags: Vec<String>,
    work: &'w mut UnitOfWork,
}

impl<'w> TagSet<'w> {
    pub(crate) fn new(tags: Vec<String>, work: &'w mut UnitOfWork) -> Self {
        TagSet { tags, work }
    }

    pub fn tags(&self) -> &[String] {
        &self.tags
    }

    fn validate(&self) -> Result<()> {
        self.tags.iter().try_for_each(|tag| validate_tag(tag))
    }

    /// Write a value, then record `key` under every tag.
    ///
    /// Tagging is skipped when the write is not accepted, so a tag never
    /// references a write that did not happen.
    pub async fn set<T: Serialize + ?Sized>(&mut self, key: &str, value: &T, ttl: Ttl) -> Result<bool> {
        self.validate()?;
        if !self.work.set(key, value, ttl).await? {
            debug!("Write of [{}] not accepted, skipping tags", key);
            return Ok(false);
        }
        self.append(key).await?;
        Ok(true)
    }

    /// Apply [`set`](Self::set) to each pair in iteration order.
    ///
    /// Returns `Ok(false)` at the first rejected write; earlier writes stay.
    pub async fn set_multiple<K, V, I>(&mut self, items: I, ttl: Ttl) -> Result<bool>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Serialize,
    {
        for (key, value) in items {
            if !self.set(key.as_ref(), &value, ttl).await? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Record the backend key of `key` under every tag.
    pub async fn append(&mut self, key: &str) -> Result<()> {
        self.validate()?;
        let member = self.work.driver().keys().cache_key(key);
        for tag in &self.tags {
            let name = self.work.driver().keys().tag_key(tag);
            self.work.append(&name, &member).await?;
        }
        Ok(())
    }

    /// Get-or-populate `key`, then tag it whether it was cached or computed.
    pub async fn remember<T, F, Fut>(&mut self, key: &str, compute: F, ttl: Ttl) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let value = self.work.remember(key, compute, ttl).await?;
        self.append(key).await?;
        Ok(value)
    }

    /// Delete every entry recorded under each tag, then the membership sets.
    ///
    /// Members whose entries are already gone are not an error.
    pub async fn clear(&mut self) -> Result<bool> {
        self.validate()?;
        for tag in &self.tags {
            let members = self.work.tag_items(tag).await?;
            debug!("Clearing tag [{}] ({} members)", tag, members.len());
            self.work.clear_tag(&members).await?;

            let name = self.work.driver().keys().tag_key(tag);
            self.work.delete(&name).await?;
        }
        Ok(true)
    }
}

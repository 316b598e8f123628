//! In-process summary cache.
//!
//! Entries are owned [`Summary`] values, so every hit hands out an
//! independent copy that callers may mutate freely.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Utc};
use moka::sync::Cache;

use ct_core::{Summary, UserId};

/// Every input that influences a generated summary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SummaryKey {
    pub user_id: UserId,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub filters: String,
    pub options: String,
}

#[derive(Clone)]
pub struct SummaryCache {
    inner: Cache<SummaryKey, Summary>,
}

impl std::fmt::Debug for SummaryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SummaryCache")
            .field("entries", &self.inner.entry_count())
            .finish()
    }
}

impl SummaryCache {
    pub fn new(ttl: StdDuration, capacity: u64) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(capacity)
                .time_to_live(ttl)
                .support_invalidation_closures()
                .build(),
        }
    }

    pub fn get(&self, key: &SummaryKey) -> Option<Summary> {
        self.inner.get(key)
    }

    pub fn insert(&self, key: SummaryKey, summary: &Summary) {
        self.inner.insert(key, summary.clone());
    }

    /// Drops every entry of one user.
    pub fn invalidate_user(&self, user_id: &UserId) {
        let user_id = user_id.clone();
        if let Err(err) = self.inner.invalidate_entries_if(move |key, _| key.user_id == user_id) {
            tracing::warn!(error = %err, "falling back to clearing the whole summary cache");
            self.inner.invalidate_all();
        }
    }
}

#[cfg(test)]
mod tests {
    use ct_core::{EntityType, SummaryItem};

    use super::*;

    fn key(user: &str) -> SummaryKey {
        SummaryKey {
            user_id: UserId::new(user).unwrap(),
            from: DateTime::UNIX_EPOCH,
            to: DateTime::UNIX_EPOCH,
            filters: String::new(),
            options: "aliases".to_string(),
        }
    }

    #[test]
    fn hits_are_independent_copies() {
        let cache = SummaryCache::new(StdDuration::from_secs(60), 10);
        let mut summary =
            Summary::new(key("alice").user_id, DateTime::UNIX_EPOCH, DateTime::UNIX_EPOCH);
        summary.push_item(SummaryItem::new(EntityType::Project, "ct", 60_000));
        cache.insert(key("alice"), &summary);

        let mut first = cache.get(&key("alice")).unwrap();
        first.set_items(EntityType::Project, Vec::new());
        let second = cache.get(&key("alice")).unwrap();
        assert_eq!(second.total_by(EntityType::Project), 60_000);
    }

    #[test]
    fn invalidate_user_keeps_others() {
        let cache = SummaryCache::new(StdDuration::from_secs(60), 10);
        let summary =
            Summary::new(key("alice").user_id, DateTime::UNIX_EPOCH, DateTime::UNIX_EPOCH);
        cache.insert(key("alice"), &summary);
        cache.insert(key("bob"), &summary);

        cache.invalidate_user(&UserId::new("alice").unwrap());
        assert!(cache.get(&key("alice")).is_none());
        assert!(cache.get(&key("bob")).is_some());
    }
}

use std::collections::HashMap;

use time::{Duration, OffsetDateTime};
use tracing::debug;

pub const DEFAULT_TTL: Duration = Duration::minutes(5);

/// A cached value together with when it was stored and how long it stays fresh.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub data: T,
    pub stored_at: OffsetDateTime,
    pub ttl: Duration,
}

impl<T> CacheEntry<T> {
    pub fn is_expired_at(&self, now: OffsetDateTime) -> bool {
        now - self.stored_at > self.ttl
    }
}

/// In-memory keyed cache with per-entry TTL. Expired entries are dropped when
/// they are next read, or in bulk by [`TtlCache::purge_expired_at`].
#[derive(Debug, Clone)]
pub struct TtlCache<T> {
    entries: HashMap<String, CacheEntry<T>>,
    default_ttl: Duration,
}

impl<T> Default for TtlCache<T> {
    fn default() -> Self {
        Self::new(DEFAULT_TTL)
    }
}

impl<T> TtlCache<T> {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
        }
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Whether `key` holds a value that is still fresh, without evicting.
    pub fn is_fresh_at(&self, key: &str, now: OffsetDateTime) -> bool {
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    pub fn insert_at(&mut self, key: &str, data: T, now: OffsetDateTime) {
        let ttl = self.default_ttl;
        self.insert_with_ttl_at(key, data, ttl, now);
    }

    pub fn insert_with_ttl_at(&mut self, key: &str, data: T, ttl: Duration, now: OffsetDateTime) {
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                data,
                stored_at: now,
                ttl,
            },
        );
    }

    /// Mutate a cached value in place, keeping its original timestamp.
    pub fn update(&mut self, key: &str, f: impl FnOnce(&mut T)) {
        if let Some(entry) = self.entries.get_mut(key) {
            f(&mut entry.data);
        }
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired_at(&mut self, now: OffsetDateTime) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired_at(now));
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone> TtlCache<T> {
    pub fn get_at(&mut self, key: &str, now: OffsetDateTime) -> Option<T> {
        let expired = self.entries.get(key)?.is_expired_at(now);
        if expired {
            debug!(key, "Evicting expired cache entry");
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key).map(|entry| entry.data.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn fresh_value_is_served() {
        let now = datetime!(2024-06-01 12:00 UTC);
        let mut cache = TtlCache::default();
        cache.insert_at("entries", vec![1, 2, 3], now);

        assert_eq!(
            cache.get_at("entries", now + Duration::minutes(4)),
            Some(vec![1, 2, 3])
        );
    }

    #[test]
    fn value_at_exact_ttl_is_still_fresh() {
        let now = datetime!(2024-06-01 12:00 UTC);
        let mut cache = TtlCache::default();
        cache.insert_at("entries", 1, now);

        assert_eq!(cache.get_at("entries", now + DEFAULT_TTL), Some(1));
    }

    #[test]
    fn expired_value_is_evicted_on_read() {
        let now = datetime!(2024-06-01 12:00 UTC);
        let mut cache = TtlCache::default();
        cache.insert_at("entries", 1, now);

        let later = now + Duration::minutes(5) + Duration::seconds(1);
        assert!(!cache.is_fresh_at("entries", later));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get_at("entries", later), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn purge_only_removes_expired() {
        let now = datetime!(2024-06-01 12:00 UTC);
        let mut cache = TtlCache::new(Duration::minutes(1));
        cache.insert_at("short", 1, now);
        cache.insert_with_ttl_at("long", 2, Duration::hours(1), now);

        assert_eq!(cache.purge_expired_at(now + Duration::minutes(10)), 1);
        assert_eq!(cache.get_at("long", now + Duration::minutes(10)), Some(2));
    }

    #[test]
    fn update_keeps_timestamp() {
        let now = datetime!(2024-06-01 12:00 UTC);
        let mut cache = TtlCache::default();
        cache.insert_at("entries", vec![1, 2], now);
        cache.update("entries", |values| values.retain(|v| *v != 1));

        assert_eq!(cache.get_at("entries", now), Some(vec![2]));
        assert_eq!(cache.get_at("entries", now + Duration::minutes(6)), None);
    }
}

//! Process-local cache with per-entry expiry, backed by `moka`.
use std::time::{Duration, Instant};

use async_trait::async_trait;
use moka::Expiry;
use moka::future::Cache;

use crate::services::cache::client::{CacheClient, CacheResult};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    ttl: Duration,
}

/// Each entry lives for the TTL it was written with; overwrites restart it.
struct EntryTtl;

impl Expiry<String, Entry> for EntryTtl {
    fn expire_after_create(
        &self,
        _key: &String,
        entry: &Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }

    fn expire_after_update(
        &self,
        _key: &String,
        entry: &Entry,
        _updated_at: Instant,
        _remaining: Option<Duration>,
    ) -> Option<Duration> {
        Some(entry.ttl)
    }
}

/// Bounded by entry count; past `max_entries` the least useful entries are evicted.
#[derive(Clone)]
pub struct MemoryCache {
    entries: Cache<String, Entry>,
    max_entries: u64,
}

impl std::fmt::Debug for MemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryCache")
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

impl MemoryCache {
    pub fn new(max_entries: u64) -> Self {
        let entries = Cache::builder()
            .max_capacity(max_entries)
            .expire_after(EntryTtl)
            .build();
        Self {
            entries,
            max_entries,
        }
    }

    /// Live entries, after pending evictions have been applied.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}

#[async_trait]
impl CacheClient for MemoryCache {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn get_string(&self, key: &str) -> CacheResult<Option<String>> {
        Ok(self.entries.get(key).await.map(|entry| entry.value))
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> CacheResult<()> {
        let entry = Entry {
            value: value.to_string(),
            ttl,
        };
        self.entries.insert(key.to_string(), entry).await;
        Ok(())
    }

    async fn del(&self, key: &str) -> CacheResult<u64> {
        Ok(u64::from(self.entries.remove(key).await.is_some()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_value_until_ttl_elapses() {
        let cache = MemoryCache::new(16);
        cache
            .set_with_ttl("k", "v", Duration::from_millis(50))
            .await
            .unwrap();
        assert_eq!(cache.get_string("k").await.unwrap().as_deref(), Some("v"));

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get_string("k").await.unwrap(), None);
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn entries_keep_their_own_ttl() {
        let cache = MemoryCache::new(16);
        cache.set_with_ttl("short", "1", Duration::from_millis(50)).await.unwrap();
        cache.set_with_ttl("long", "2", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get_string("short").await.unwrap(), None);
        assert_eq!(cache.get_string("long").await.unwrap().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn capacity_bounds_entry_count() {
        let cache = MemoryCache::new(2);
        for key in ["a", "b", "c", "d", "e"] {
            cache.set_with_ttl(key, key, Duration::from_secs(60)).await.unwrap();
        }
        assert!(cache.len().await <= 2);
    }

    #[tokio::test]
    async fn overwrite_replaces_value_and_ttl() {
        let cache = MemoryCache::new(4);
        cache.set_with_ttl("k", "old", Duration::from_millis(50)).await.unwrap();
        cache.set_with_ttl("k", "new", Duration::from_secs(60)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(cache.get_string("k").await.unwrap().as_deref(), Some("new"));
    }

    #[tokio::test]
    async fn del_reports_removed_count() {
        let cache = MemoryCache::new(4);
        cache.set_with_ttl("k", "v", Duration::from_secs(5)).await.unwrap();
        assert_eq!(cache.del("k").await.unwrap(), 1);
        assert_eq!(cache.del("k").await.unwrap(), 0);
    }
}

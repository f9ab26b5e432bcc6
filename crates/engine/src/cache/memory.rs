//! In-memory cache tier built on Moka.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache as MokaCache;
use tracing::debug;

use crate::cache::types::{CacheEntry, CacheStatus};

#[derive(Clone)]
struct Stored {
    entry: Arc<CacheEntry>,
    /// Serialized size, used as the Moka weight.
    weight: u32,
}

/// Size-bounded memory tier. Moka evicts by weight; staleness is still
/// checked per read because the envelope's TTL is authoritative.
#[derive(Clone)]
pub struct MemoryCache {
    cache: MokaCache<String, Stored>,
}

impl MemoryCache {
    pub fn new(max_bytes: u64, ttl: Duration) -> Self {
        let mut builder = MokaCache::builder()
            .weigher(|_k, v: &Stored| v.weight)
            .max_capacity(max_bytes.max(1));
        // zero means expired-on-read, enforced by the envelope check in get
        if !ttl.is_zero() {
            builder = builder.time_to_live(ttl);
        }
        Self {
            cache: builder.build(),
        }
    }

    pub async fn get(&self, key: &str) -> Option<(Arc<CacheEntry>, CacheStatus)> {
        let stored = self.cache.get(key).await?;
        if stored.entry.is_expired() {
            debug!(key, "memory cache entry expired");
            self.cache.invalidate(key).await;
            return Some((stored.entry, CacheStatus::Expired));
        }
        Some((stored.entry, CacheStatus::Hit))
    }

    pub async fn insert(&self, key: String, entry: Arc<CacheEntry>, serialized_len: usize) {
        let weight = u32::try_from(serialized_len).unwrap_or(u32::MAX);
        self.cache.insert(key, Stored { entry, weight }).await;
    }

    pub async fn remove(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }

    pub async fn sweep(&self) {
        self.cache.run_pending_tasks().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::types::epoch_secs;
    use douyin_parser::{StrategyKind, VideoRecord};

    fn entry(ttl_secs: i64) -> Arc<CacheEntry> {
        let record = VideoRecord::new("7345678901234567890", StrategyKind::Api);
        let mut entry = CacheEntry::new(record, Duration::from_secs(3600));
        if ttl_secs < 0 {
            entry.expires_at = epoch_secs().saturating_sub(ttl_secs.unsigned_abs());
        }
        Arc::new(entry)
    }

    #[tokio::test]
    async fn insert_then_hit() {
        let cache = MemoryCache::new(1024 * 1024, Duration::from_secs(60));
        cache.insert("k".to_string(), entry(3600), 256).await;
        cache.sweep().await;

        let (got, status) = cache.get("k").await.unwrap();
        assert_eq!(status, CacheStatus::Hit);
        assert_eq!(got.record.aweme_id, "7345678901234567890");
    }

    #[tokio::test]
    async fn miss_on_unknown_key() {
        let cache = MemoryCache::new(1024, Duration::from_secs(60));
        assert!(cache.get("nope").await.is_none());
    }

    #[tokio::test]
    async fn stale_entry_reports_expired_and_is_removed() {
        let cache = MemoryCache::new(1024 * 1024, Duration::from_secs(60));
        cache.insert("k".to_string(), entry(-10), 256).await;
        cache.sweep().await;

        let (_, status) = cache.get("k").await.unwrap();
        assert_eq!(status, CacheStatus::Expired);

        cache.sweep().await;
        assert!(cache.get("k").await.is_none());
    }

    #[tokio::test]
    async fn clear_empties_the_tier() {
        let cache = MemoryCache::new(1024 * 1024, Duration::from_secs(60));
        cache.insert("a".to_string(), entry(3600), 128).await;
        cache.insert("b".to_string(), entry(3600), 128).await;
        cache.sweep().await;
        assert_eq!(cache.entry_count(), 2);

        cache.clear();
        cache.sweep().await;
        assert_eq!(cache.entry_count(), 0);
    }
}

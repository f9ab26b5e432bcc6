//! Two-tier cache orchestration: moka in front, JSON files behind.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use douyin_parser::VideoRecord;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::file::FileStore;
use crate::cache::memory::MemoryCache;
use crate::cache::types::{CacheConfig, CacheEntry, CacheKey, CacheStats, CacheStatus};
use crate::error::CacheError;

/// Layered record cache. Lookups try the memory tier first and fall back to
/// the file tier, promoting file hits back into memory. Writes land in both
/// tiers. Tier failures degrade to a miss instead of failing the caller.
pub struct CacheManager {
    memory: MemoryCache,
    file: Option<FileStore>,
    ttl: Duration,
    enabled: bool,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CacheManager {
    pub fn new(config: &CacheConfig) -> Self {
        let file = if config.enabled {
            match resolve_dir(config) {
                Some(dir) => {
                    debug!(dir = %dir.display(), "file cache tier enabled");
                    Some(FileStore::new(dir))
                }
                None => {
                    warn!("no cache directory available, running memory-only");
                    None
                }
            }
        } else {
            None
        };

        Self {
            memory: MemoryCache::new(config.max_memory_bytes, config.ttl),
            file,
            ttl: config.ttl,
            enabled: config.enabled,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Looks a record up across both tiers.
    pub async fn get(&self, key: &CacheKey) -> (Option<VideoRecord>, CacheStatus) {
        if !self.enabled {
            return (None, CacheStatus::Miss);
        }

        match self.memory.get(key.as_str()).await {
            Some((entry, CacheStatus::Hit)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return (Some(entry.record.clone()), CacheStatus::Hit);
            }
            Some((_, _)) => {
                // memory copy expired; the file copy shares the deadline
                self.evictions.fetch_add(1, Ordering::Relaxed);
                if let Some(file) = &self.file {
                    if let Err(e) = file.remove(key).await {
                        warn!(key = key.as_str(), error = %e, "failed to drop expired cache file");
                    }
                }
                self.misses.fetch_add(1, Ordering::Relaxed);
                return (None, CacheStatus::Expired);
            }
            None => {}
        }

        if let Some(file) = &self.file {
            match file.get(key).await {
                Ok(Some((entry, CacheStatus::Hit))) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    self.promote(key, &entry).await;
                    return (Some(entry.record), CacheStatus::Hit);
                }
                Ok(Some((_, _))) => {
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    return (None, CacheStatus::Expired);
                }
                Ok(None) => {}
                Err(e) => {
                    warn!(key = key.as_str(), error = %e, "file cache lookup failed");
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        (None, CacheStatus::Miss)
    }

    /// Stores a record in both tiers. Failures are logged, never surfaced;
    /// a broken cache must not fail a successful parse.
    pub async fn put(&self, key: &CacheKey, record: &VideoRecord) {
        if !self.enabled {
            return;
        }

        let entry = CacheEntry::new(record.clone(), self.ttl);
        let bytes = match serde_json::to_vec(&entry) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(key = key.as_str(), error = %e, "failed to serialize cache entry");
                return;
            }
        };

        self.memory
            .insert(key.as_str().to_string(), Arc::new(entry), bytes.len())
            .await;

        if let Some(file) = &self.file {
            if let Err(e) = file.put_bytes(key, &bytes).await {
                warn!(key = key.as_str(), error = %e, "failed to write cache file");
            }
        }
    }

    async fn promote(&self, key: &CacheKey, entry: &CacheEntry) {
        let weight = serde_json::to_vec(entry).map(|b| b.len()).unwrap_or(0);
        self.memory
            .insert(key.as_str().to_string(), Arc::new(entry.clone()), weight)
            .await;
        debug!(key = key.as_str(), "promoted cache entry to memory tier");
    }

    /// Drops every cached record from both tiers. Returns the number of
    /// file entries removed.
    pub async fn clear(&self) -> Result<u64, CacheError> {
        self.memory.clear();
        match &self.file {
            Some(file) => file.clear().await,
            None => Ok(0),
        }
    }

    /// Evicts expired entries from both tiers.
    pub async fn sweep(&self) {
        self.memory.sweep().await;
        if let Some(file) = &self.file {
            match file.sweep().await {
                Ok(removed) => {
                    self.evictions.fetch_add(removed, Ordering::Relaxed);
                }
                Err(e) => warn!(error = %e, "file cache sweep failed"),
            }
        }
    }

    pub async fn stats(&self) -> CacheStats {
        self.memory.sweep().await;
        let file_entries = match &self.file {
            Some(file) => file.entry_count().await,
            None => 0,
        };
        CacheStats {
            memory_entries: self.memory.entry_count(),
            file_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    /// Periodic sweep of both tiers. The caller owns the handle and aborts
    /// it on shutdown.
    pub fn spawn_maintenance(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                manager.sweep().await;
            }
        })
    }
}

fn resolve_dir(config: &CacheConfig) -> Option<std::path::PathBuf> {
    match &config.dir {
        Some(dir) => Some(dir.clone()),
        None => dirs::cache_dir().map(|d| d.join("aweme")),
    }
}

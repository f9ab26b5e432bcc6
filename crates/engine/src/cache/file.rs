//! File-backed cache tier: one JSON envelope per entry under the cache dir.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::fs;
use tracing::{debug, warn};

use crate::cache::types::{CacheEntry, CacheKey, CacheResult, CacheStatus};

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    initialized: Arc<AtomicBool>,
}

impl FileStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            initialized: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn dir(&self) -> &std::path::Path {
        &self.dir
    }

    /// Racing callers may both hit `create_dir_all`; it is idempotent.
    async fn ensure_initialized(&self) -> std::io::Result<()> {
        if !self.initialized.load(Ordering::Acquire) {
            fs::create_dir_all(&self.dir).await?;
            self.initialized.store(true, Ordering::Release);
        }
        Ok(())
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(key.filename())
    }

    pub async fn get(&self, key: &CacheKey) -> CacheResult<Option<(CacheEntry, CacheStatus)>> {
        self.ensure_initialized().await?;
        let path = self.path_for(key);

        if !fs::try_exists(&path).await? {
            return Ok(None);
        }

        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read cache file");
                return Ok(None);
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache file, removing");
                let _ = fs::remove_file(&path).await;
                return Ok(None);
            }
        };

        if entry.is_expired() {
            debug!(path = %path.display(), "cache file expired, removing");
            let _ = fs::remove_file(&path).await;
            return Ok(Some((entry, CacheStatus::Expired)));
        }

        Ok(Some((entry, CacheStatus::Hit)))
    }

    /// Writes pre-serialized envelope bytes. The manager serializes once and
    /// shares the buffer with the memory tier's weigher.
    pub async fn put_bytes(&self, key: &CacheKey, bytes: &[u8]) -> CacheResult<()> {
        self.ensure_initialized().await?;
        fs::write(self.path_for(key), bytes).await?;
        Ok(())
    }

    pub async fn remove(&self, key: &CacheKey) -> CacheResult<()> {
        let path = self.path_for(key);
        if fs::try_exists(&path).await? {
            fs::remove_file(&path).await?;
        }
        Ok(())
    }

    /// Removes every entry file.
    pub async fn clear(&self) -> CacheResult<u64> {
        self.ensure_initialized().await?;
        let mut removed = 0u64;
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                fs::remove_file(&path).await?;
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Removes expired entry files; returns how many went.
    pub async fn sweep(&self) -> CacheResult<u64> {
        self.ensure_initialized().await?;
        let mut removed = 0u64;
        let mut dir = fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if !path.extension().is_some_and(|ext| ext == "json") {
                continue;
            }
            let Ok(bytes) = fs::read(&path).await else {
                continue;
            };
            let expired = match serde_json::from_slice::<CacheEntry>(&bytes) {
                Ok(entry) => entry.is_expired(),
                // unreadable entries are as good as expired
                Err(_) => true,
            };
            if expired && fs::remove_file(&path).await.is_ok() {
                removed += 1;
            }
        }
        if removed > 0 {
            debug!(removed, "swept expired cache files");
        }
        Ok(removed)
    }

    pub async fn entry_count(&self) -> u64 {
        let Ok(mut dir) = fs::read_dir(&self.dir).await else {
            return 0;
        };
        let mut count = 0u64;
        while let Ok(Some(item)) = dir.next_entry().await {
            if item.path().extension().is_some_and(|ext| ext == "json") {
                count += 1;
            }
        }
        count
    }
}

//! Common types for the result cache.

use std::path::PathBuf;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use douyin_parser::VideoRecord;
use serde::{Deserialize, Serialize};

use crate::error::CacheError;

/// Outcome of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// A fresh entry was found.
    Hit,
    /// No entry was found.
    Miss,
    /// An entry was found but its TTL had passed; it has been removed.
    Expired,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheStatus::Hit => f.write_str("hit"),
            CacheStatus::Miss => f.write_str("miss"),
            CacheStatus::Expired => f.write_str("expired"),
        }
    }
}

/// Cache key: the canonical page URL of a resolved target. The filename form
/// is its SHA-256 digest so scheme and slashes never reach the filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn new(input: &str) -> Self {
        Self(input.trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn filename(&self) -> String {
        use sha2::{Digest, Sha256};

        let mut hasher = Sha256::new();
        hasher.update(self.0.as_bytes());
        let hash = hasher.finalize();
        format!("{hash:x}.json")
    }
}

/// What actually gets stored: the record wrapped with its lifetime, in epoch
/// seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub cached_at: u64,
    pub expires_at: u64,
    pub record: VideoRecord,
}

impl CacheEntry {
    pub fn new(record: VideoRecord, ttl: Duration) -> Self {
        let cached_at = epoch_secs();
        Self {
            cached_at,
            expires_at: cached_at + ttl.as_secs(),
            record,
        }
    }

    pub fn is_expired(&self) -> bool {
        epoch_secs() >= self.expires_at
    }
}

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Configuration for the result cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Whether caching is enabled at all.
    pub enabled: bool,
    /// Directory for the file tier; `None` resolves to the platform cache dir.
    pub dir: Option<PathBuf>,
    /// How long a resolution stays valid.
    pub ttl: Duration,
    /// Memory-tier capacity in serialized bytes.
    pub max_memory_bytes: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
            ttl: Duration::from_secs(3600),
            max_memory_bytes: 16 * 1024 * 1024,
        }
    }
}

pub type CacheResult<T> = Result<T, CacheError>;

/// Entries plus lifetime hit/miss counters, for `stats` output.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CacheStats {
    pub memory_entries: u64,
    pub file_entries: u64,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use douyin_parser::StrategyKind;

    #[test]
    fn key_is_trimmed_and_hashes_stably() {
        let a = CacheKey::new("  https://v.douyin.com/abc/  ");
        let b = CacheKey::new("https://v.douyin.com/abc/");
        assert_eq!(a, b);
        assert_eq!(a.filename(), b.filename());
        assert!(a.filename().ends_with(".json"));
        assert_eq!(a.filename().len(), 64 + 5);
    }

    #[test]
    fn entry_expiry_follows_ttl() {
        let record = VideoRecord::new("7345678901234567890", StrategyKind::Api);
        let fresh = CacheEntry::new(record.clone(), Duration::from_secs(3600));
        assert!(!fresh.is_expired());
        assert_eq!(fresh.expires_at, fresh.cached_at + 3600);

        let mut stale = CacheEntry::new(record, Duration::from_secs(3600));
        stale.expires_at = epoch_secs().saturating_sub(10);
        assert!(stale.is_expired());
    }
}

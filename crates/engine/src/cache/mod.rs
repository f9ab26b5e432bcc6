//! Record caching, layered as an in-memory moka tier over a JSON file tier.
//!
//! The memory tier gives sub-millisecond repeat lookups within a process;
//! the file tier carries entries across process restarts. Both tiers share
//! one serialized envelope format and one TTL.

pub mod file;
pub mod manager;
pub mod memory;
pub mod types;

pub use manager::CacheManager;
pub use types::{CacheConfig, CacheKey, CacheStats, CacheStatus};

//! # Aweme Engine
//!
//! The orchestration layer on top of `douyin-parser`: runs the extraction
//! strategies as a health-ranked failover chain and adds the operational
//! pieces a long-running scraper needs.
//!
//! ## Features
//!
//! - Weighted strategy chain with per-strategy health scoring and failover
//! - Two-tier record cache (in-memory moka over JSON files on disk)
//! - Proxy pool with round-robin, random and success-weighted rotation
//! - Streaming media downloads with sanitized filenames and progress bars
//! - Request/strategy/download metrics with a Prometheus text rendering
//! - One facade, [`AwemeService`], tying everything together

pub mod builder;
pub mod cache;
pub mod chain;
pub mod config;
pub mod download;
pub mod error;
pub mod metrics;
pub mod proxy;
pub mod service;

pub use builder::ServiceConfigBuilder;
pub use cache::{CacheConfig, CacheManager, CacheStats, CacheStatus};
pub use config::ServiceConfig;
pub use error::{CacheError, DownloadError, EngineError, ProxyError};

// Re-export chain types for callers that assemble their own strategy mix
pub use chain::{StrategyChain, StrategyHealthView};

// Re-export download utilities
pub use download::{DownloadOptions, DownloadStats, MediaDownloader};

// Re-export metrics types
pub use metrics::{MetricsCollector, MetricsSnapshot, render_prometheus};

// Re-export proxy utilities
pub use proxy::{ProxyManager, ProxyStatus, RotationStrategy, mask_credentials};

pub use service::{AwemeService, ParseOptions, ParseOutcome, ServiceStats};

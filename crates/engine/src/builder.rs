//! # Builder for ServiceConfig
//!
//! This module provides a builder pattern implementation for creating and customizing
//! ServiceConfig instances with a fluent API.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use aweme_engine::ServiceConfig;
//! use aweme_engine::proxy::RotationStrategy;
//!
//! let config = ServiceConfig::builder()
//!     .with_cache_ttl(Duration::from_secs(1800))
//!     .with_proxy("socks5://127.0.0.1:1080")
//!     .with_rotation(RotationStrategy::Weighted)
//!     .with_cookies("sessionid=abc123")
//!     .with_browser_disabled(true)
//!     .build();
//!
//! assert_eq!(config.proxies.len(), 1);
//! assert!(config.browser_disabled);
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::config::ServiceConfig;
use crate::proxy::RotationStrategy;

/// Builder for creating ServiceConfig instances with a fluent API
#[derive(Debug, Clone)]
pub struct ServiceConfigBuilder {
    /// Internal config being built
    config: ServiceConfig,
}

impl ServiceConfigBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            config: ServiceConfig::default(),
        }
    }

    /// Set the full cache configuration
    pub fn with_cache_config(mut self, cache: CacheConfig) -> Self {
        self.config.cache = cache;
        self
    }

    /// Enable or disable record caching
    pub fn with_caching_enabled(mut self, enabled: bool) -> Self {
        self.config.cache.enabled = enabled;
        self
    }

    /// Set the cache directory for the file tier
    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.cache.dir = Some(dir.into());
        self
    }

    /// Set how long cached records stay valid
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.cache.ttl = ttl;
        self
    }

    /// Add a single proxy URL to the rotation pool
    pub fn with_proxy(mut self, url: impl Into<String>) -> Self {
        self.config.proxies.push(url.into());
        self
    }

    /// Add several proxy URLs to the rotation pool
    pub fn with_proxies(mut self, urls: impl IntoIterator<Item = String>) -> Self {
        self.config.proxies.extend(urls);
        self
    }

    /// Load additional proxies from a file, one URL per line
    pub fn with_proxy_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.proxy_file = Some(path.into());
        self
    }

    /// Set the proxy rotation strategy
    pub fn with_rotation(mut self, rotation: RotationStrategy) -> Self {
        self.config.rotation = rotation;
        self
    }

    /// Keep the browser strategy out of the chain entirely
    pub fn with_browser_disabled(mut self, disabled: bool) -> Self {
        self.config.browser_disabled = disabled;
        self
    }

    /// Point the browser strategy at a specific binary
    pub fn with_browser_executable(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.browser_executable = Some(path.into());
        self
    }

    /// Set the cookie header sent with every strategy attempt
    pub fn with_cookies(mut self, cookies: impl Into<String>) -> Self {
        self.config.cookies = Some(cookies.into());
        self
    }

    /// Replace the default desktop user agent
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Cap every strategy attempt at one timeout instead of per-strategy defaults
    pub fn with_strategy_timeout(mut self, timeout: Duration) -> Self {
        self.config.strategy_timeout = Some(timeout);
        self
    }

    /// Set the interval between cache maintenance sweeps
    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.config.maintenance_interval = interval;
        self
    }

    /// Build the ServiceConfig instance
    pub fn build(self) -> ServiceConfig {
        self.config
    }
}

impl Default for ServiceConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::CacheConfig;
use crate::proxy::RotationStrategy;

/// Configurable options for the service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Cache configuration
    pub cache: CacheConfig,

    /// Proxy URLs to rotate across (http, https or socks5)
    pub proxies: Vec<String>,

    /// Optional file with one proxy URL per line
    pub proxy_file: Option<PathBuf>,

    /// How the next proxy is picked
    pub rotation: RotationStrategy,

    /// Never register the browser strategy, even if a binary is present
    pub browser_disabled: bool,

    /// Explicit browser binary, overriding PATH discovery
    pub browser_executable: Option<PathBuf>,

    /// Cookie header string sent with every strategy attempt
    pub cookies: Option<String>,

    /// Replaces the default desktop user agent on every strategy attempt
    pub user_agent: Option<String>,

    /// Replaces every strategy's own per-attempt timeout when set
    pub strategy_timeout: Option<Duration>,

    /// Interval between cache maintenance sweeps
    pub maintenance_interval: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            proxies: Vec::new(),
            proxy_file: None,
            rotation: RotationStrategy::default(),
            browser_disabled: false,
            browser_executable: None,
            cookies: None,
            user_agent: None,
            strategy_timeout: None,
            maintenance_interval: Duration::from_secs(300),
        }
    }
}

impl ServiceConfig {
    pub fn builder() -> crate::builder::ServiceConfigBuilder {
        crate::builder::ServiceConfigBuilder::new()
    }
}

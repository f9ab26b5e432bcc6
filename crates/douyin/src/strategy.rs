use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{error::ParseError, record::VideoRecord, resolver::ResolvedTarget};

/// The three independent ways of turning a target into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Direct detail-API call with forged request tokens.
    Api,
    /// Headless Chromium with network sniffing.
    Browser,
    /// Plain page fetch plus embedded-state scraping.
    Html,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Api => "api",
            StrategyKind::Browser => "browser",
            StrategyKind::Html => "html",
        }
    }

    /// Starting weight before any health adjustment.
    pub fn default_weight(&self) -> f64 {
        match self {
            StrategyKind::Api => 1.0,
            StrategyKind::Browser => 0.8,
            StrategyKind::Html => 0.4,
        }
    }

    /// Hard per-attempt budget enforced by the caller.
    pub fn default_timeout(&self) -> Duration {
        match self {
            StrategyKind::Api => Duration::from_secs(10),
            StrategyKind::Browser => Duration::from_secs(30),
            StrategyKind::Html => Duration::from_secs(15),
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-attempt state handed down by the orchestrating chain.
#[derive(Debug, Clone, Default)]
pub struct ParseContext {
    /// Proxy URL with credentials inline, picked for this attempt.
    pub proxy: Option<String>,
    /// Extra cookies in `name=value; name2=value2` form.
    pub cookies: Option<String>,
    /// Replaces the default desktop user agent when set.
    pub user_agent: Option<String>,
}

impl ParseContext {
    pub fn with_proxy(mut self, proxy: Option<String>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn with_cookies(mut self, cookies: Option<String>) -> Self {
        self.cookies = cookies;
        self
    }

    pub fn with_user_agent(mut self, user_agent: Option<String>) -> Self {
        self.user_agent = user_agent;
        self
    }
}

/// A single extraction method. Implementations are independent of each other
/// and must be safe to call concurrently.
#[async_trait]
pub trait ParseStrategy: Send + Sync {
    fn kind(&self) -> StrategyKind;

    /// Base ordering weight; the chain scales this by observed success rate.
    fn base_weight(&self) -> f64 {
        self.kind().default_weight()
    }

    /// Upper bound for one attempt; the chain wraps `parse` in this timeout.
    fn timeout(&self) -> Duration {
        self.kind().default_timeout()
    }

    async fn parse(
        &self,
        target: &ResolvedTarget,
        cx: &ParseContext,
    ) -> Result<VideoRecord, ParseError>;

    /// Releases long-lived resources. Default is a no-op; only strategies
    /// holding onto something (a browser process) need to override it.
    async fn shutdown(&self) {}
}

use douyin_parser::{ParseError, StrategyKind};
use reqwest::StatusCode;

/// Errors raised by the result cache. Callers treat most of these as a cache
/// miss rather than surfacing them.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("invalid proxy URL '{0}': {1}")]
    InvalidUrl(String, String),

    #[error("failed to read proxy file: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors for media download operations.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("server returned status code {0}")]
    StatusCode(StatusCode),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("record has no downloadable media: {0}")]
    NoMedia(String),

    #[error("proxy error: {0}")]
    ProxyError(#[from] ProxyError),
}

/// Top-level error for the orchestration engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Every active strategy was tried and every one failed; the per-strategy
    /// errors are preserved in attempt order.
    #[error("all strategies failed: {}", attempts_summary(attempts))]
    AllStrategiesFailed {
        attempts: Vec<(StrategyKind, String)>,
    },

    #[error("no active strategies left to try")]
    NoActiveStrategies,

    #[error("cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("proxy error: {0}")]
    Proxy(#[from] ProxyError),

    #[error("download error: {0}")]
    Download(#[from] DownloadError),
}

fn attempts_summary(attempts: &[(StrategyKind, String)]) -> String {
    attempts
        .iter()
        .map(|(kind, error)| format!("{kind}: {error}"))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_strategies_failed_lists_each_attempt() {
        let err = EngineError::AllStrategiesFailed {
            attempts: vec![
                (StrategyKind::Api, "timed out".to_string()),
                (StrategyKind::Html, "no embedded state".to_string()),
            ],
        };
        let text = err.to_string();
        assert!(text.contains("api: timed out"));
        assert!(text.contains("html: no embedded state"));
    }
}

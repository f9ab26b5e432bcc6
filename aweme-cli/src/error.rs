use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Engine(#[from] aweme_engine::EngineError),

    #[error("cache error: {0}")]
    Cache(#[from] aweme_engine::CacheError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("{failed} of {total} inputs failed")]
    BatchFailures { failed: usize, total: usize },

    #[error("download failed for all {total} files")]
    DownloadFailed { total: u64 },
}

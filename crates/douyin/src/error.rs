use std::time::Duration;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("invalid url: {0}")]
    InvalidUrl(String),
    #[error("no url found in input: {0}")]
    NoUrlFound(String),
    #[error("no aweme id found in: {0}")]
    AwemeIdNotFound(String),
    #[error("http error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("json error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("content not found: {0}")]
    ContentNotFound(String),
    #[error("private or removed content")]
    PrivateContent,
    #[error("browser unavailable")]
    BrowserUnavailable,
    #[error("browser error: {0}")]
    BrowserError(String),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
    #[error("validation error: {0}")]
    ValidationError(String),
    #[error("unsupported input: {0}")]
    UnsupportedInput(String),
    #[error("other error: {0}")]
    Other(String),
}

impl ParseError {
    /// Errors that cannot be fixed by retrying with another proxy or at a
    /// later time. The chain uses this to deactivate a strategy for good.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            ParseError::UnsupportedInput(_)
                | ParseError::InvalidUrl(_)
                | ParseError::BrowserUnavailable
        )
    }
}

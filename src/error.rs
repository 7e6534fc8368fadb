//! Top-level error types for Steward.

use std::sync::Arc;

/// Crate-wide result type alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error enum wrapping domain-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Ocr(#[from] OcrError),

    #[error(transparent)]
    Generation(#[from] GenerationError),

    #[error(transparent)]
    Messaging(#[from] MessagingError),

    #[error(transparent)]
    Rule(#[from] RuleError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Configuration loading errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load config from {path}: {source}")]
    Load {
        path: String,
        source: Arc<std::io::Error>,
    },

    #[error("failed to parse config {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("missing required config key: {0}")]
    MissingKey(String),
}

/// Raw content retrieval errors.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The remote reported the content as missing; for paste links this means
    /// the paste expired or never existed.
    #[error("content not found at {url}")]
    NotFound { url: String },

    #[error("request to {url} failed: {message}")]
    Failure { url: String, message: String },
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// Image-to-text recognition errors.
#[derive(Debug, thiserror::Error)]
pub enum OcrError {
    #[error("failed to download image: {0}")]
    Download(#[from] FetchError),

    #[error("failed to spawn OCR process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("OCR process failed: {0}")]
    Recognition(String),
}

/// Response generation errors.
#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("provider request failed: {0}")]
    ProviderRequest(String),

    #[error("provider returned an empty response")]
    EmptyResponse,

    #[error("tool step limit ({0}) reached without a final answer")]
    StepLimit(usize),

    #[error("generation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("knowledge search failed: {0}")]
    Knowledge(String),
}

/// Messaging adapter errors.
#[derive(Debug, thiserror::Error)]
pub enum MessagingError {
    #[error("adapter {0} is not connected")]
    NotConnected(String),

    #[error("invalid platform id: {0}")]
    InvalidId(String),

    #[error("failed to send message: {0}")]
    SendFailed(String),
}

/// Detection rule table construction errors.
#[derive(Debug, thiserror::Error)]
pub enum RuleError {
    #[error("invalid rule pattern {pattern:?}: {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("rule pattern {pattern:?} has no capture group")]
    MissingCaptureGroup { pattern: String },

    #[error("rule template {template:?} has no {{code}} placeholder")]
    MissingPlaceholder { template: String },
}

//! Core error types for the Reelsmith pipeline.

/// A specialized Result type for Reelsmith operations.
pub type ReelResult<T> = Result<T, ReelError>;

/// Top-level error type encompassing every pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum ReelError {
    #[error("capture error: {message} (url: {url})")]
    Capture { url: String, message: String },

    #[error("capture error: timed out after {timeout_ms}ms loading {url}")]
    CaptureTimeout { url: String, timeout_ms: u64 },

    #[error("composition error: {0}")]
    Composition(String),

    #[error("task not found: {0}")]
    NotFound(String),

    #[error("task {id} is not ready (status: {status})")]
    NotReady { id: String, status: String },

    #[error("{stage} failed: {message}")]
    Collaborator { stage: String, message: String },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReelError {
    /// Create a capture error for the given overlay URL.
    pub fn capture(url: impl Into<String>, message: impl Into<String>) -> Self {
        ReelError::Capture {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create an error attributed to an external collaborator stage.
    pub fn collaborator(stage: impl Into<String>, message: impl Into<String>) -> Self {
        ReelError::Collaborator {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

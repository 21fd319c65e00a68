//! Error types for the core module.

use std::time::Duration;

use thiserror::Error;

/// Result type alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Result type returned by every external collaborator.
pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// Failures reported by an external collaborator (reasoning, insight
/// analysis, suggestion scoring, summarization, Q&A).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("Collaborator unavailable: {0}")]
    Unavailable(String),

    #[error("Collaborator timed out after {0:?}")]
    Timeout(Duration),

    #[error("Malformed collaborator response: {0}")]
    MalformedResponse(String),
}

impl CollaboratorError {
    /// Create an unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    /// Create a malformed-response error.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedResponse(message.into())
    }

    /// Every collaborator failure is recovered locally or degraded to a
    /// neutral message; none of them is fatal.
    pub fn is_recoverable(&self) -> bool {
        true
    }

    /// Timeouts are reported separately so the insight agent can remember them.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

/// Errors that can occur during core operations.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

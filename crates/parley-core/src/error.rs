//! Error types for Parley.

use thiserror::Error;

/// Core error type for all Parley operations.
#[derive(Error, Debug)]
pub enum ParleyError {
    /// The inference backend could not be reached or timed out.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The inference backend answered with something we could not use.
    #[error("Backend protocol error: {0}")]
    BackendProtocol(String),

    #[error("Tool execution error in {tool}: {message}")]
    ToolExecution { tool: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// The session/event store rejected or failed a request.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Malformed client input: {0}")]
    MalformedClientInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl ParleyError {
    /// Whether this error means the backend could not be reached at all.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

impl From<reqwest::Error> for ParleyError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_connect() || e.is_timeout() {
            Self::BackendUnavailable(e.to_string())
        } else if e.is_decode() {
            Self::BackendProtocol(e.to_string())
        } else {
            Self::BackendProtocol(format!("request failed: {}", e))
        }
    }
}

pub type Result<T> = std::result::Result<T, ParleyError>;

//! Error types for the call-session client.
//!
//! **Panic-Free Policy:** All error handling uses `Result` types.

use std::path::PathBuf;

use seance_protocol::ProtocolError;
use thiserror::Error;

/// Failure of a single REST call, classified for the reconciler.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// Timeout, network error or 5xx. Retried on the next cycle.
    #[error("Transient API failure: {0}")]
    Transient(String),

    /// 404 on a session-scoped endpoint; the session is gone.
    #[error("Not found")]
    NotFound,

    /// 401/403. Surfaced to the shell, never handled here.
    #[error("Authentication required")]
    Unauthorized,

    /// Envelope reported `success: false`.
    #[error("Rejected by server: {}", message.as_deref().unwrap_or("no message"))]
    Rejected { message: Option<String> },

    /// Body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl ApiError {
    /// Returns true if a later retry may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<ProtocolError> for ApiError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Rejected { message } => Self::Rejected { message },
            other => Self::Decode(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transient(err.to_string())
        }
    }
}

/// Errors from the audio transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("Transport not initialized")]
    NotInitialized,

    #[error("Already joined room {0}")]
    AlreadyJoined(String),

    #[error("Failed to join room: {0}")]
    JoinFailed(String),

    #[error("Transport error: {0}")]
    Other(String),
}

/// Errors raised outside the session actor (configuration, push channel).
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read config {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Push channel error: {0}")]
    Push(String),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

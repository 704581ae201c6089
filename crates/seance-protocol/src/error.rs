//! Protocol error types.

use thiserror::Error;

/// Errors raised while decoding or encoding wire payloads.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Payload was not valid JSON for the expected shape
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Envelope reported `success: false`
    #[error("Request rejected by server: {}", message.as_deref().unwrap_or("no message"))]
    Rejected { message: Option<String> },

    /// A required field was absent
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Push frame named an event this client does not handle
    #[error("Unknown push event: {0}")]
    UnknownEvent(String),
}

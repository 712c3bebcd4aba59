//! Error types for cable-link client operations.
//!
//! Errors surface only at the API boundary (building a consumer, creating a
//! subscription). Runtime connection trouble is handled internally by the
//! reconnect machinery and reported through callbacks, never raised.

use std::fmt;

/// Result type alias using [`CableLinkError`]
pub type Result<T> = std::result::Result<T, CableLinkError>;

/// Errors that can occur during cable-link operations.
#[derive(Debug)]
pub enum CableLinkError {
    /// WebSocket connection or protocol errors
    WebSocketError(String),

    /// JSON serialization/deserialization errors
    SerializationError(String),

    /// Connection timeout
    TimeoutError(String),

    /// Generic internal error
    InternalError(String),
}

impl fmt::Display for CableLinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WebSocketError(msg) => write!(f, "WebSocket error: {}", msg),
            Self::SerializationError(msg) => write!(f, "Serialization error: {}", msg),
            Self::TimeoutError(msg) => write!(f, "Timeout: {}", msg),
            Self::InternalError(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for CableLinkError {}

impl From<serde_json::Error> for CableLinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for CableLinkError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::WebSocketError(err.to_string())
    }
}

//! Error types for the legacy client

use thiserror::Error;

use crate::transport::TransportError;

/// Legacy client error
///
/// Every failure surfaced by the access layer is one of these kinds.
/// Callers one layer up usually only need [`ClientError::is_connection_failure`]
/// and [`ClientError::status`] to decide whether to degrade or bail.
#[derive(Debug, Error)]
pub enum ClientError {
    /// No cookie could be obtained, or the session-limit breaker is tripped
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Network failure that persisted after all retries
    #[error("Connection error: {0}")]
    Connection(String),

    /// The legacy server itself is down (timeout, refused, DNS)
    #[error("Legacy server unavailable: {0}")]
    ServerUnavailable(String),

    /// Server answered with a non-success status
    #[error("Server error {status}: {body}")]
    Response { status: u16, body: String },

    /// Server reported its concurrent-session cap (HTTP 402)
    #[error("Session limit reached (402): {body}")]
    SessionLimit { body: String },

    /// Response body was not the expected shape
    #[error("Invalid response: {0}")]
    Data(String),

    /// Missing or invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Cookie store I/O failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    /// True for both generic connection errors and server-unavailable errors.
    pub fn is_connection_failure(&self) -> bool {
        matches!(
            self,
            ClientError::Connection(_) | ClientError::ServerUnavailable(_)
        )
    }

    /// True when the server answered with a non-success status (402 included).
    pub fn is_response_failure(&self) -> bool {
        matches!(
            self,
            ClientError::Response { .. } | ClientError::SessionLimit { .. }
        )
    }

    /// HTTP status carried by a response failure.
    pub fn status(&self) -> Option<u16> {
        match self {
            ClientError::Response { status, .. } => Some(*status),
            ClientError::SessionLimit { .. } => Some(402),
            _ => None,
        }
    }
}

impl From<TransportError> for ClientError {
    fn from(err: TransportError) -> Self {
        if err.is_server_down() {
            ClientError::ServerUnavailable(err.to_string())
        } else {
            ClientError::Connection(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::Data(err.to_string())
    }
}

/// Result type for legacy client operations
pub type Result<T> = std::result::Result<T, ClientError>;

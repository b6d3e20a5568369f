//! Error types for the lobby client.

use thiserror::Error;

/// Errors that can occur when using the lobby client.
///
/// Most of these never reach the UI: the session coordinator catches transport
/// failures at its boundary, logs them, and reports an outcome value instead.
#[derive(Debug, Error)]
pub enum LobbyError {
    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed unexpectedly.
    #[error("transport connection closed")]
    TransportClosed,

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The session task has exited, so no further commands can be queued.
    #[error("not connected to server")]
    NotConnected,

    /// An access token could not be decoded.
    #[error("invalid access token: {0}")]
    InvalidToken(String),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized [`Result`] type for lobby client operations.
pub type Result<T> = std::result::Result<T, LobbyError>;

//! Transport error types.

use thiserror::Error;

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Socket-level failures.
///
/// These are recovered by the realtime client's reconnect path and surfaced to
/// subscribers' error callbacks; they are never fatal.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("Failed to connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    /// A message could not be written to the socket.
    #[error("Failed to send message: {0}")]
    Send(String),

    /// The socket reported an error.
    #[error("Socket error: {0}")]
    Socket(String),

    /// There is no live socket to write to.
    #[error("Socket is not connected")]
    NotConnected,

    /// The socket was closed, by the peer or locally.
    #[error("Socket closed{}", .reason.as_deref().map(|r| format!(": {}", r)).unwrap_or_default())]
    Closed { reason: Option<String> },
}

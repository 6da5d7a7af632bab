//! Connection lifecycle state.

use std::fmt;

/// Lifecycle state of the physical socket.
///
/// Owned exclusively by [`SocketTransport`](super::SocketTransport) and moved
/// only by backend lifecycle events or a deliberate close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    /// A connect attempt is in flight.
    Connecting,
    /// The socket is open; commands go straight to the wire.
    Open,
    /// A deliberate close is being torn down.
    Closing,
    /// No socket.
    #[default]
    Closed,
}

impl ConnectionState {
    /// Get a short description for display.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        }
    }

    /// Whether messages can be written right now.
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

//! Socket backend abstraction and lifecycle events.

use tokio::sync::mpsc;

use super::error::TransportResult;

/// Receiver half of the socket event channel.
pub type SocketEvents = mpsc::UnboundedReceiver<SocketEvent>;

/// What happened on a socket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEventKind {
    /// The connection is established.
    Opened,
    /// A text frame arrived.
    Message(String),
    /// The connection ended.
    Closed { reason: Option<String> },
    /// A socket-level error. Usually followed by `Closed`.
    Error(String),
}

/// A lifecycle event tagged with the connection it belongs to.
///
/// The tag lets the transport drop late events from a socket it already
/// tore down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketEvent {
    /// Connection generation that produced the event.
    pub connection: u64,
    /// The event itself.
    pub kind: SocketEventKind,
}

impl SocketEvent {
    /// Create an event for the given connection.
    pub fn new(connection: u64, kind: SocketEventKind) -> Self {
        Self { connection, kind }
    }
}

/// Handle a backend uses to report events for one connection.
#[derive(Debug, Clone)]
pub struct SocketEventSink {
    connection: u64,
    tx: mpsc::UnboundedSender<SocketEvent>,
}

impl SocketEventSink {
    pub(crate) fn new(connection: u64, tx: mpsc::UnboundedSender<SocketEvent>) -> Self {
        Self { connection, tx }
    }

    /// Connection generation this sink reports for.
    pub fn connection(&self) -> u64 {
        self.connection
    }

    /// Report an event. Returns false if nobody listens anymore.
    pub fn emit(&self, kind: SocketEventKind) -> bool {
        self.tx.send(SocketEvent::new(self.connection, kind)).is_ok()
    }
}

/// One physical bidirectional text connection.
///
/// Implementations do the I/O only. Buffering, state tracking and stale-event
/// filtering live in [`SocketTransport`](super::SocketTransport).
pub trait SocketBackend: Send {
    /// Start connecting to `url`. Lifecycle events go to `sink`.
    fn open(&mut self, url: &str, sink: SocketEventSink) -> TransportResult<()>;

    /// Write a text frame on the open connection.
    fn send(&mut self, text: &str) -> TransportResult<()>;

    /// Tear the connection down. Must be safe to call when nothing is open.
    fn close(&mut self);
}

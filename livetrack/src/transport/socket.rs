//! Socket transport: one physical connection plus its outbound queue.

use std::fmt;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::backend::{SocketBackend, SocketEvent, SocketEventKind, SocketEventSink, SocketEvents};
use super::error::{TransportError, TransportResult};
use super::state::ConnectionState;

/// What happened to a message handed to [`SocketTransport::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Written to the open socket.
    Sent,
    /// Held until the socket opens.
    Queued,
    /// An identical message is already waiting; nothing added.
    Duplicate,
}

/// Owns one physical connection at a time.
///
/// - `send` before the socket is open queues the message, skipping exact
///   duplicates, and [`flush_pending`](Self::flush_pending) writes the queue
///   once after open.
/// - Every `connect` starts a new connection generation. Events tagged with an
///   older generation are dropped, so a torn-down socket can never report
///   into the current one.
/// - `close` bumps the generation *before* closing the backend, which detaches
///   the close event of a deliberate close from the reconnect path.
pub struct SocketTransport {
    backend: Box<dyn SocketBackend>,
    events: mpsc::UnboundedSender<SocketEvent>,
    state: ConnectionState,
    connection: u64,
    url: Option<String>,
    pending: Vec<String>,
}

impl fmt::Debug for SocketTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SocketTransport")
            .field("state", &self.state)
            .field("connection", &self.connection)
            .field("url", &self.url)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl SocketTransport {
    /// Create a transport over `backend`.
    ///
    /// Returns the transport and the receiver its lifecycle events arrive on.
    pub fn new(backend: Box<dyn SocketBackend>) -> (Self, SocketEvents) {
        let (events, rx) = mpsc::unbounded_channel();
        let transport = Self {
            backend,
            events,
            state: ConnectionState::Closed,
            connection: 0,
            url: None,
            pending: Vec::new(),
        };
        (transport, rx)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether the socket is open.
    pub fn is_open(&self) -> bool {
        self.state.is_open()
    }

    /// Generation of the current connection (0 before the first connect).
    pub fn connection(&self) -> u64 {
        self.connection
    }

    /// URL of the last connect.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    /// Messages waiting for the socket to open.
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Connect to `url`, tearing down any previous socket first.
    pub fn connect(&mut self, url: &str) -> TransportResult<()> {
        if self.state != ConnectionState::Closed {
            debug!(connection = self.connection, "Closing previous socket before reconnect");
            self.detach_and_close();
        }

        self.connection += 1;
        self.state = ConnectionState::Connecting;
        self.url = Some(url.to_string());

        let sink = SocketEventSink::new(self.connection, self.events.clone());
        if let Err(e) = self.backend.open(url, sink) {
            warn!(url, error = %e, "Socket connect failed");
            self.state = ConnectionState::Closed;
            return Err(e);
        }

        info!(url, connection = self.connection, "Socket connecting");
        Ok(())
    }

    /// Write a message, or queue it until the socket opens.
    pub fn send(&mut self, message: &str) -> TransportResult<Delivery> {
        if self.state.is_open() {
            self.backend.send(message).map_err(|e| {
                warn!(error = %e, "Socket send failed");
                e
            })?;
            return Ok(Delivery::Sent);
        }

        if self.pending.iter().any(|m| m == message) {
            debug!(command = message, "Identical message already queued");
            return Ok(Delivery::Duplicate);
        }

        self.pending.push(message.to_string());
        Ok(Delivery::Queued)
    }

    /// Write every queued message, once, in queue order.
    ///
    /// Returns the number written. Does nothing while the socket is not open.
    pub fn flush_pending(&mut self) -> usize {
        if !self.state.is_open() {
            return 0;
        }

        let pending = std::mem::take(&mut self.pending);
        let mut written = 0;
        for message in &pending {
            match self.backend.send(message) {
                Ok(()) => written += 1,
                Err(e) => warn!(command = %message, error = %e, "Dropping queued message"),
            }
        }
        if written > 0 {
            debug!(count = written, "Flushed queued messages");
        }
        written
    }

    /// Deliberately close the socket. Never leads to a reconnect.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Closed {
            return;
        }
        info!(connection = self.connection, "Closing socket");
        self.detach_and_close();
    }

    fn detach_and_close(&mut self) {
        // Later events from this socket carry the old generation and are ignored.
        self.connection += 1;
        self.state = ConnectionState::Closing;
        self.backend.close();
        self.state = ConnectionState::Closed;
        self.pending.clear();
    }

    /// Apply a backend event.
    ///
    /// Returns the event kind if it belongs to the current connection.
    pub fn handle_event(&mut self, event: SocketEvent) -> Option<SocketEventKind> {
        if event.connection != self.connection {
            debug!(
                event_connection = event.connection,
                connection = self.connection,
                "Ignoring event from stale socket"
            );
            return None;
        }

        match &event.kind {
            SocketEventKind::Opened => {
                self.state = ConnectionState::Open;
                info!(connection = self.connection, "Socket open");
            }
            SocketEventKind::Closed { reason } => {
                self.state = ConnectionState::Closed;
                info!(connection = self.connection, reason = ?reason, "Socket closed");
            }
            SocketEventKind::Error(error) => {
                warn!(connection = self.connection, error = %error, "Socket error");
            }
            SocketEventKind::Message(_) => {}
        }

        Some(event.kind)
    }

    /// Build the error subscribers see for a lifecycle event.
    pub fn error_for(kind: &SocketEventKind) -> Option<TransportError> {
        match kind {
            SocketEventKind::Closed { reason } => Some(TransportError::Closed {
                reason: reason.clone(),
            }),
            SocketEventKind::Error(error) => Some(TransportError::Socket(error.clone())),
            _ => None,
        }
    }
}

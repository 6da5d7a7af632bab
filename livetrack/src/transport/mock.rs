//! In-memory socket backend.
//!
//! Records every open, send and close so tests can assert on the exact wire
//! traffic, and builds lifecycle events for the connection it last opened.

use std::sync::Arc;

use parking_lot::Mutex;

use super::backend::{SocketBackend, SocketEvent, SocketEventKind, SocketEventSink};
use super::error::{TransportError, TransportResult};

#[derive(Debug, Default)]
struct MockState {
    opened: Vec<String>,
    sent: Vec<String>,
    closes: usize,
    connection: Option<u64>,
    fail_open: bool,
}

/// Recording backend. Clones share the same recording.
#[derive(Debug, Clone, Default)]
pub struct MockSocket {
    state: Arc<Mutex<MockState>>,
}

impl MockSocket {
    /// Create an empty recording backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `open` calls fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.state.lock().fail_open = fail;
    }

    /// Every text frame written so far.
    pub fn sent(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Drain the recorded frames.
    pub fn take_sent(&self) -> Vec<String> {
        std::mem::take(&mut self.state.lock().sent)
    }

    /// URLs passed to `open`, in order.
    pub fn opened_urls(&self) -> Vec<String> {
        self.state.lock().opened.clone()
    }

    /// Number of `close` calls.
    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    /// Generation of the connection opened last.
    pub fn connection(&self) -> Option<u64> {
        self.state.lock().connection
    }

    /// Build an event for the connection opened last.
    pub fn event(&self, kind: SocketEventKind) -> Option<SocketEvent> {
        self.connection().map(|c| SocketEvent::new(c, kind))
    }
}

impl SocketBackend for MockSocket {
    fn open(&mut self, url: &str, sink: SocketEventSink) -> TransportResult<()> {
        let mut state = self.state.lock();
        if state.fail_open {
            return Err(TransportError::Connect {
                url: url.to_string(),
                reason: "mock refused".to_string(),
            });
        }
        state.opened.push(url.to_string());
        state.connection = Some(sink.connection());
        Ok(())
    }

    fn send(&mut self, text: &str) -> TransportResult<()> {
        self.state.lock().sent.push(text.to_string());
        Ok(())
    }

    fn close(&mut self) {
        self.state.lock().closes += 1;
    }
}

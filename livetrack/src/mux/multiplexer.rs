//! The channel multiplexer.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use super::channel::ChannelKey;
use super::command::ChannelCommand;
use super::frame::{self, Frame};
use super::registry::{ErrorHandler, Listener, MessageHandler, Registry};
use crate::transport::{SocketTransport, TransportError};

/// A frame ready to hand to a listener.
///
/// Dispatch collects these while holding the multiplexer; the caller runs them
/// after letting go, so handlers may call back into the client.
#[derive(Debug)]
pub struct Dispatch {
    handler: MessageHandler,
    frame: Arc<Frame>,
}

impl Dispatch {
    /// The frame to deliver.
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Deliver the frame.
    pub fn run(self) {
        self.handler.call(&self.frame);
    }
}

/// Frame counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MuxStats {
    /// Text frames received from the socket.
    pub frames_received: u64,
    /// Frames dropped because they did not decode.
    pub frames_dropped: u64,
    /// Frame deliveries to listeners.
    pub deliveries: u64,
}

/// Turns one transport into many logical channels.
///
/// Tracks, per channel key, whether the server has been told we want it
/// (`subscribed`). That flag is separate from the listener list because
/// several listeners share one server-side subscription, and it is only set
/// once `GET`+`SUB` actually went out on an open socket. While the socket is
/// down, registrations are recorded and [`resubscribe_all`](Self::resubscribe_all)
/// sends them when it opens.
pub struct Multiplexer {
    transport: SocketTransport,
    registry: Registry,
    subscribed: HashMap<ChannelKey, bool>,
    stats: MuxStats,
}

impl fmt::Debug for Multiplexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Multiplexer")
            .field("transport", &self.transport)
            .field("listeners", &self.registry.len())
            .field("subscribed", &self.subscribed)
            .field("stats", &self.stats)
            .finish()
    }
}

impl Multiplexer {
    /// Create a multiplexer over `transport`.
    pub fn new(transport: SocketTransport) -> Self {
        Self {
            transport,
            registry: Registry::new(),
            subscribed: HashMap::new(),
            stats: MuxStats::default(),
        }
    }

    /// The underlying transport.
    pub fn transport(&self) -> &SocketTransport {
        &self.transport
    }

    /// The underlying transport, mutably.
    pub fn transport_mut(&mut self) -> &mut SocketTransport {
        &mut self.transport
    }

    /// Frame counters.
    pub fn stats(&self) -> MuxStats {
        self.stats
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    /// Whether the server currently knows we want `key`.
    pub fn is_subscribed(&self, key: &ChannelKey) -> bool {
        self.subscribed.get(key).copied().unwrap_or(false)
    }

    /// Send a raw command through the transport. Failures are logged.
    pub fn send(&mut self, command: &str) {
        if let Err(e) = self.transport.send(command) {
            warn!(command, error = %e, "Command not sent");
        }
    }

    fn send_channel_command(&mut self, command: ChannelCommand) {
        debug!(command = %command, "Channel command");
        self.send(&command.to_string());
    }

    /// Tell the server about `key` if it does not know yet and we can talk.
    fn announce(&mut self, key: &ChannelKey) {
        if self.is_subscribed(key) || !self.transport.is_open() {
            return;
        }
        self.send_channel_command(ChannelCommand::Get {
            key: key.clone(),
            request_id: None,
        });
        self.send_channel_command(ChannelCommand::Sub(key.clone()));
        self.subscribed.insert(key.clone(), true);
    }

    /// Register a listener on `key`.
    ///
    /// The first non-quiet listener makes the server send `GET` content and
    /// `SUB` updates. Registering the same handler on the same key again
    /// replaces the previous registration.
    pub fn subscribe(
        &mut self,
        key: ChannelKey,
        on_message: MessageHandler,
        on_error: Option<ErrorHandler>,
        quiet: bool,
    ) {
        trace!(channel = %key, quiet, "Subscribe");
        self.registry.insert(Listener::subscription(
            key.clone(),
            on_message,
            on_error,
            quiet,
        ));
        if !quiet {
            self.announce(&key);
        }
    }

    /// Remove listeners on `key`; only `on_message`'s when given.
    ///
    /// Sends `DEL` once the last persistent listener is gone and the server
    /// was told about `key`. Pending one-shot requests on the same key do not
    /// keep the subscription alive. Returns the number removed.
    pub fn unsubscribe(&mut self, key: &ChannelKey, on_message: Option<&MessageHandler>) -> usize {
        let removed = self.registry.remove(key, on_message);
        if removed.is_empty() || self.registry.has_subscriptions(key) {
            return removed.len();
        }

        let was_subscribed = self.subscribed.remove(key).unwrap_or(false);
        if was_subscribed && self.transport.is_open() {
            self.send_channel_command(ChannelCommand::Del(key.clone()));
        }
        removed.len()
    }

    /// One-shot request: `GET` `key`, deliver the first matching frame, forget.
    ///
    /// An identical pending request (same key and handler) is replaced. While
    /// the socket is down the request waits and goes out on open.
    pub fn get(
        &mut self,
        key: ChannelKey,
        request_id: Option<u64>,
        on_message: MessageHandler,
        on_error: Option<ErrorHandler>,
    ) {
        trace!(channel = %key, request_id, "Get");
        self.registry.insert(Listener::request(
            key.clone(),
            request_id,
            on_message,
            on_error,
        ));
        if self.transport.is_open() {
            self.send_channel_command(ChannelCommand::Get { key, request_id });
        }
    }

    /// Re-announce every registration after the socket (re)opened.
    ///
    /// Marks every channel as unknown to the server, then walks the
    /// listeners in registration order: persistent non-quiet listeners get
    /// `GET`+`SUB` once per key, outstanding one-shot requests get their
    /// `GET` again.
    pub fn resubscribe_all(&mut self) {
        for told in self.subscribed.values_mut() {
            *told = false;
        }

        let listeners: Vec<Listener> = self.registry.iter().cloned().collect();
        debug!(listeners = listeners.len(), "Resubscribing all channels");

        for listener in listeners {
            if listener.one_shot {
                self.send_channel_command(ChannelCommand::Get {
                    key: listener.key,
                    request_id: listener.request_id,
                });
            } else if !listener.quiet {
                self.announce(&listener.key);
            }
        }
    }

    /// Route one inbound text frame.
    ///
    /// Malformed frames are logged and dropped. Buffer frames are expanded
    /// and each inner frame routed on its own; the buffer itself never
    /// reaches a listener.
    pub fn dispatch(&mut self, text: &str) -> Vec<Dispatch> {
        self.stats.frames_received += 1;

        let frames = match Frame::decode(text).and_then(frame::expand) {
            Ok(frames) => frames,
            Err(e) => {
                self.stats.frames_dropped += 1;
                warn!(error = %e, "Dropping malformed frame");
                return Vec::new();
            }
        };

        let mut dispatches = Vec::new();
        for frame in frames {
            let frame = Arc::new(frame);
            let handlers = self.registry.take_matching(&frame);
            if handlers.is_empty() {
                trace!(source = %frame.source, "No listener for frame");
            }
            for handler in handlers {
                dispatches.push(Dispatch {
                    handler,
                    frame: Arc::clone(&frame),
                });
            }
        }
        self.stats.deliveries += dispatches.len() as u64;
        dispatches
    }

    /// Error handlers to notify about a socket-level failure.
    ///
    /// Registrations stay in place; reconnect plus `resubscribe_all` restores
    /// them.
    pub fn error_handlers(&self) -> Vec<ErrorHandler> {
        self.registry.error_handlers()
    }

    /// Forget every registration. Nothing is sent.
    pub fn clear(&mut self) {
        self.registry.clear();
        self.subscribed.clear();
    }
}

/// Deliver a socket error to every handler.
pub fn notify_error(handlers: Vec<ErrorHandler>, error: &TransportError) {
    for handler in handlers {
        handler.call(error);
    }
}

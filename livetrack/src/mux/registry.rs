//! Listener registry.
//!
//! Listeners are explicit entries kept in registration order. One-shot
//! listeners carry a flag and are removed by the dispatch loop after their
//! first matching frame.

use std::fmt;
use std::sync::Arc;

use super::channel::ChannelKey;
use super::frame::Frame;
use crate::transport::TransportError;

/// Callback receiving frames for a channel.
///
/// Identity is the allocation: clones of a handler are the same handler,
/// two handlers built from identical closures are not.
#[derive(Clone)]
pub struct MessageHandler(Arc<dyn Fn(&Frame) + Send + Sync>);

impl MessageHandler {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&Frame) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invoke the handler.
    pub fn call(&self, frame: &Frame) {
        (self.0)(frame)
    }

    /// Whether both refer to the same handler.
    pub fn same_as(&self, other: &MessageHandler) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for MessageHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MessageHandler({:p})", Arc::as_ptr(&self.0))
    }
}

/// Callback receiving socket-level errors for a channel.
#[derive(Clone)]
pub struct ErrorHandler(Arc<dyn Fn(&TransportError) + Send + Sync>);

impl ErrorHandler {
    /// Wrap a closure.
    pub fn new(f: impl Fn(&TransportError) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    /// Invoke the handler.
    pub fn call(&self, error: &TransportError) {
        (self.0)(error)
    }
}

impl fmt::Debug for ErrorHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ErrorHandler({:p})", Arc::as_ptr(&self.0))
    }
}

/// One registration.
#[derive(Debug, Clone)]
pub struct Listener {
    /// Channel listened to.
    pub key: ChannelKey,
    /// Correlation id a one-shot response must echo, if any.
    pub request_id: Option<u64>,
    /// Frame callback.
    pub on_message: MessageHandler,
    /// Socket error callback.
    pub on_error: Option<ErrorHandler>,
    /// Quiet listeners never cause GET/SUB/DEL traffic.
    pub quiet: bool,
    /// Removed after the first matching frame.
    pub one_shot: bool,
}

impl Listener {
    /// A persistent subscription.
    pub fn subscription(
        key: ChannelKey,
        on_message: MessageHandler,
        on_error: Option<ErrorHandler>,
        quiet: bool,
    ) -> Self {
        Self {
            key,
            request_id: None,
            on_message,
            on_error,
            quiet,
            one_shot: false,
        }
    }

    /// A one-shot request.
    pub fn request(
        key: ChannelKey,
        request_id: Option<u64>,
        on_message: MessageHandler,
        on_error: Option<ErrorHandler>,
    ) -> Self {
        Self {
            key,
            request_id,
            on_message,
            on_error,
            quiet: false,
            one_shot: true,
        }
    }

    /// Whether `frame` is addressed to this listener.
    pub fn accepts(&self, frame: &Frame) -> bool {
        if !self.key.matches(&frame.source) {
            return false;
        }
        match self.request_id {
            Some(id) if self.one_shot => frame.request_id() == Some(id),
            _ => true,
        }
    }

    fn same_registration(&self, other: &Listener) -> bool {
        self.one_shot == other.one_shot
            && self.key == other.key
            && self.on_message.same_as(&other.on_message)
    }
}

/// Ordered set of listeners, unique per (key, handler, kind).
#[derive(Debug, Default)]
pub struct Registry {
    listeners: Vec<Listener>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener, replacing an existing registration of the same
    /// handler on the same key in place (registration order is kept).
    ///
    /// Returns the replaced listener.
    pub fn insert(&mut self, listener: Listener) -> Option<Listener> {
        match self
            .listeners
            .iter_mut()
            .find(|l| l.same_registration(&listener))
        {
            Some(existing) => Some(std::mem::replace(existing, listener)),
            None => {
                self.listeners.push(listener);
                None
            }
        }
    }

    /// Remove persistent listeners on `key`; only `handler`'s when given.
    pub fn remove(&mut self, key: &ChannelKey, handler: Option<&MessageHandler>) -> Vec<Listener> {
        let mut removed = Vec::new();
        self.listeners.retain(|l| {
            let hit = !l.one_shot
                && &l.key == key
                && handler.map_or(true, |h| l.on_message.same_as(h));
            if hit {
                removed.push(l.clone());
            }
            !hit
        });
        removed
    }

    /// Handlers of every listener accepting `frame`, in registration order.
    ///
    /// One-shot listeners that match are removed.
    pub fn take_matching(&mut self, frame: &Frame) -> Vec<MessageHandler> {
        let mut handlers = Vec::new();
        self.listeners.retain(|l| {
            if !l.accepts(frame) {
                return true;
            }
            handlers.push(l.on_message.clone());
            !l.one_shot
        });
        handlers
    }

    /// Whether any listener (of either kind) remains on `key`.
    pub fn has_listeners(&self, key: &ChannelKey) -> bool {
        self.listeners.iter().any(|l| &l.key == key)
    }

    /// Whether a persistent listener remains on `key`. Pending one-shot
    /// requests are ignored.
    pub fn has_subscriptions(&self, key: &ChannelKey) -> bool {
        self.listeners
            .iter()
            .any(|l| !l.one_shot && &l.key == key)
    }

    /// Error handlers of every listener.
    pub fn error_handlers(&self) -> Vec<ErrorHandler> {
        self.listeners
            .iter()
            .filter_map(|l| l.on_error.clone())
            .collect()
    }

    /// Listeners in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Listener> {
        self.listeners.iter()
    }

    /// Number of listeners.
    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    /// Drop every listener.
    pub fn clear(&mut self) {
        self.listeners.clear();
    }
}

//! Socket transport.
//!
//! Owns the single physical connection the whole crate talks through.
//!
//! # Architecture
//!
//! ```text
//! SocketTransport ──────► SocketBackend ──────► wire
//!  (state, queue,          (WebSocketBackend,
//!   generations)            MockSocket)
//!        ▲
//!        │ SocketEvent { connection, kind }
//!        └──────────── unbounded mpsc ◄──────── backend task
//! ```
//!
//! The transport is synchronous; backends report lifecycle events on a
//! channel and whoever drives the client feeds them back through
//! [`SocketTransport::handle_event`].

mod backend;
mod error;
mod mock;
mod socket;
mod state;
mod websocket;

pub use backend::{SocketBackend, SocketEvent, SocketEventKind, SocketEventSink, SocketEvents};
pub use error::{TransportError, TransportResult};
pub use mock::MockSocket;
pub use socket::{Delivery, SocketTransport};
pub use state::ConnectionState;
pub use websocket::WebSocketBackend;

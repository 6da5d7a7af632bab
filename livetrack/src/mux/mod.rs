//! Channel multiplexer.
//!
//! Turns the single socket into many logical channels, each identified by a
//! [`ChannelKey`] (channel name plus optional argument).
//!
//! # Architecture
//!
//! ```text
//!                       ┌────────────────────────────┐
//!  subscribe/get ──────►│ Multiplexer                │── GET / SUB / DEL ──► SocketTransport
//!  unsubscribe          │  Registry (listeners, in   │
//!                       │  registration order)       │
//!                       │  subscribed: key -> bool   │
//!                       └─────────────┬──────────────┘
//!                                     │ dispatch(text)
//!                     Frame::decode ──┴── expand "buffer" frames
//!                                     │
//!                          Vec<Dispatch> (run by caller, unlocked)
//! ```
//!
//! # Wire grammar
//!
//! Outbound: `GET <channel>[ <args>][ <requestId>]`, `SUB <channel>[ <args>]`,
//! `DEL <channel>[ <args>]`. Inbound frames are JSON objects with `source`,
//! `content` and an optional `client_reference`.
//!
//! # Example
//!
//! ```ignore
//! let mut mux = Multiplexer::new(transport);
//! mux.subscribe(
//!     ChannelKey::new("trajectory"),
//!     MessageHandler::new(|frame| println!("{}", frame.content)),
//!     None,
//!     false,
//! );
//! for delivery in mux.dispatch(&text) {
//!     delivery.run();
//! }
//! ```

mod channel;
mod command;
mod frame;
mod multiplexer;
mod registry;

pub use channel::ChannelKey;
pub use command::ChannelCommand;
pub use frame::{expand, Frame, FrameError, BUFFER_SOURCE};
pub use multiplexer::{notify_error, Dispatch, Multiplexer, MuxStats};
pub use registry::{ErrorHandler, Listener, MessageHandler, Registry};

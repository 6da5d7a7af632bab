//! Realtime client errors.

use thiserror::Error;

use crate::transport::TransportError;

/// Result alias for realtime client operations.
pub type RealtimeResult<T> = Result<T, RealtimeError>;

/// Errors surfaced to callers of the realtime client.
///
/// Socket trouble on subscriptions goes to their error handlers instead;
/// these are returned by `open` and by one-shot queries.
#[derive(Debug, Error)]
pub enum RealtimeError {
    /// The server answered a query with an error payload.
    #[error("Request on '{channel}' rejected: {reason}")]
    RequestRejected { channel: String, reason: String },

    /// The server answered a query with no content.
    #[error("No content on '{channel}'")]
    EmptyContent { channel: String },

    /// The content did not have the expected shape.
    #[error("Cannot decode content on '{channel}': {source}")]
    Decode {
        channel: String,
        #[source]
        source: serde_json::Error,
    },

    /// The socket could not be used.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The client went away before the query was answered.
    #[error("Realtime client closed")]
    ClientClosed,
}

//! Channel commands (`GET`, `SUB`, `DEL`).

use std::fmt;

use super::channel::ChannelKey;

/// A client → server command addressing one channel.
///
/// Grammar: `<VERB> <channel>[ <args>][ <requestId>]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelCommand {
    /// Ask for the channel's current content once.
    Get {
        key: ChannelKey,
        request_id: Option<u64>,
    },
    /// Start receiving updates.
    Sub(ChannelKey),
    /// Stop receiving updates.
    Del(ChannelKey),
}

impl ChannelCommand {
    /// The command verb.
    pub fn verb(&self) -> &'static str {
        match self {
            ChannelCommand::Get { .. } => "GET",
            ChannelCommand::Sub(_) => "SUB",
            ChannelCommand::Del(_) => "DEL",
        }
    }
}

impl fmt::Display for ChannelCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelCommand::Get {
                key,
                request_id: Some(id),
            } => write!(f, "GET {} {}", key, id),
            ChannelCommand::Get {
                key,
                request_id: None,
            } => write!(f, "GET {}", key),
            ChannelCommand::Sub(key) => write!(f, "SUB {}", key),
            ChannelCommand::Del(key) => write!(f, "DEL {}", key),
        }
    }
}

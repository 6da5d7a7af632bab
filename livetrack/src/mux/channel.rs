//! Channel keys.

use std::fmt;

/// A logical channel: a name plus an optional argument.
///
/// The key's [`source`](Self::source) form (`name` or `name args`) is what the
/// server puts in every frame's `source` field and what follows the verb in
/// `GET`/`SUB`/`DEL` commands.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelKey {
    channel: String,
    args: Option<String>,
}

impl ChannelKey {
    /// A key without argument.
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            args: None,
        }
    }

    /// A key with an argument. An empty argument is the same as none.
    pub fn with_args(channel: impl Into<String>, args: impl Into<String>) -> Self {
        let args = args.into();
        Self {
            channel: channel.into(),
            args: if args.is_empty() { None } else { Some(args) },
        }
    }

    /// Parse the `source` form back into a key, splitting at the first space.
    pub fn parse(source: &str) -> Self {
        match source.split_once(' ') {
            Some((channel, args)) => Self::with_args(channel, args),
            None => Self::new(source),
        }
    }

    /// Channel name.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Channel argument, if any.
    pub fn args(&self) -> Option<&str> {
        self.args.as_deref()
    }

    /// The wire form: `name` or `name args`.
    pub fn source(&self) -> String {
        self.to_string()
    }

    /// Whether a frame `source` addresses this key (exact match).
    pub fn matches(&self, source: &str) -> bool {
        match &self.args {
            None => source == self.channel,
            Some(args) => source
                .strip_prefix(self.channel.as_str())
                .and_then(|rest| rest.strip_prefix(' '))
                .is_some_and(|rest| rest == args),
        }
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.args {
            Some(args) => write!(f, "{} {}", self.channel, args),
            None => write!(f, "{}", self.channel),
        }
    }
}

impl From<&str> for ChannelKey {
    fn from(source: &str) -> Self {
        Self::parse(source)
    }
}

//! Rendering modes and channel naming.

use std::fmt;
use std::str::FromStr;

use crate::mux::ChannelKey;

/// Which flavour of geometry the server sends.
///
/// Each mode has its own channels; the suffix is appended to the base name.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum RealtimeMode {
    /// Geographic track geometry.
    #[default]
    Topographic,
    /// Schematic network plan geometry.
    Schematic,
}

impl RealtimeMode {
    /// Channel name suffix.
    pub fn suffix(&self) -> &'static str {
        match self {
            RealtimeMode::Topographic => "",
            RealtimeMode::Schematic => "_schematic",
        }
    }

    /// Name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            RealtimeMode::Topographic => "topographic",
            RealtimeMode::Schematic => "schematic",
        }
    }

    /// `<base><suffix>`.
    pub fn channel(&self, base: &str) -> ChannelKey {
        ChannelKey::new(format!("{}{}", base, self.suffix()))
    }

    /// `<base><suffix>_<argument>`.
    pub fn entity_channel(&self, base: &str, argument: &str) -> ChannelKey {
        ChannelKey::new(format!("{}{}_{}", base, self.suffix(), argument))
    }
}

impl fmt::Display for RealtimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RealtimeMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "topographic" | "topo" => Ok(RealtimeMode::Topographic),
            "schematic" => Ok(RealtimeMode::Schematic),
            other => Err(format!("unknown mode '{}'", other)),
        }
    }
}

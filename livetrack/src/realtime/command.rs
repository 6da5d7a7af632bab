//! Session-level commands (`RESET`, `PING`, viewport).

use std::fmt;

/// A map extent in the session projection.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extent {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Extent {
    /// Create an extent.
    pub const fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Self {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }
}

/// Commands that address the session rather than a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    /// Drop every server-side subscription.
    Reset,
    /// Keep-alive.
    Ping,
    /// Restrict vehicle updates to a viewport.
    Bbox(Extent),
    /// Extra margin around the viewport.
    Buffer { dx: f64, dy: f64 },
    /// Coordinate system of geometries, e.g. `EPSG:3857`.
    Projection(String),
}

impl fmt::Display for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionCommand::Reset => write!(f, "RESET"),
            SessionCommand::Ping => write!(f, "PING"),
            SessionCommand::Bbox(e) => {
                write!(f, "BBOX {} {} {} {}", e.min_x, e.min_y, e.max_x, e.max_y)
            }
            SessionCommand::Buffer { dx, dy } => write!(f, "BUFFER {} {}", dx, dy),
            SessionCommand::Projection(code) => write!(f, "PROJECTION {}", code),
        }
    }
}

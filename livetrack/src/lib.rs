//! LiveTrack - live vehicle positions over one multiplexed socket
//!
//! Many logical channels (vehicle trajectories, deletions, stations,
//! timetables, ...) share a single realtime connection. Sparse trajectory
//! updates are turned into smooth positions by interpolating along each
//! vehicle's path against a virtual clock, and drawn by a host-supplied
//! surface at a zoom-dependent cadence.
//!
//! ```text
//!   transport ─► mux ─► realtime ─► trajectory store ─► render ─► host surface
//!      ▲                  │
//!      └── reconnect ◄────┘            timer: PING, reconnect, render ticks
//! ```
//!
//! [`LiveTracker`] wires the pieces together; each module is also usable on
//! its own.

pub mod config;
pub mod logging;
pub mod mux;
pub mod realtime;
pub mod render;
pub mod timer;
pub mod tracker;
pub mod trajectory;
pub mod transport;

pub use config::{ConfigError, ConfigResult, LiveTrackConfig};
pub use logging::{init_logging, LoggingConfig, LoggingError, LoggingGuard};
pub use realtime::{RealtimeClient, RealtimeConfig, RealtimeError, RealtimeMode};
pub use render::{RenderConfig, RenderScheduler, TrackerSettings};
pub use timer::{ManualScheduler, Scheduler, TokioScheduler};
pub use tracker::LiveTracker;
pub use trajectory::{Trajectory, TrajectoryStore};
pub use transport::{SocketTransport, TransportError, WebSocketBackend};

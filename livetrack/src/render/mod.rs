//! Interpolation and render scheduling.
//!
//! Turns the trajectory store into vehicle positions on a host-supplied
//! canvas, at a cadence tuned to the map zoom.
//!
//! # Architecture
//!
//! ```text
//!   timer tick ──► RenderScheduler::render_once
//!                      │
//!                      ├─ VirtualClock::tick          (now)
//!                      ├─ TrajectoryStore::visible    (filtered, sorted)
//!                      ├─ interpolate(trajectory, now)
//!                      ├─ Projector::project          (None = off canvas)
//!                      └─ RenderSurface::clear/draw   (only when pixels moved)
//! ```
//!
//! Tick period is `max(min_tick, zoom_time_step(zoom) / speed)`.
//!
//! # Example
//!
//! ```ignore
//! let scheduler = RenderScheduler::new(
//!     &RenderConfig::default(),
//!     store,
//!     timers,
//!     Arc::new(ViewportProjector::default()),
//!     Box::new(surface),
//! );
//! scheduler.set_view(ViewState::new(CanvasSize::new(800, 600), center, 2.4, 14.0));
//! scheduler.start();
//! ```

mod cadence;
mod clock;
mod config;
mod interpolate;
mod scheduler;
mod settings;
mod surface;

pub use cadence::{tick_period, zoom_time_step, DEFAULT_TIME_STEP, ZOOM_TIME_STEPS};
pub use clock::VirtualClock;
pub use config::{RenderConfig, DEFAULT_MIN_TICK};
pub use interpolate::{interpolate, Interpolated};
pub use scheduler::{RenderOutcome, RenderScheduler, RenderStats};
pub use settings::{PendingSettings, SettingsHolder, TrackerSettings};
pub use surface::{
    CanvasSize, Pixel, Projector, RecordingSurface, RenderSurface, RenderedTrajectory, SurfaceOp,
    ViewState, ViewportProjector,
};

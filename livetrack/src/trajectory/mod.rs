//! Vehicle trajectories.
//!
//! A trajectory is a vehicle's geometry plus the `(time, arc fraction,
//! rotation)` samples the renderer interpolates between. The
//! [`TrajectoryStore`] is the only state shared between the socket side
//! (which upserts and removes) and the render side (which reads snapshots).

mod error;
mod geometry;
mod model;
mod store;

pub use error::{GeometryError, TrajectoryError, TrajectoryResult};
pub use geometry::{Coordinate, Geometry, LineSample, Polyline};
pub use model::{id_string, TimeInterval, Trajectory, TrajectoryMessage};
pub use store::{TrajectoryComparator, TrajectoryFilter, TrajectorySnapshot, TrajectoryStore};

//! Renderer collaborators: projection and drawing.
//!
//! The crate never draws pixels itself. A host supplies a [`Projector`]
//! turning coordinates into canvas pixels and a [`RenderSurface`] that
//! erases and draws vehicles.

use std::sync::Arc;

use parking_lot::Mutex;

use super::interpolate::Interpolated;
use crate::trajectory::{Coordinate, Trajectory};

/// A canvas position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Pixel {
    pub x: f64,
    pub y: f64,
}

impl Pixel {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Whole-pixel position, used to decide whether a redraw is needed.
    pub fn rounded(&self) -> (i64, i64) {
        (self.x.round() as i64, self.y.round() as i64)
    }

    pub(crate) fn scaled(&self, ratio: f64) -> Self {
        Self::new(self.x * ratio, self.y * ratio)
    }
}

/// Canvas size in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct CanvasSize {
    pub width: u32,
    pub height: u32,
}

impl CanvasSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub(crate) fn scaled(&self, ratio: f64) -> Self {
        Self::new(
            (f64::from(self.width) * ratio).round() as u32,
            (f64::from(self.height) * ratio).round() as u32,
        )
    }
}

/// The map view, supplied by the host on every change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewState {
    pub size: CanvasSize,
    /// Map center in feed coordinates.
    pub center: Coordinate,
    /// Map units per pixel.
    pub resolution: f64,
    /// View rotation, radians.
    pub rotation: f64,
    /// Zoom level, drives the tick cadence.
    pub zoom: f64,
}

impl ViewState {
    pub fn new(size: CanvasSize, center: Coordinate, resolution: f64, zoom: f64) -> Self {
        Self {
            size,
            center,
            resolution,
            rotation: 0.0,
            zoom,
        }
    }
}

/// A vehicle placed on the canvas by the last render pass.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedTrajectory {
    pub trajectory: Arc<Trajectory>,
    pub position: Interpolated,
    /// Device pixels (pixel ratio applied).
    pub pixel: Pixel,
}

impl RenderedTrajectory {
    pub fn id(&self) -> &str {
        &self.trajectory.id
    }
}

/// Projects feed coordinates onto the canvas.
pub trait Projector: Send + Sync {
    /// CSS pixel of `coordinate`, or `None` when it is off the canvas.
    fn project(&self, coordinate: Coordinate, view: &ViewState) -> Option<Pixel>;
}

/// Draws vehicles.
///
/// Called with the render scheduler's lock held; must not call back into it.
pub trait RenderSurface: Send {
    /// Erase everything and size the canvas (device pixels).
    fn clear(&mut self, size: CanvasSize);

    /// Draw one vehicle.
    fn draw(&mut self, vehicle: &RenderedTrajectory);
}

/// Linear projection around the view center, honoring view rotation.
///
/// Coordinates farther than `margin` pixels outside the canvas project to
/// `None`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewportProjector {
    pub margin: f64,
}

impl ViewportProjector {
    pub fn new(margin: f64) -> Self {
        Self { margin }
    }
}

impl Projector for ViewportProjector {
    fn project(&self, coordinate: Coordinate, view: &ViewState) -> Option<Pixel> {
        if view.resolution.is_nan() || view.resolution <= 0.0 {
            return None;
        }
        let dx = (coordinate.x - view.center.x) / view.resolution;
        let dy = (coordinate.y - view.center.y) / view.resolution;
        let (sin, cos) = view.rotation.sin_cos();
        let (rx, ry) = (dx * cos - dy * sin, dx * sin + dy * cos);

        let width = f64::from(view.size.width);
        let height = f64::from(view.size.height);
        // Map y grows north, canvas y grows down
        let pixel = Pixel::new(width / 2.0 + rx, height / 2.0 - ry);

        let inside = pixel.x >= -self.margin
            && pixel.x <= width + self.margin
            && pixel.y >= -self.margin
            && pixel.y <= height + self.margin;
        inside.then_some(pixel)
    }
}

/// Something a [`RecordingSurface`] was asked to do.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceOp {
    Clear(CanvasSize),
    Draw { id: String, pixel: Pixel },
}

/// Surface that records calls; clones share the record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSurface {
    ops: Arc<Mutex<Vec<SurfaceOp>>>,
}

impl RecordingSurface {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything recorded so far.
    pub fn ops(&self) -> Vec<SurfaceOp> {
        self.ops.lock().clone()
    }

    /// Take and clear the record.
    pub fn take_ops(&self) -> Vec<SurfaceOp> {
        std::mem::take(&mut *self.ops.lock())
    }

    /// Ids drawn since the last clear, in draw order.
    pub fn drawn_ids(&self) -> Vec<String> {
        let ops = self.ops.lock();
        let start = ops
            .iter()
            .rposition(|op| matches!(op, SurfaceOp::Clear(_)))
            .map_or(0, |i| i + 1);
        ops[start..]
            .iter()
            .filter_map(|op| match op {
                SurfaceOp::Draw { id, .. } => Some(id.clone()),
                SurfaceOp::Clear(_) => None,
            })
            .collect()
    }

    /// Number of clears recorded.
    pub fn clear_count(&self) -> usize {
        self.ops
            .lock()
            .iter()
            .filter(|op| matches!(op, SurfaceOp::Clear(_)))
            .count()
    }
}

impl RenderSurface for RecordingSurface {
    fn clear(&mut self, size: CanvasSize) {
        self.ops.lock().push(SurfaceOp::Clear(size));
    }

    fn draw(&mut self, vehicle: &RenderedTrajectory) {
        self.ops.lock().push(SurfaceOp::Draw {
            id: vehicle.id().to_string(),
            pixel: vehicle.pixel,
        });
    }
}

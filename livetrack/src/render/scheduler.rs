//! The render scheduler: clock, interpolation, redraw policy and cadence.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use super::cadence::tick_period;
use super::clock::VirtualClock;
use super::config::RenderConfig;
use super::interpolate::{interpolate, Interpolated};
use super::settings::TrackerSettings;
use super::surface::{CanvasSize, Projector, RenderSurface, RenderedTrajectory, ViewState};
use crate::timer::{Scheduler, TimerHandle};
use crate::trajectory::{TrajectoryComparator, TrajectoryFilter, TrajectoryStore};

/// What one render pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderOutcome {
    /// Vehicles that landed on the canvas.
    pub rendered: usize,
    /// Whether the surface was erased and repainted.
    pub redrawn: bool,
}

/// Render counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub passes: u64,
    pub redraws: u64,
    /// Trajectories skipped because their geometry cannot be interpolated.
    pub skipped: u64,
}

/// What the surface shows: used to detect whether a repaint is needed.
#[derive(Debug, Clone, PartialEq)]
struct DrawnFrame {
    size: CanvasSize,
    pixels: Vec<(String, (i64, i64))>,
}

struct RenderState {
    surface: Box<dyn RenderSurface>,
    clock: VirtualClock,
    view: Option<ViewState>,
    pixel_ratio: f64,
    hover_id: Option<String>,
    running: bool,
    timer: Option<TimerHandle>,
    period: Option<Duration>,
    /// Last interpolated position per id, reused by no-interpolate passes.
    positions: HashMap<String, Interpolated>,
    /// Ids already reported as not interpolatable.
    unsupported: HashSet<String>,
    drawn: Option<DrawnFrame>,
    /// Forces the next pass to repaint.
    dirty: bool,
    rendered: Arc<Vec<RenderedTrajectory>>,
    stats: RenderStats,
}

struct SchedulerInner {
    store: Arc<TrajectoryStore>,
    timers: Arc<dyn Scheduler>,
    projector: Arc<dyn Projector>,
    min_tick: Duration,
    state: Mutex<RenderState>,
}

impl Drop for SchedulerInner {
    fn drop(&mut self) {
        if let Some(timer) = self.state.get_mut().timer.take() {
            timer.cancel();
        }
    }
}

/// Drives rendering of the trajectory store.
///
/// Each pass resolves "now" from the [`VirtualClock`], interpolates every
/// visible trajectory, projects it and repaints the surface only when a
/// rounded pixel position or the canvas size changed. The hovered vehicle is
/// drawn last.
///
/// Passes run on a timer whose period depends on zoom and speed (see
/// [`tick_period`]); the timer is restarted when either changes. A pass holds
/// the scheduler lock from start to finish, so two passes never overlap.
#[derive(Clone)]
pub struct RenderScheduler {
    inner: Arc<SchedulerInner>,
}

impl fmt::Debug for RenderScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("RenderScheduler")
            .field("running", &state.running)
            .field("view", &state.view)
            .field("period", &state.period)
            .field("stats", &state.stats)
            .finish_non_exhaustive()
    }
}

impl RenderScheduler {
    /// Create a stopped scheduler.
    pub fn new(
        config: &RenderConfig,
        store: Arc<TrajectoryStore>,
        timers: Arc<dyn Scheduler>,
        projector: Arc<dyn Projector>,
        surface: Box<dyn RenderSurface>,
    ) -> Self {
        let now = timers.now_ms();
        let mut clock = VirtualClock::replay(now, config.speed, now);
        clock.set_live(config.live, now);

        let state = RenderState {
            surface,
            clock,
            view: None,
            pixel_ratio: config.pixel_ratio,
            hover_id: None,
            running: false,
            timer: None,
            period: None,
            positions: HashMap::new(),
            unsupported: HashSet::new(),
            drawn: None,
            dirty: true,
            rendered: Arc::new(Vec::new()),
            stats: RenderStats::default(),
        };

        Self {
            inner: Arc::new(SchedulerInner {
                store,
                timers,
                projector,
                min_tick: config.min_tick,
                state: Mutex::new(state),
            }),
        }
    }

    /// Render immediately, then keep rendering on the timer.
    pub fn start(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.running {
                return;
            }
            state.running = true;
            state.dirty = true;
        }
        self.render_once(false);
        self.restart_timer();
    }

    /// Stop the timer and erase the canvas.
    pub fn stop(&self) {
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }
        state.running = false;
        state.period = None;

        let size = state
            .view
            .map(|v| v.size.scaled(state.pixel_ratio))
            .unwrap_or_default();
        state.surface.clear(size);
        state.rendered = Arc::new(Vec::new());
        state.drawn = None;
        state.positions.clear();
        debug!("Render scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Current tick period, while running.
    pub fn tick_period(&self) -> Option<Duration> {
        self.inner.state.lock().period
    }

    /// Vehicles placed by the last pass, in draw order.
    pub fn rendered_trajectories(&self) -> Arc<Vec<RenderedTrajectory>> {
        Arc::clone(&self.inner.state.lock().rendered)
    }

    pub fn view(&self) -> Option<ViewState> {
        self.inner.state.lock().view
    }

    pub fn stats(&self) -> RenderStats {
        self.inner.state.lock().stats
    }

    /// Update the view. Restarts the timer when the zoom changed.
    pub fn set_view(&self, view: ViewState) {
        let (zoom_changed, running) = {
            let mut state = self.inner.state.lock();
            let previous = state.view.replace(view);
            let zoom_changed = previous.map_or(true, |p| p.zoom != view.zoom);
            (zoom_changed, state.running)
        };
        if running {
            if zoom_changed {
                self.restart_timer();
            }
            self.render_once(true);
        }
    }

    fn restart_timer(&self) {
        let mut state = self.inner.state.lock();
        if !state.running {
            return;
        }
        if let Some(timer) = state.timer.take() {
            timer.cancel();
        }

        let zoom = state.view.map_or(f64::NAN, |v| v.zoom);
        let period = tick_period(zoom, state.clock.effective_speed(), self.inner.min_tick);
        let weak = Arc::downgrade(&self.inner);
        state.timer = Some(self.inner.timers.every(
            period,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    RenderScheduler { inner }.render_once(false);
                }
            }),
        ));
        state.period = Some(period);
        debug!(zoom, period_ms = period.as_millis() as u64, "Render timer restarted");
    }

    /// Run one render pass.
    ///
    /// With `no_interpolate`, the clock is not advanced and each vehicle keeps
    /// its last computed position (used to repaint after hover or view
    /// changes).
    pub fn render_once(&self, no_interpolate: bool) -> RenderOutcome {
        let real_now = self.inner.timers.now_ms();
        let mut guard = self.inner.state.lock();
        let state = &mut *guard;

        let Some(view) = state.view else {
            trace!("No view yet, nothing to render");
            return RenderOutcome::default();
        };

        let now = if no_interpolate {
            state.clock.now()
        } else {
            state.clock.tick(real_now)
        };
        state.stats.passes += 1;

        let visible = self.inner.store.visible();
        let mut seen = HashSet::with_capacity(visible.len());
        let mut rendered = Vec::with_capacity(visible.len());

        for trajectory in visible {
            seen.insert(trajectory.id.clone());

            let cached = if no_interpolate {
                state.positions.get(&trajectory.id).copied()
            } else {
                None
            };
            let position = match cached {
                Some(position) => position,
                None => match interpolate(&trajectory, now) {
                    Ok(Some(position)) => {
                        state.positions.insert(trajectory.id.clone(), position);
                        position
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        state.stats.skipped += 1;
                        if state.unsupported.insert(trajectory.id.clone()) {
                            warn!(id = %trajectory.id, error = %e, "Cannot interpolate trajectory");
                        }
                        continue;
                    }
                },
            };

            let Some(pixel) = self.inner.projector.project(position.coordinate, &view) else {
                continue;
            };
            rendered.push(RenderedTrajectory {
                trajectory,
                position,
                pixel: pixel.scaled(state.pixel_ratio),
            });
        }
        state.positions.retain(|id, _| seen.contains(id));
        state.unsupported.retain(|id| seen.contains(id));

        let frame = DrawnFrame {
            size: view.size.scaled(state.pixel_ratio),
            pixels: rendered
                .iter()
                .map(|r| (r.id().to_string(), r.pixel.rounded()))
                .collect(),
        };
        let redrawn = state.dirty || state.drawn.as_ref() != Some(&frame);

        if redrawn {
            state.surface.clear(frame.size);
            let hover = state.hover_id.as_deref();
            let mut hovered = None;
            for vehicle in &rendered {
                if Some(vehicle.id()) == hover {
                    hovered = Some(vehicle);
                    continue;
                }
                state.surface.draw(vehicle);
            }
            if let Some(vehicle) = hovered {
                state.surface.draw(vehicle);
            }
            state.drawn = Some(frame);
            state.dirty = false;
            state.stats.redraws += 1;
        }

        trace!(now, rendered = rendered.len(), redrawn, "Render pass");
        let outcome = RenderOutcome {
            rendered: rendered.len(),
            redrawn,
        };
        state.rendered = Arc::new(rendered);
        outcome
    }

    /// Mark the canvas stale and repaint from cached positions if running.
    fn invalidate(&self) {
        let running = {
            let mut state = self.inner.state.lock();
            state.dirty = true;
            state.running
        };
        if running {
            self.render_once(true);
        }
    }
}

impl TrackerSettings for RenderScheduler {
    fn set_filter(&self, filter: Option<TrajectoryFilter>) {
        self.inner.store.set_filter(filter);
        self.invalidate();
    }

    fn set_comparator(&self, comparator: Option<TrajectoryComparator>) {
        self.inner.store.set_comparator(comparator);
        self.invalidate();
    }

    fn set_hover_id(&self, id: Option<String>) {
        {
            let mut state = self.inner.state.lock();
            if state.hover_id == id {
                return;
            }
            state.hover_id = id;
        }
        self.invalidate();
    }

    fn hover_id(&self) -> Option<String> {
        self.inner.state.lock().hover_id.clone()
    }

    fn set_speed(&self, speed: f64) {
        let now = self.inner.timers.now_ms();
        self.inner.state.lock().clock.set_speed(speed, now);
        self.restart_timer();
    }

    fn speed(&self) -> f64 {
        self.inner.state.lock().clock.speed()
    }

    fn set_live(&self, live: bool) {
        let now = self.inner.timers.now_ms();
        self.inner.state.lock().clock.set_live(live, now);
        self.restart_timer();
    }

    fn is_live(&self) -> bool {
        self.inner.state.lock().clock.is_live()
    }

    fn set_pixel_ratio(&self, ratio: f64) {
        let ratio = if ratio.is_finite() && ratio > 0.0 { ratio } else { 1.0 };
        self.inner.state.lock().pixel_ratio = ratio;
        self.invalidate();
    }

    fn pixel_ratio(&self) -> f64 {
        self.inner.state.lock().pixel_ratio
    }

    fn set_current_time(&self, time_ms: i64) {
        let now = self.inner.timers.now_ms();
        let running = {
            let mut state = self.inner.state.lock();
            state.clock.set_time(time_ms, now);
            state.dirty = true;
            state.running
        };
        if running {
            self.render_once(false);
        }
    }

    fn current_time(&self) -> Option<i64> {
        Some(self.inner.state.lock().clock.now())
    }
}

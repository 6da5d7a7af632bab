//! The live tracker: realtime feed, trajectory store and renderer wired
//! together.
//!
//! ```text
//!   RealtimeClient ── trajectory ───────► TrajectoryStore::apply/remove
//!                  └─ deleted_vehicles ─►         │
//!                                                 ▼
//!   host view ──► LiveTracker::set_view ──► RenderScheduler ──► RenderSurface
//!                        └──► BBOX
//! ```
//!
//! Settings (filter, sort, hover, speed, ...) may be changed before a
//! renderer is attached; they are held in [`SettingsHolder`] and applied on
//! [`LiveTracker::attach_renderer`].

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::realtime::{Extent, RealtimeClient, RealtimeMode, Subscription};
use crate::render::{
    PendingSettings, Projector, RenderConfig, RenderScheduler, RenderSurface, RenderedTrajectory,
    SettingsHolder, ViewState,
};
use crate::trajectory::{TrajectorySnapshot, TrajectoryStore};

struct ActiveStreams {
    mode: RealtimeMode,
    trajectories: Subscription,
    deletions: Subscription,
}

/// Live vehicle tracking on top of one realtime connection.
pub struct LiveTracker {
    client: RealtimeClient,
    store: Arc<TrajectoryStore>,
    render_config: RenderConfig,
    settings: SettingsHolder,
    scheduler: Mutex<Option<RenderScheduler>>,
    streams: Mutex<Option<ActiveStreams>>,
}

impl LiveTracker {
    pub fn new(client: RealtimeClient, render_config: RenderConfig) -> Self {
        let settings = SettingsHolder::new(PendingSettings::new(&render_config));
        Self {
            client,
            store: Arc::new(TrajectoryStore::new()),
            render_config,
            settings,
            scheduler: Mutex::new(None),
            streams: Mutex::new(None),
        }
    }

    pub fn client(&self) -> &RealtimeClient {
        &self.client
    }

    pub fn store(&self) -> &Arc<TrajectoryStore> {
        &self.store
    }

    /// Filter, sort, hover and clock settings.
    ///
    /// Usable before a renderer is attached.
    pub fn settings(&self) -> &SettingsHolder {
        &self.settings
    }

    /// The attached renderer, if any.
    pub fn scheduler(&self) -> Option<RenderScheduler> {
        self.scheduler.lock().clone()
    }

    /// Create the renderer and apply pending settings to it.
    ///
    /// A previously attached renderer is stopped. If the tracker is running,
    /// the new renderer starts right away.
    pub fn attach_renderer(
        &self,
        projector: Arc<dyn Projector>,
        surface: Box<dyn RenderSurface>,
    ) -> RenderScheduler {
        let scheduler = RenderScheduler::new(
            &self.render_config,
            Arc::clone(&self.store),
            self.client.timers(),
            projector,
            surface,
        );
        if let Some(previous) = self.scheduler.lock().replace(scheduler.clone()) {
            previous.stop();
        }
        self.settings.attach(Arc::new(scheduler.clone()));
        if self.is_running() {
            scheduler.start();
        }
        debug!("Renderer attached");
        scheduler
    }

    pub fn is_running(&self) -> bool {
        self.streams.lock().is_some()
    }

    /// Mode of the running streams.
    pub fn mode(&self) -> Option<RealtimeMode> {
        self.streams.lock().as_ref().map(|s| s.mode)
    }

    /// Subscribe to the vehicle streams of `mode` and start rendering.
    ///
    /// Restarting with another mode drops the previous mode's streams only.
    pub fn start(&self, mode: RealtimeMode) {
        if self.mode() == Some(mode) {
            return;
        }
        self.stop_streams();

        let store = Arc::clone(&self.store);
        let trajectories = self
            .client
            .subscribe_trajectory_batches(mode, move |batch| {
                store.apply(batch);
            });
        let store = Arc::clone(&self.store);
        let deletions = self.client.subscribe_deleted_vehicles(mode, move |id| {
            store.remove(&id);
        });

        *self.streams.lock() = Some(ActiveStreams {
            mode,
            trajectories,
            deletions,
        });
        if let Some(scheduler) = self.scheduler() {
            scheduler.start();
        }
        info!(mode = %mode, "Tracker started");
    }

    /// Unsubscribe, stop rendering and forget all vehicles.
    pub fn stop(&self) {
        let was_running = self.stop_streams();
        if let Some(scheduler) = self.scheduler() {
            scheduler.stop();
        }
        self.store.clear();
        if was_running {
            info!("Tracker stopped");
        }
    }

    fn stop_streams(&self) -> bool {
        let Some(streams) = self.streams.lock().take() else {
            return false;
        };
        self.client.unsubscribe(&streams.trajectories);
        self.client.unsubscribe(&streams.deletions);
        true
    }

    /// Update the map view: re-render and restrict the feed to the extent.
    pub fn set_view(&self, view: ViewState) {
        if let Some(scheduler) = self.scheduler() {
            scheduler.set_view(view);
        }
        self.client.set_bbox(view_extent(&view));
    }

    /// Vehicles placed by the last render pass.
    pub fn rendered_trajectories(&self) -> Arc<Vec<RenderedTrajectory>> {
        self.scheduler()
            .map(|s| s.rendered_trajectories())
            .unwrap_or_default()
    }

    /// All known vehicles.
    pub fn trajectories(&self) -> TrajectorySnapshot {
        self.store.trajectories()
    }
}

impl Drop for LiveTracker {
    fn drop(&mut self) {
        if let Some(scheduler) = self.scheduler.get_mut().take() {
            scheduler.stop();
        }
    }
}

/// Bounding box of the (possibly rotated) view in map coordinates.
fn view_extent(view: &ViewState) -> Extent {
    let width = f64::from(view.size.width) * view.resolution;
    let height = f64::from(view.size.height) * view.resolution;
    let (sin, cos) = view.rotation.sin_cos();
    let half_x = (width * cos.abs() + height * sin.abs()) / 2.0;
    let half_y = (width * sin.abs() + height * cos.abs()) / 2.0;
    Extent::new(
        view.center.x - half_x,
        view.center.y - half_y,
        view.center.x + half_x,
        view.center.y + half_y,
    )
}

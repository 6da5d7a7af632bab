//! Tracker settings that can be set before a renderer exists.
//!
//! A host usually configures filter, sort order or hover before the map is
//! ready. [`SettingsHolder`] starts out storing those values in
//! [`PendingSettings`] and, on [`SettingsHolder::attach`], applies them to the
//! live [`RenderScheduler`](super::RenderScheduler) and delegates from then on.
//!
//! ```text
//!   set_* ──► SettingsHolder ──► Pending(PendingSettings)
//!                    │ attach(live): apply all pending values
//!                    ▼
//!             Live(Arc<dyn TrackerSettings>)
//! ```

use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;

use super::config::RenderConfig;
use crate::trajectory::{TrajectoryComparator, TrajectoryFilter};

/// Settings shared by the pending and the live configuration.
pub trait TrackerSettings: Send + Sync {
    fn set_filter(&self, filter: Option<TrajectoryFilter>);
    fn set_comparator(&self, comparator: Option<TrajectoryComparator>);
    fn set_hover_id(&self, id: Option<String>);
    fn hover_id(&self) -> Option<String>;
    fn set_speed(&self, speed: f64);
    fn speed(&self) -> f64;
    fn set_live(&self, live: bool);
    fn is_live(&self) -> bool;
    fn set_pixel_ratio(&self, ratio: f64);
    fn pixel_ratio(&self) -> f64;
    /// Jump the clock to `time_ms`.
    fn set_current_time(&self, time_ms: i64);
    /// Clock time, or the requested time while pending (if any).
    fn current_time(&self) -> Option<i64>;
}

#[derive(Clone)]
struct PendingValues {
    filter: Option<TrajectoryFilter>,
    comparator: Option<TrajectoryComparator>,
    hover_id: Option<String>,
    speed: f64,
    live: bool,
    pixel_ratio: f64,
    current_time: Option<i64>,
}

/// Settings recorded before a renderer is attached.
pub struct PendingSettings {
    values: Mutex<PendingValues>,
}

impl PendingSettings {
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            values: Mutex::new(PendingValues {
                filter: None,
                comparator: None,
                hover_id: None,
                speed: config.speed,
                live: config.live,
                pixel_ratio: config.pixel_ratio,
                current_time: None,
            }),
        }
    }

    /// Copy every value onto `target`.
    ///
    /// Live mode is applied before the speed and time so that a requested
    /// replay time is not overwritten by the wall clock.
    pub fn apply_to(&self, target: &dyn TrackerSettings) {
        let values = self.values.lock().clone();
        target.set_live(values.live);
        target.set_speed(values.speed);
        if let Some(time) = values.current_time {
            target.set_current_time(time);
        }
        target.set_pixel_ratio(values.pixel_ratio);
        target.set_filter(values.filter);
        target.set_comparator(values.comparator);
        target.set_hover_id(values.hover_id);
    }
}

impl Default for PendingSettings {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}

impl fmt::Debug for PendingSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let values = self.values.lock();
        f.debug_struct("PendingSettings")
            .field("has_filter", &values.filter.is_some())
            .field("has_comparator", &values.comparator.is_some())
            .field("hover_id", &values.hover_id)
            .field("speed", &values.speed)
            .field("live", &values.live)
            .field("pixel_ratio", &values.pixel_ratio)
            .field("current_time", &values.current_time)
            .finish()
    }
}

impl TrackerSettings for PendingSettings {
    fn set_filter(&self, filter: Option<TrajectoryFilter>) {
        self.values.lock().filter = filter;
    }

    fn set_comparator(&self, comparator: Option<TrajectoryComparator>) {
        self.values.lock().comparator = comparator;
    }

    fn set_hover_id(&self, id: Option<String>) {
        self.values.lock().hover_id = id;
    }

    fn hover_id(&self) -> Option<String> {
        self.values.lock().hover_id.clone()
    }

    fn set_speed(&self, speed: f64) {
        self.values.lock().speed = speed;
    }

    fn speed(&self) -> f64 {
        self.values.lock().speed
    }

    fn set_live(&self, live: bool) {
        self.values.lock().live = live;
    }

    fn is_live(&self) -> bool {
        self.values.lock().live
    }

    fn set_pixel_ratio(&self, ratio: f64) {
        self.values.lock().pixel_ratio = ratio;
    }

    fn pixel_ratio(&self) -> f64 {
        self.values.lock().pixel_ratio
    }

    fn set_current_time(&self, time_ms: i64) {
        self.values.lock().current_time = Some(time_ms);
    }

    fn current_time(&self) -> Option<i64> {
        self.values.lock().current_time
    }
}

enum SettingsState {
    Pending(Arc<PendingSettings>),
    Live(Arc<dyn TrackerSettings>),
}

/// One settings interface over a pending or a live backing.
pub struct SettingsHolder {
    state: RwLock<SettingsState>,
}

impl SettingsHolder {
    pub fn new(pending: PendingSettings) -> Self {
        Self {
            state: RwLock::new(SettingsState::Pending(Arc::new(pending))),
        }
    }

    /// Switch to `live`, applying pending values first.
    ///
    /// Attaching again replaces the live backing without copying anything.
    pub fn attach(&self, live: Arc<dyn TrackerSettings>) {
        let mut state = self.state.write();
        if let SettingsState::Pending(pending) = &*state {
            debug!(?pending, "Applying pending tracker settings");
            pending.apply_to(live.as_ref());
        }
        *state = SettingsState::Live(live);
    }

    pub fn is_attached(&self) -> bool {
        matches!(*self.state.read(), SettingsState::Live(_))
    }

    fn current(&self) -> Arc<dyn TrackerSettings> {
        match &*self.state.read() {
            SettingsState::Pending(pending) => Arc::clone(pending) as Arc<dyn TrackerSettings>,
            SettingsState::Live(live) => Arc::clone(live),
        }
    }
}

impl Default for SettingsHolder {
    fn default() -> Self {
        Self::new(PendingSettings::default())
    }
}

impl fmt::Debug for SettingsHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SettingsHolder")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl TrackerSettings for SettingsHolder {
    fn set_filter(&self, filter: Option<TrajectoryFilter>) {
        self.current().set_filter(filter);
    }

    fn set_comparator(&self, comparator: Option<TrajectoryComparator>) {
        self.current().set_comparator(comparator);
    }

    fn set_hover_id(&self, id: Option<String>) {
        self.current().set_hover_id(id);
    }

    fn hover_id(&self) -> Option<String> {
        self.current().hover_id()
    }

    fn set_speed(&self, speed: f64) {
        self.current().set_speed(speed);
    }

    fn speed(&self) -> f64 {
        self.current().speed()
    }

    fn set_live(&self, live: bool) {
        self.current().set_live(live);
    }

    fn is_live(&self) -> bool {
        self.current().is_live()
    }

    fn set_pixel_ratio(&self, ratio: f64) {
        self.current().set_pixel_ratio(ratio);
    }

    fn pixel_ratio(&self) -> f64 {
        self.current().pixel_ratio()
    }

    fn set_current_time(&self, time_ms: i64) {
        self.current().set_current_time(time_ms);
    }

    fn current_time(&self) -> Option<i64> {
        self.current().current_time()
    }
}

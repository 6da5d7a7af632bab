//! The working set of trajectories.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::model::{Trajectory, TrajectoryMessage};

/// Predicate deciding which trajectories are interpolated and drawn.
pub type TrajectoryFilter = Arc<dyn Fn(&Trajectory) -> bool + Send + Sync>;

/// Ordering applied whenever the set changes. Drives draw order.
pub type TrajectoryComparator = Arc<dyn Fn(&Trajectory, &Trajectory) -> Ordering + Send + Sync>;

/// An immutable view of the set at one point in time.
pub type TrajectorySnapshot = Arc<Vec<Arc<Trajectory>>>;

/// Holds the current trajectories.
///
/// Every update builds a new list and swaps it in under the write lock, so a
/// render pass holding a [`TrajectorySnapshot`] never sees a half-applied
/// message. The comparator is a stable sort applied on every update; without
/// one, arrival order is kept.
#[derive(Default)]
pub struct TrajectoryStore {
    trajectories: RwLock<TrajectorySnapshot>,
    filter: RwLock<Option<TrajectoryFilter>>,
    comparator: RwLock<Option<TrajectoryComparator>>,
}

impl fmt::Debug for TrajectoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrajectoryStore")
            .field("trajectories", &self.trajectories.read().len())
            .field("filter", &self.filter.read().is_some())
            .field("comparator", &self.comparator.read().is_some())
            .finish()
    }
}

impl TrajectoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn sorted(&self, mut list: Vec<Arc<Trajectory>>) -> Vec<Arc<Trajectory>> {
        if let Some(compare) = self.comparator.read().as_ref() {
            list.sort_by(|a, b| compare(a.as_ref(), b.as_ref()));
        }
        list
    }

    fn update(&self, f: impl FnOnce(&mut Vec<Arc<Trajectory>>)) {
        let mut guard = self.trajectories.write();
        let mut list: Vec<Arc<Trajectory>> = (**guard).clone();
        f(&mut list);
        *guard = Arc::new(self.sorted(list));
    }

    /// Replace the whole set.
    pub fn set_trajectories(&self, trajectories: Vec<Trajectory>) {
        let list = trajectories.into_iter().map(Arc::new).collect();
        let list = self.sorted(list);
        debug!(count = list.len(), "Trajectories replaced");
        *self.trajectories.write() = Arc::new(list);
    }

    /// Every trajectory, filtered or not.
    pub fn trajectories(&self) -> TrajectorySnapshot {
        self.trajectories.read().clone()
    }

    /// Trajectories passing the filter, in comparator order.
    pub fn visible(&self) -> Vec<Arc<Trajectory>> {
        let snapshot = self.trajectories();
        match self.filter.read().as_ref() {
            Some(filter) => snapshot.iter().filter(|t| filter(t.as_ref())).cloned().collect(),
            None => snapshot.as_ref().clone(),
        }
    }

    /// Look up one trajectory.
    pub fn get(&self, id: &str) -> Option<Arc<Trajectory>> {
        self.trajectories.read().iter().find(|t| t.id == id).cloned()
    }

    /// Insert a trajectory or replace the one with the same id.
    pub fn upsert(&self, trajectory: Trajectory) {
        let trajectory = Arc::new(trajectory);
        self.update(|list| match list.iter_mut().find(|t| t.id == trajectory.id) {
            Some(existing) => *existing = trajectory,
            None => list.push(trajectory),
        });
    }

    /// Apply every message of one frame in a single swap.
    ///
    /// Later messages for the same id win. Returns the resulting size.
    pub fn apply(&self, messages: Vec<TrajectoryMessage>) -> usize {
        let mut size = 0;
        self.update(|list| {
            for message in messages {
                match message {
                    TrajectoryMessage::Upsert(trajectory) => {
                        let trajectory = Arc::new(trajectory);
                        match list.iter_mut().find(|t| t.id == trajectory.id) {
                            Some(existing) => *existing = trajectory,
                            None => list.push(trajectory),
                        }
                    }
                    TrajectoryMessage::Delete(id) => list.retain(|t| t.id != id),
                }
            }
            size = list.len();
        });
        size
    }

    /// Remove a trajectory. Returns whether it was present.
    pub fn remove(&self, id: &str) -> bool {
        if self.get(id).is_none() {
            return false;
        }
        self.update(|list| list.retain(|t| t.id != id));
        true
    }

    /// Drop trajectories whose last sample is before `cutoff_ms`.
    ///
    /// Trajectories without samples are kept. Returns the number removed.
    pub fn purge_older_than(&self, cutoff_ms: i64) -> usize {
        let mut removed = 0;
        self.update(|list| {
            let before = list.len();
            list.retain(|t| t.last_time_ms().map_or(true, |last| last >= cutoff_ms));
            removed = before - list.len();
        });
        if removed > 0 {
            debug!(removed, cutoff_ms, "Purged stale trajectories");
        }
        removed
    }

    /// Install or clear the filter.
    pub fn set_filter(&self, filter: Option<TrajectoryFilter>) {
        *self.filter.write() = filter;
    }

    /// Whether a filter is installed.
    pub fn has_filter(&self) -> bool {
        self.filter.read().is_some()
    }

    /// Install or clear the comparator. Re-sorts the current set.
    pub fn set_comparator(&self, comparator: Option<TrajectoryComparator>) {
        *self.comparator.write() = comparator;
        self.update(|_| {});
    }

    /// Number of trajectories.
    pub fn len(&self) -> usize {
        self.trajectories.read().len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.trajectories.read().is_empty()
    }

    /// Remove everything.
    pub fn clear(&self) {
        *self.trajectories.write() = Arc::new(Vec::new());
    }
}

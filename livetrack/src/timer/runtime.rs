//! Tokio-backed scheduler.

use std::time::Duration;

use tokio::runtime::Handle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::trace;

use super::{OnceTask, RepeatingTask, Scheduler, TimerHandle};

/// Shortest period accepted by [`TokioScheduler::every`].
const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Scheduler that runs tasks on a Tokio runtime.
///
/// Repeating tasks use an interval with [`MissedTickBehavior::Skip`], so a
/// task that overruns its period skips ticks instead of queueing them up.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Create a scheduler spawning onto the given runtime.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Create a scheduler for the runtime we are currently inside, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Scheduler for TokioScheduler {
    fn now_ms(&self) -> i64 {
        chrono::Utc::now().timestamp_millis()
    }

    fn after(&self, delay: Duration, task: OnceTask) -> TimerHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();

        self.handle.spawn(async move {
            tokio::select! {
                biased;

                _ = cancelled.cancelled() => {
                    trace!("One-shot timer cancelled");
                }

                _ = tokio::time::sleep(delay) => {
                    task();
                }
            }
        });

        TimerHandle::new(token)
    }

    fn every(&self, period: Duration, mut task: RepeatingTask) -> TimerHandle {
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let period = period.max(MIN_PERIOD);

        self.handle.spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;

                    _ = cancelled.cancelled() => {
                        trace!("Repeating timer cancelled");
                        break;
                    }

                    _ = interval.tick() => {
                        task();
                    }
                }
            }
        });

        TimerHandle::new(token)
    }
}

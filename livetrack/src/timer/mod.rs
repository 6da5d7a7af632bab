//! Injectable timer capability.
//!
//! Everything time-based in the crate (keep-alive pings, reconnect delays, the
//! render cadence) goes through the [`Scheduler`] trait instead of spawning
//! timers directly. Production code binds to [`TokioScheduler`]; tests bind to
//! [`ManualScheduler`], a virtual clock that only moves when told to.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use livetrack::timer::{ManualScheduler, Scheduler};
//!
//! let scheduler = ManualScheduler::new(0);
//! let handle = scheduler.after(Duration::from_millis(100), Box::new(|| println!("fired")));
//!
//! scheduler.advance(Duration::from_millis(100)); // prints "fired"
//! handle.cancel(); // no-op, already fired
//! ```

mod manual;
mod runtime;

pub use manual::ManualScheduler;
pub use runtime::TokioScheduler;

use std::time::Duration;

use tokio_util::sync::CancellationToken;

/// A one-shot task.
pub type OnceTask = Box<dyn FnOnce() + Send + 'static>;

/// A repeating task.
pub type RepeatingTask = Box<dyn FnMut() + Send + 'static>;

/// Cancellation handle for a scheduled task.
///
/// Dropping the handle does NOT cancel the task; call [`TimerHandle::cancel`].
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    /// Cancel the task. Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Whether the task has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

/// Timer capability consumed by the realtime client and the render scheduler.
pub trait Scheduler: Send + Sync {
    /// Current wall-clock time in epoch milliseconds.
    fn now_ms(&self) -> i64;

    /// Run `task` once after `delay`.
    fn after(&self, delay: Duration, task: OnceTask) -> TimerHandle;

    /// Run `task` every `period`, first run one period from now.
    ///
    /// A new run never starts before the previous one returned.
    fn every(&self, period: Duration, task: RepeatingTask) -> TimerHandle;
}

//! Manually advanced scheduler for deterministic tests.

use std::fmt;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use super::{OnceTask, RepeatingTask, Scheduler, TimerHandle};

enum TaskKind {
    Once(OnceTask),
    Every { period_ms: i64, task: RepeatingTask },
}

struct ManualTask {
    due_ms: i64,
    seq: u64,
    token: CancellationToken,
    kind: TaskKind,
}

struct ManualInner {
    now_ms: i64,
    next_seq: u64,
    tasks: Vec<ManualTask>,
}

impl ManualInner {
    fn push(&mut self, due_ms: i64, token: CancellationToken, kind: TaskKind) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.tasks.push(ManualTask {
            due_ms,
            seq,
            token,
            kind,
        });
    }

    /// Remove and return the earliest task due at or before `target`.
    fn pop_due(&mut self, target: i64) -> Option<ManualTask> {
        self.tasks.retain(|t| !t.token.is_cancelled());
        let index = self
            .tasks
            .iter()
            .enumerate()
            .filter(|(_, t)| t.due_ms <= target)
            .min_by_key(|(_, t)| (t.due_ms, t.seq))
            .map(|(i, _)| i)?;
        Some(self.tasks.swap_remove(index))
    }
}

/// A virtual clock whose timers fire only when [`advance`](Self::advance) is called.
///
/// Tasks run in due order (ties broken by scheduling order) and run without
/// the internal lock held, so a task may schedule or cancel other tasks.
pub struct ManualScheduler {
    inner: Mutex<ManualInner>,
}

impl fmt::Debug for ManualScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ManualScheduler")
            .field("now_ms", &inner.now_ms)
            .field("pending", &inner.tasks.len())
            .finish()
    }
}

impl ManualScheduler {
    /// Create a scheduler whose clock starts at `start_ms` (epoch milliseconds).
    pub fn new(start_ms: i64) -> Self {
        Self {
            inner: Mutex::new(ManualInner {
                now_ms: start_ms,
                next_seq: 0,
                tasks: Vec::new(),
            }),
        }
    }

    /// Move the clock forward, running every task that becomes due.
    pub fn advance(&self, by: Duration) {
        let target = self.inner.lock().now_ms + by.as_millis() as i64;

        loop {
            let task = {
                let mut inner = self.inner.lock();
                match inner.pop_due(target) {
                    Some(task) => {
                        inner.now_ms = inner.now_ms.max(task.due_ms);
                        task
                    }
                    None => {
                        inner.now_ms = target;
                        return;
                    }
                }
            };

            match task.kind {
                TaskKind::Once(run) => run(),
                TaskKind::Every {
                    period_ms,
                    task: mut run,
                } => {
                    run();
                    if !task.token.is_cancelled() {
                        let mut inner = self.inner.lock();
                        inner.push(
                            task.due_ms + period_ms,
                            task.token,
                            TaskKind::Every {
                                period_ms,
                                task: run,
                            },
                        );
                    }
                }
            }
        }
    }

    /// Number of scheduled, not cancelled tasks.
    pub fn pending(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .tasks
            .iter()
            .filter(|t| !t.token.is_cancelled())
            .count()
    }
}

impl Scheduler for ManualScheduler {
    fn now_ms(&self) -> i64 {
        self.inner.lock().now_ms
    }

    fn after(&self, delay: Duration, task: OnceTask) -> TimerHandle {
        let token = CancellationToken::new();
        let mut inner = self.inner.lock();
        let due = inner.now_ms + delay.as_millis() as i64;
        inner.push(due, token.clone(), TaskKind::Once(task));
        TimerHandle::new(token)
    }

    fn every(&self, period: Duration, task: RepeatingTask) -> TimerHandle {
        let token = CancellationToken::new();
        let period_ms = (period.as_millis() as i64).max(1);
        let mut inner = self.inner.lock();
        let due = inner.now_ms + period_ms;
        inner.push(due, token.clone(), TaskKind::Every { period_ms, task });
        TimerHandle::new(token)
    }
}

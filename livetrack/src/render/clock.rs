//! The render scheduler's notion of "now".

/// A clock that either follows wall-clock time or runs at a multiple of it.
///
/// All times are epoch milliseconds. In live mode [`tick`](Self::tick)
/// returns the wall-clock time it is given and ignores the speed.
#[derive(Debug, Clone, PartialEq)]
pub struct VirtualClock {
    current_ms: f64,
    last_real_ms: i64,
    speed: f64,
    live: bool,
}

impl VirtualClock {
    /// A live clock.
    pub fn live(real_now_ms: i64) -> Self {
        Self {
            current_ms: real_now_ms as f64,
            last_real_ms: real_now_ms,
            speed: 1.0,
            live: true,
        }
    }

    /// A clock starting at `start_ms` and running at `speed`.
    pub fn replay(start_ms: i64, speed: f64, real_now_ms: i64) -> Self {
        Self {
            current_ms: start_ms as f64,
            last_real_ms: real_now_ms,
            speed: sanitize_speed(speed),
            live: false,
        }
    }

    /// Advance to `real_now_ms` and return the new current time.
    pub fn tick(&mut self, real_now_ms: i64) -> i64 {
        if self.live {
            self.current_ms = real_now_ms as f64;
        } else {
            let elapsed = (real_now_ms - self.last_real_ms) as f64;
            self.current_ms += elapsed * self.speed;
        }
        self.last_real_ms = real_now_ms;
        self.now()
    }

    /// Current time as of the last tick.
    pub fn now(&self) -> i64 {
        self.current_ms.round() as i64
    }

    /// Jump to `time_ms`.
    pub fn set_time(&mut self, time_ms: i64, real_now_ms: i64) {
        self.current_ms = time_ms as f64;
        self.last_real_ms = real_now_ms;
    }

    /// Change the speed; elapsed time so far runs at the old speed.
    pub fn set_speed(&mut self, speed: f64, real_now_ms: i64) {
        self.tick(real_now_ms);
        self.speed = sanitize_speed(speed);
    }

    /// Switch between live and virtual time.
    pub fn set_live(&mut self, live: bool, real_now_ms: i64) {
        self.tick(real_now_ms);
        self.live = live;
    }

    pub fn speed(&self) -> f64 {
        self.speed
    }

    pub fn is_live(&self) -> bool {
        self.live
    }

    /// Speed the tick cadence should assume: 1 when live.
    pub fn effective_speed(&self) -> f64 {
        if self.live {
            1.0
        } else {
            self.speed
        }
    }
}

fn sanitize_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    }
}

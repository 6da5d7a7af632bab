//! Configuration for the render scheduler.

use std::time::Duration;

/// Shortest tick period.
pub const DEFAULT_MIN_TICK: Duration = Duration::from_millis(25);

/// Configuration for the render scheduler.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderConfig {
    /// Follow wall-clock time.
    pub live: bool,

    /// Clock speed multiplier when not live.
    pub speed: f64,

    /// Lower bound of the tick period.
    pub min_tick: Duration,

    /// Device pixels per CSS pixel.
    pub pixel_ratio: f64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            live: true,
            speed: 1.0,
            min_tick: DEFAULT_MIN_TICK,
            pixel_ratio: 1.0,
        }
    }
}

impl RenderConfig {
    /// Follow wall-clock time, or run the virtual clock.
    pub fn with_live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    /// Set the clock speed multiplier.
    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = speed;
        self
    }

    /// Set the shortest tick period.
    pub fn with_min_tick(mut self, min_tick: Duration) -> Self {
        self.min_tick = min_tick;
        self
    }

    /// Set the pixel ratio.
    pub fn with_pixel_ratio(mut self, ratio: f64) -> Self {
        self.pixel_ratio = ratio;
        self
    }
}

//! Tick period by zoom level.
//!
//! At low zoom a vehicle moves less than a pixel between frequent ticks, so
//! the period grows as the map zooms out.

use std::time::Duration;

/// Milliseconds of clock time per tick, indexed by rounded zoom level.
pub const ZOOM_TIME_STEPS: [u64; 21] = [
    100_000, 50_000, 40_000, 30_000, 20_000, 15_000, 10_000, 5_000, 2_000, 1_000, 400, 300, 250,
    180, 90, 60, 50, 50, 50, 50, 50,
];

/// Step used for zooms outside the table.
pub const DEFAULT_TIME_STEP: u64 = 25;

/// Clock step for `zoom`.
pub fn zoom_time_step(zoom: f64) -> u64 {
    if !zoom.is_finite() {
        return DEFAULT_TIME_STEP;
    }
    let level = zoom.round();
    if level < 0.0 || level >= ZOOM_TIME_STEPS.len() as f64 {
        return DEFAULT_TIME_STEP;
    }
    ZOOM_TIME_STEPS[level as usize]
}

/// `max(min_tick, zoom_time_step(zoom) / speed)`.
pub fn tick_period(zoom: f64, speed: f64, min_tick: Duration) -> Duration {
    let speed = if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    };
    let step_ms = zoom_time_step(zoom) as f64 / speed;
    Duration::from_micros((step_ms * 1_000.0).round() as u64).max(min_tick)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: Duration = Duration::from_millis(25);

    #[test]
    fn test_zoom_time_step_table() {
        assert_eq!(zoom_time_step(0.0), 100_000);
        assert_eq!(zoom_time_step(9.4), 1_000);
        assert_eq!(zoom_time_step(9.6), 400);
        assert_eq!(zoom_time_step(20.0), 50);
    }

    #[test]
    fn test_zoom_outside_table_uses_default() {
        assert_eq!(zoom_time_step(21.0), DEFAULT_TIME_STEP);
        assert_eq!(zoom_time_step(-1.0), DEFAULT_TIME_STEP);
        assert_eq!(zoom_time_step(f64::NAN), DEFAULT_TIME_STEP);
    }

    #[test]
    fn test_tick_period() {
        assert_eq!(tick_period(14.0, 1.0, MIN), Duration::from_millis(90));
        assert_eq!(tick_period(14.0, 2.0, MIN), Duration::from_millis(45));
        assert_eq!(tick_period(14.0, 100.0, MIN), MIN);
        assert_eq!(tick_period(5.0, 0.0, MIN), Duration::from_secs(15));
    }
}

//! Configuration for the realtime client.

use std::time::Duration;

use super::mode::RealtimeMode;

/// Default server URL.
pub const DEFAULT_URL: &str = "ws://localhost:8080/ws";

/// Default keep-alive interval.
pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(10);

/// Default delay before reconnecting after an unexpected close.
pub const DEFAULT_RECONNECT_TIMEOUT: Duration = Duration::from_millis(100);

/// Default departure window, minutes either side of now.
pub const DEFAULT_MAX_DEPARTURE_AGE_MIN: u32 = 30;

/// Configuration for the realtime client.
#[derive(Debug, Clone, PartialEq)]
pub struct RealtimeConfig {
    /// WebSocket URL of the realtime server.
    pub url: String,

    /// Mode used by the tracker's vehicle streams.
    pub mode: RealtimeMode,

    /// Projection code sent on open, e.g. `EPSG:3857`.
    pub projection: Option<String>,

    /// `PING` interval.
    pub ping_interval: Duration,

    /// Delay before reconnecting after an unexpected close.
    pub reconnect_timeout: Duration,

    /// Whether to reconnect after an unexpected close at all.
    pub reconnect: bool,

    /// Viewport margin `(dx, dy)` sent on open.
    pub buffer: Option<(f64, f64)>,

    /// Departures further than this many minutes from now are dropped.
    pub max_departure_age_min: u32,

    /// Sort departures by the earlier of arrival and departure time.
    pub sort_by_min_arrival_time: bool,
}

impl Default for RealtimeConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            mode: RealtimeMode::default(),
            projection: None,
            ping_interval: DEFAULT_PING_INTERVAL,
            reconnect_timeout: DEFAULT_RECONNECT_TIMEOUT,
            reconnect: true,
            buffer: None,
            max_departure_age_min: DEFAULT_MAX_DEPARTURE_AGE_MIN,
            sort_by_min_arrival_time: false,
        }
    }
}

impl RealtimeConfig {
    /// Create a configuration for the server at `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Set the vehicle stream mode.
    pub fn with_mode(mut self, mode: RealtimeMode) -> Self {
        self.mode = mode;
        self
    }

    /// Set the projection sent on open.
    pub fn with_projection(mut self, code: impl Into<String>) -> Self {
        self.projection = Some(code.into());
        self
    }

    /// Set the keep-alive interval.
    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval = interval;
        self
    }

    /// Set the reconnect delay.
    pub fn with_reconnect_timeout(mut self, timeout: Duration) -> Self {
        self.reconnect_timeout = timeout;
        self
    }

    /// Enable or disable reconnecting.
    pub fn with_reconnect(mut self, reconnect: bool) -> Self {
        self.reconnect = reconnect;
        self
    }

    /// Set the viewport margin sent on open.
    pub fn with_buffer(mut self, dx: f64, dy: f64) -> Self {
        self.buffer = Some((dx, dy));
        self
    }

    /// Set the departure window.
    pub fn with_max_departure_age_min(mut self, minutes: u32) -> Self {
        self.max_departure_age_min = minutes;
        self
    }

    /// Sort departures by the earlier of arrival and departure time.
    pub fn with_sort_by_min_arrival_time(mut self, enabled: bool) -> Self {
        self.sort_by_min_arrival_time = enabled;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RealtimeConfig::default();
        assert_eq!(config.ping_interval, Duration::from_secs(10));
        assert_eq!(config.reconnect_timeout, Duration::from_millis(100));
        assert!(config.reconnect);
        assert_eq!(config.max_departure_age_min, 30);
        assert!(config.projection.is_none());
    }

    #[test]
    fn test_builder_pattern() {
        let config = RealtimeConfig::new("wss://realtime.example.com/ws")
            .with_mode(RealtimeMode::Schematic)
            .with_projection("EPSG:3857")
            .with_buffer(100.0, 100.0)
            .with_reconnect(false)
            .with_sort_by_min_arrival_time(true);

        assert_eq!(config.url, "wss://realtime.example.com/ws");
        assert_eq!(config.mode, RealtimeMode::Schematic);
        assert_eq!(config.projection.as_deref(), Some("EPSG:3857"));
        assert_eq!(config.buffer, Some((100.0, 100.0)));
        assert!(!config.reconnect);
        assert!(config.sort_by_min_arrival_time);
    }
}

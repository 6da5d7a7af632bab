//! Integration tests for the live tracker.
//!
//! These tests verify the complete flow:
//! - socket frame → trajectory store → render pass → surface
//! - interpolation at and beyond the sample boundaries
//! - departure board derivation
//!
//! Run with: `cargo test --test tracker_integration`

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use livetrack::realtime::{
    derive_departures, Departure, DepartureOptions, RealtimeClient, RealtimeConfig, RealtimeMode,
};
use livetrack::render::{
    interpolate, CanvasSize, RecordingSurface, RenderConfig, TrackerSettings, ViewState,
    ViewportProjector,
};
use livetrack::timer::ManualScheduler;
use livetrack::trajectory::{Coordinate, Geometry, Polyline, TimeInterval, Trajectory};
use livetrack::transport::{MockSocket, SocketEventKind};
use livetrack::LiveTracker;

// ============================================================================
// Helper Functions
// ============================================================================

const START_MS: i64 = 1_700_000_000_000;

struct Setup {
    tracker: LiveTracker,
    mock: MockSocket,
    timers: Arc<ManualScheduler>,
    surface: RecordingSurface,
}

impl Setup {
    fn new() -> Self {
        let mock = MockSocket::new();
        let timers = Arc::new(ManualScheduler::new(START_MS));
        let (client, _events) = RealtimeClient::new(
            RealtimeConfig::new("ws://tracker.test/ws"),
            Box::new(mock.clone()),
            timers.clone(),
        );
        Self {
            tracker: LiveTracker::new(client, RenderConfig::default()),
            mock,
            timers,
            surface: RecordingSurface::new(),
        }
    }

    /// Attach a renderer on a 100x100 canvas showing map units 0..100.
    fn attach(&self) {
        self.tracker.attach_renderer(
            Arc::new(ViewportProjector::default()),
            Box::new(self.surface.clone()),
        );
        self.tracker.set_view(ViewState::new(
            CanvasSize::new(100, 100),
            Coordinate::new(50.0, 50.0),
            1.0,
            14.0,
        ));
    }

    fn open(&self) {
        self.tracker.client().open().expect("open succeeds");
        self.deliver(SocketEventKind::Opened);
    }

    fn deliver(&self, kind: SocketEventKind) {
        let event = self.mock.event(kind).expect("socket was opened");
        self.tracker.client().handle_event(event);
    }

    fn message(&self, value: serde_json::Value) {
        self.deliver(SocketEventKind::Message(value.to_string()));
    }

    fn pixel_of(&self, id: &str) -> Option<(i64, i64)> {
        self.tracker
            .rendered_trajectories()
            .iter()
            .find(|r| r.id() == id)
            .map(|r| r.pixel.rounded())
    }
}

/// Eastbound along y = 50 from x = 0 to x = 100 over ten seconds.
fn eastbound(id: &str) -> serde_json::Value {
    json!({
        "type": "Feature",
        "geometry": {"type": "LineString", "coordinates": [[0, 50], [100, 50]]},
        "properties": {
            "train_id": id,
            "type": "rail",
            "time_intervals": [[START_MS, 0.0, null], [START_MS + 10_000, 1.0, null]]
        }
    })
}

fn parked(id: &str, vehicle_type: &str) -> serde_json::Value {
    json!({
        "type": "Feature",
        "geometry": {"type": "Point", "coordinates": [25, 75]},
        "properties": {
            "train_id": id,
            "type": vehicle_type,
            "time_intervals": [[START_MS, 0.0, 1.0]]
        }
    })
}

// ============================================================================
// End to end
// ============================================================================

#[test]
fn test_vehicles_flow_from_socket_to_surface() {
    let setup = Setup::new();
    setup.attach();
    setup.open();
    setup.tracker.start(RealtimeMode::Topographic);
    assert!(setup.mock.sent().contains(&"BBOX 0 0 100 100".to_string()));

    setup.message(json!({
        "source": "buffer",
        "content": [
            {"source": "trajectory", "content": eastbound("ic_1")},
            {"source": "trajectory", "content": parked("bus_7", "bus")}
        ]
    }));
    assert_eq!(setup.tracker.trajectories().len(), 2);

    setup.timers.advance(Duration::from_millis(5_040));
    assert_eq!(setup.pixel_of("ic_1"), Some((50, 50)));
    assert_eq!(setup.pixel_of("bus_7"), Some((25, 25)));
    assert_eq!(setup.surface.drawn_ids().len(), 2);

    setup.message(json!({"source": "deleted_vehicles", "content": "bus_7"}));
    setup.timers.advance(Duration::from_millis(90));
    assert_eq!(setup.pixel_of("bus_7"), None);
    assert_eq!(setup.surface.drawn_ids(), vec!["ic_1"]);

    // Past the last sample the vehicle stays at the end of its path
    setup.timers.advance(Duration::from_secs(20));
    assert_eq!(setup.pixel_of("ic_1"), Some((100, 50)));
}

#[test]
fn test_filter_set_before_renderer_hides_vehicle_type() {
    let setup = Setup::new();
    setup
        .tracker
        .settings()
        .set_filter(Some(Arc::new(|t: &Trajectory| t.vehicle_type.as_deref() != Some("bus"))));
    setup.attach();
    setup.open();
    setup.tracker.start(RealtimeMode::Topographic);

    setup.message(json!({
        "source": "trajectory",
        "content": [eastbound("ic_1"), parked("bus_7", "bus")]
    }));
    setup.timers.advance(Duration::from_millis(90));

    assert_eq!(setup.surface.drawn_ids(), vec!["ic_1"]);
    assert_eq!(setup.tracker.trajectories().len(), 2);
}

#[test]
fn test_positions_freeze_while_disconnected_and_recover() {
    let setup = Setup::new();
    setup.attach();
    setup.open();
    setup.tracker.start(RealtimeMode::Topographic);
    setup.message(json!({"source": "trajectory", "content": parked("bus_7", "bus")}));

    setup.deliver(SocketEventKind::Closed { reason: None });
    setup.timers.advance(Duration::from_millis(90));
    assert_eq!(setup.pixel_of("bus_7"), Some((25, 25)));

    setup.mock.take_sent();
    setup.timers.advance(Duration::from_millis(100));
    setup.deliver(SocketEventKind::Opened);

    let sent = setup.mock.sent();
    assert_eq!(sent[0], "BBOX 0 0 100 100");
    assert!(sent.contains(&"SUB trajectory".to_string()));
    assert!(sent.contains(&"SUB deleted_vehicles".to_string()));
}

#[test]
fn test_hover_brings_vehicle_to_front() {
    let setup = Setup::new();
    setup.attach();
    setup.open();
    setup.tracker.start(RealtimeMode::Topographic);
    setup.message(json!({
        "source": "trajectory",
        "content": [parked("a", "bus"), eastbound("b")]
    }));
    setup.timers.advance(Duration::from_millis(90));
    assert_eq!(setup.surface.drawn_ids(), vec!["a", "b"]);

    setup.tracker.settings().set_hover_id(Some("a".to_string()));

    assert_eq!(setup.surface.drawn_ids(), vec!["b", "a"]);
}

#[test]
fn test_short_line_vehicle_is_kept_but_not_drawn() {
    let setup = Setup::new();
    setup.attach();
    setup.open();
    setup.tracker.start(RealtimeMode::Topographic);

    setup.message(json!({
        "source": "trajectory",
        "content": [
            eastbound("ic_1"),
            {
                "type": "Feature",
                "geometry": {"type": "LineString", "coordinates": [[10, 10]]},
                "properties": {
                    "train_id": "stub",
                    "time_intervals": [[START_MS, 0.0, null], [START_MS + 10_000, 1.0, null]]
                }
            }
        ]
    }));
    setup.timers.advance(Duration::from_millis(90));
    setup.timers.advance(Duration::from_millis(90));

    assert_eq!(setup.tracker.trajectories().len(), 2);
    assert!(setup.tracker.store().get("stub").is_some());
    assert_eq!(setup.surface.drawn_ids(), vec!["ic_1"]);
    assert_eq!(setup.pixel_of("stub"), None);
}

#[test]
fn test_stop_clears_everything() {
    let setup = Setup::new();
    setup.attach();
    setup.open();
    setup.tracker.start(RealtimeMode::Topographic);
    setup.message(json!({"source": "trajectory", "content": eastbound("ic_1")}));
    setup.timers.advance(Duration::from_millis(90));

    setup.tracker.stop();
    setup.timers.advance(Duration::from_secs(1));

    assert!(setup.tracker.rendered_trajectories().is_empty());
    assert!(setup.surface.drawn_ids().is_empty());
    assert!(setup.tracker.trajectories().is_empty());
}

// ============================================================================
// Interpolation boundaries
// ============================================================================

fn three_samples() -> Trajectory {
    let line = Polyline::new(vec![
        Coordinate::new(0.0, 0.0),
        Coordinate::new(100.0, 0.0),
        Coordinate::new(100.0, 100.0),
    ])
    .expect("two or more points");
    Trajectory::new(
        "s",
        Geometry::LineString(line),
        vec![
            TimeInterval {
                time_ms: 1_000,
                fraction: 0.0,
                rotation: Some(0.25),
            },
            TimeInterval {
                time_ms: 2_000,
                fraction: 0.5,
                rotation: None,
            },
            TimeInterval {
                time_ms: 4_000,
                fraction: 1.0,
                rotation: Some(2.0),
            },
        ],
    )
}

#[test]
fn test_interpolation_boundaries() {
    let trajectory = three_samples();

    let before = interpolate(&trajectory, 0).unwrap().unwrap();
    assert_eq!(before.coordinate, Coordinate::new(0.0, 0.0));
    assert_eq!(before.rotation, 0.25);

    let after = interpolate(&trajectory, 60_000).unwrap().unwrap();
    assert_eq!(after.coordinate, Coordinate::new(100.0, 100.0));
    assert_eq!(after.rotation, 2.0);

    // Second interval runs along the vertical leg
    let middle = interpolate(&trajectory, 3_000).unwrap().unwrap();
    assert_eq!(middle.coordinate, Coordinate::new(100.0, 50.0));
    assert!((middle.rotation - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
}

#[test]
fn test_interpolation_is_repeatable() {
    let trajectory = three_samples();
    for now in [999, 1_000, 1_337, 2_000, 3_999, 4_000] {
        let a = interpolate(&trajectory, now).unwrap().unwrap();
        let b = interpolate(&trajectory, now).unwrap().unwrap();
        assert_eq!(a.coordinate.x.to_bits(), b.coordinate.x.to_bits());
        assert_eq!(a.coordinate.y.to_bits(), b.coordinate.y.to_bits());
    }
}

// ============================================================================
// Departures
// ============================================================================

fn departure(value: serde_json::Value) -> (String, Departure) {
    let departure: Departure = serde_json::from_value(value).expect("valid departure");
    (departure.call_id.clone(), departure)
}

#[test]
fn test_departure_board_scenario() {
    let now = START_MS;
    let records: HashMap<String, Departure> = [
        departure(json!({"call_id": "1", "time": now + 60_000, "platform": "3", "state": "BOARDING", "to": "Bern", "line": {"name": "IC1"}})),
        departure(json!({"call_id": "2", "time": now + 70_000, "platform": "3", "state": "BOARDING", "to": "Chur", "line": {"name": "IC3"}})),
        departure(json!({"call_id": "3", "time": now + 45 * 60_000, "platform": "4", "to": "Basel"})),
        departure(json!({"call_id": "4", "time": now - 45 * 60_000, "platform": "5", "to": "Thun"})),
    ]
    .into_iter()
    .collect();

    let board = derive_departures(&records, now, &DepartureOptions::default());

    let ids: Vec<&str> = board.iter().map(|d| d.call_id.as_str()).collect();
    assert_eq!(ids, vec!["1", "2"]);
    assert!(!board[0].is_hidden());
    assert!(board[1].is_hidden());
}

//! Integration tests for channel multiplexing over one socket.
//!
//! These tests drive a `RealtimeClient` over an in-memory socket and check
//! what reaches the server:
//! - GET/SUB/DEL counts over subscribe/unsubscribe sequences
//! - resubscription after a forced reconnect
//! - viewport commands issued before the socket opens
//!
//! Run with: `cargo test --test multiplexer_integration`

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use serde_json::json;

use livetrack::mux::{ChannelKey, Frame, MessageHandler};
use livetrack::realtime::{Extent, RealtimeClient, RealtimeConfig, RealtimeMode, Subscription};
use livetrack::timer::ManualScheduler;
use livetrack::transport::{MockSocket, SocketEvent, SocketEventKind};

// ============================================================================
// Helper Functions
// ============================================================================

const START_MS: i64 = 1_700_000_000_000;

struct Session {
    client: RealtimeClient,
    mock: MockSocket,
    timers: Arc<ManualScheduler>,
}

impl Session {
    fn new() -> Self {
        let mock = MockSocket::new();
        let timers = Arc::new(ManualScheduler::new(START_MS));
        let (client, _events) = RealtimeClient::new(
            RealtimeConfig::new("ws://tracker.test/ws"),
            Box::new(mock.clone()),
            timers.clone(),
        );
        Self {
            client,
            mock,
            timers,
        }
    }

    fn deliver(&self, kind: SocketEventKind) {
        let event = self.mock.event(kind).expect("socket was opened");
        self.client.handle_event(event);
    }

    fn open(&self) {
        self.client.open().expect("open succeeds");
        self.deliver(SocketEventKind::Opened);
    }

    fn message(&self, value: serde_json::Value) {
        self.deliver(SocketEventKind::Message(value.to_string()));
    }

    fn count(&self, command: &str) -> usize {
        self.mock.sent().iter().filter(|c| c.as_str() == command).count()
    }
}

/// A handler counting its invocations.
fn counting_handler() -> (MessageHandler, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    let handler = MessageHandler::new(move |_: &Frame| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    (handler, hits)
}

// ============================================================================
// Subscribe / unsubscribe accounting
// ============================================================================

#[test]
fn test_vehicle_topo_subscribed_twice_with_same_handler() {
    let session = Session::new();
    session.open();
    let key = ChannelKey::new("vehicle_topo");
    let (handler, hits) = counting_handler();

    let first = session.client.subscribe(key.clone(), handler.clone(), None, false);
    let _second = session.client.subscribe(key.clone(), handler.clone(), None, false);

    assert_eq!(session.count("GET vehicle_topo"), 1);
    assert_eq!(session.count("SUB vehicle_topo"), 1);
    assert_eq!(session.client.stats().listeners, 1);

    session.message(json!({"source": "vehicle_topo", "content": {"id": 1}}));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    session.client.unsubscribe(&first);
    assert_eq!(session.count("DEL vehicle_topo"), 1);

    session.message(json!({"source": "vehicle_topo", "content": {"id": 2}}));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_del_only_after_last_listener() {
    let session = Session::new();
    session.open();
    let key = ChannelKey::new("station");
    let (a, _) = counting_handler();
    let (b, _) = counting_handler();

    let sub_a = session.client.subscribe(key.clone(), a, None, false);
    let sub_b = session.client.subscribe(key.clone(), b, None, false);
    assert_eq!(session.count("SUB station"), 1);

    session.client.unsubscribe(&sub_a);
    assert_eq!(session.count("DEL station"), 0);

    session.client.unsubscribe(&sub_b);
    assert_eq!(session.count("DEL station"), 1);

    // Nothing left to remove
    session.client.unsubscribe(&sub_b);
    assert_eq!(session.count("DEL station"), 1);
}

#[test]
fn test_quiet_listener_rides_existing_subscription() {
    let session = Session::new();
    session.open();
    let key = ChannelKey::new("healthcheck");
    let (loud, loud_hits) = counting_handler();
    let (quiet, quiet_hits) = counting_handler();

    let quiet_sub = session.client.subscribe(key.clone(), quiet, None, true);
    assert!(session.mock.sent().is_empty());

    let loud_sub = session.client.subscribe(key.clone(), loud, None, false);
    session.message(json!({"source": "healthcheck", "content": "ok"}));
    assert_eq!(loud_hits.load(Ordering::SeqCst), 1);
    assert_eq!(quiet_hits.load(Ordering::SeqCst), 1);

    session.client.unsubscribe(&quiet_sub);
    session.client.unsubscribe(&loud_sub);
    assert_eq!(
        session.mock.sent(),
        vec!["GET healthcheck", "SUB healthcheck", "DEL healthcheck"]
    );
}

#[test]
fn test_only_quiet_listeners_never_talk_to_server() {
    let session = Session::new();
    session.open();
    let key = ChannelKey::new("newsticker");
    let (quiet, _) = counting_handler();

    let sub = session.client.subscribe(key, quiet, None, true);
    session.client.unsubscribe(&sub);

    assert!(session.mock.sent().is_empty());
}

#[test]
fn test_pending_query_does_not_keep_channel_subscribed() {
    let session = Session::new();
    session.open();
    let key = ChannelKey::new("trajectory");
    let (handler, _) = counting_handler();

    let sub = session.client.subscribe(key.clone(), handler.clone(), None, false);
    let _pending = session.client.query(key.clone());
    session.client.unsubscribe(&sub);

    assert_eq!(
        session.mock.sent(),
        vec!["GET trajectory", "SUB trajectory", "GET trajectory", "DEL trajectory"]
    );

    // The query resolves, then a fresh subscription talks to the server again
    session.message(json!({"source": "trajectory", "content": {"id": 1}}));
    session.mock.take_sent();
    session.client.subscribe(key, handler, None, false);
    assert_eq!(session.mock.sent(), vec!["GET trajectory", "SUB trajectory"]);
    assert_eq!(session.client.stats().listeners, 1);
}

#[test]
fn test_handler_reregistered_as_quiet_still_deletes() {
    let session = Session::new();
    session.open();
    let key = ChannelKey::new("station");
    let (handler, _) = counting_handler();

    session.client.subscribe(key.clone(), handler.clone(), None, false);
    let sub = session.client.subscribe(key, handler, None, true);
    session.client.unsubscribe(&sub);

    assert_eq!(
        session.mock.sent(),
        vec!["GET station", "SUB station", "DEL station"]
    );
}

#[test]
fn test_disruption_modes_are_independent() {
    let session = Session::new();
    session.open();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);

    let _topographic = session
        .client
        .subscribe_disruptions(RealtimeMode::Topographic, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
    let schematic = session
        .client
        .subscribe_disruptions(RealtimeMode::Schematic, |_| {});
    assert_eq!(
        session.mock.sent(),
        vec![
            "GET disruptions",
            "SUB disruptions",
            "GET disruptions_schematic",
            "SUB disruptions_schematic",
        ]
    );

    session.client.unsubscribe(&schematic);
    assert_eq!(session.count("DEL disruptions_schematic"), 1);
    assert_eq!(session.count("DEL disruptions"), 0);

    session.message(json!({"source": "disruptions", "content": [{"text": "delay"}]}));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

proptest! {
    /// With non-quiet listeners only, SUB and DEL alternate and the server
    /// is subscribed exactly while some listener is registered.
    #[test]
    fn test_sub_and_del_alternate(ops in prop::collection::vec((any::<bool>(), 0usize..3), 1..40)) {
        let session = Session::new();
        session.open();
        let key = ChannelKey::new("trajectory");
        let handlers: Vec<MessageHandler> = (0..3).map(|_| counting_handler().0).collect();
        let mut subscriptions: Vec<Option<Subscription>> = vec![None, None, None];

        for (subscribe, index) in ops {
            if subscribe {
                subscriptions[index] =
                    Some(session.client.subscribe(key.clone(), handlers[index].clone(), None, false));
            } else if let Some(sub) = subscriptions[index].take() {
                session.client.unsubscribe(&sub);
            }
        }

        let mut active = false;
        for command in session.mock.sent() {
            match command.as_str() {
                "GET trajectory" => prop_assert!(!active),
                "SUB trajectory" => {
                    prop_assert!(!active);
                    active = true;
                }
                "DEL trajectory" => {
                    prop_assert!(active);
                    active = false;
                }
                other => prop_assert!(false, "unexpected command {}", other),
            }
        }
        let registered = subscriptions.iter().any(Option::is_some);
        prop_assert_eq!(active, registered);
    }
}

// ============================================================================
// Reconnection
// ============================================================================

#[test]
fn test_forced_reconnect_resubscribes_each_channel_once() {
    let session = Session::new();
    session.open();

    let (h1, _) = counting_handler();
    let (h2, _) = counting_handler();
    let (h3, _) = counting_handler();
    let (quiet, _) = counting_handler();
    session.client.subscribe(ChannelKey::new("trajectory"), h1, None, false);
    session.client.subscribe(ChannelKey::new("trajectory"), h2, None, false);
    session.client.subscribe(ChannelKey::new("deleted_vehicles"), h3, None, false);
    session.client.subscribe(ChannelKey::new("station"), quiet, None, true);
    session.mock.take_sent();

    session.deliver(SocketEventKind::Closed {
        reason: Some("server restart".to_string()),
    });
    assert!(!session.client.is_open());

    session.timers.advance(Duration::from_millis(100));
    assert_eq!(session.mock.opened_urls().len(), 2);
    session.deliver(SocketEventKind::Opened);

    assert_eq!(
        session.mock.take_sent(),
        vec![
            "GET trajectory",
            "SUB trajectory",
            "GET deleted_vehicles",
            "SUB deleted_vehicles",
        ]
    );
    assert_eq!(session.client.stats().reconnects, 1);
}

#[test]
fn test_repeated_reconnects_never_duplicate() {
    let session = Session::new();
    session.open();
    let (handler, _) = counting_handler();
    session
        .client
        .subscribe_trajectories(RealtimeMode::Schematic, |_| {});
    session
        .client
        .subscribe(ChannelKey::new("sbb_disruptions"), handler, None, false);

    for _ in 0..3 {
        session.mock.take_sent();
        session.deliver(SocketEventKind::Closed { reason: None });
        session.timers.advance(Duration::from_millis(100));
        session.deliver(SocketEventKind::Opened);

        assert_eq!(session.count("SUB trajectory_schematic"), 1);
        assert_eq!(session.count("SUB sbb_disruptions"), 1);
        assert_eq!(session.mock.sent().len(), 4);
    }
}

#[test]
fn test_events_from_replaced_socket_are_ignored() {
    let session = Session::new();
    session.open();
    let (handler, hits) = counting_handler();
    session
        .client
        .subscribe(ChannelKey::new("trajectory"), handler, None, false);
    let old = session.mock.connection().expect("connected");

    session.client.open().expect("reopen");
    session.deliver(SocketEventKind::Opened);

    session.client.handle_event(SocketEvent::new(
        old,
        SocketEventKind::Message(json!({"source": "trajectory", "content": 1}).to_string()),
    ));
    session.client.handle_event(SocketEvent::new(old, SocketEventKind::Closed { reason: None }));

    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert!(session.client.is_open());
    assert_eq!(session.mock.opened_urls().len(), 2);
}

#[test]
fn test_deliberate_close_does_not_reconnect() {
    let session = Session::new();
    session.open();

    session.client.close();
    session.timers.advance(Duration::from_secs(5));

    assert_eq!(session.mock.opened_urls().len(), 1);
}

// ============================================================================
// Viewport and buffering
// ============================================================================

#[test]
fn test_viewport_set_before_open_is_sent_once() {
    let session = Session::new();
    session.client.open().expect("open succeeds");
    for size in [10.0, 50.0, 100.0] {
        session.client.set_bbox(Extent::new(0.0, 0.0, size, size));
    }

    session.deliver(SocketEventKind::Opened);

    assert_eq!(session.mock.sent(), vec!["BBOX 0 0 100 100"]);
}

#[test]
fn test_buffer_frame_fans_out() {
    let session = Session::new();
    session.open();
    let (trajectories, trajectory_hits) = counting_handler();
    let (deletions, deletion_hits) = counting_handler();
    session
        .client
        .subscribe(ChannelKey::new("trajectory"), trajectories, None, false);
    session
        .client
        .subscribe(ChannelKey::new("deleted_vehicles"), deletions, None, false);

    session.message(json!({
        "source": "buffer",
        "content": [
            {"source": "trajectory", "content": {"id": 1}},
            {"source": "trajectory", "content": {"id": 2}},
            null,
            {"source": "deleted_vehicles", "content": "7"},
            {"content": "no source"}
        ]
    }));

    assert_eq!(trajectory_hits.load(Ordering::SeqCst), 2);
    assert_eq!(deletion_hits.load(Ordering::SeqCst), 1);
}

#[test]
fn test_malformed_frames_are_dropped() {
    let session = Session::new();
    session.open();

    session.deliver(SocketEventKind::Message("not json".to_string()));
    session.deliver(SocketEventKind::Message(r#"{"content": 1}"#.to_string()));

    let stats = session.client.stats();
    assert_eq!(stats.frames_dropped, 2);
    assert_eq!(stats.deliveries, 0);
    assert!(session.client.is_open());
}

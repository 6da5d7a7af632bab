//! The realtime protocol client.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::command::{Extent, SessionCommand};
use super::config::RealtimeConfig;
use super::departures::{derive_departures, prune_departures, Departure, DepartureOptions};
use super::error::{RealtimeError, RealtimeResult};
use super::messages::{
    decode_features, decode_stop_sequences, deleted_vehicle_id, require_content, Feature, StopSequence,
};
use super::mode::RealtimeMode;
use crate::mux::{notify_error, ChannelKey, ErrorHandler, Frame, MessageHandler, Multiplexer};
use crate::timer::{Scheduler, TimerHandle};
use crate::transport::{
    ConnectionState, SocketBackend, SocketEvent, SocketEventKind, SocketEvents, SocketTransport,
};
use crate::trajectory::TrajectoryMessage;

/// Snapshot of client counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientStats {
    pub state: ConnectionState,
    pub frames_received: u64,
    pub frames_dropped: u64,
    pub deliveries: u64,
    pub reconnects: u64,
    pub listeners: usize,
}

/// A live stream registration, used to unsubscribe.
#[derive(Debug, Clone)]
pub struct Subscription {
    key: ChannelKey,
    handler: MessageHandler,
}

impl Subscription {
    /// Channel the registration listens on.
    pub fn key(&self) -> &ChannelKey {
        &self.key
    }
}

/// Viewport values replayed on every open.
#[derive(Debug, Default)]
struct Viewport {
    projection: Option<String>,
    bbox: Option<Extent>,
    buffer: Option<(f64, f64)>,
}

impl Viewport {
    /// Replay order: projection first, then extent, then margin.
    fn commands(&self) -> Vec<SessionCommand> {
        let mut commands = Vec::with_capacity(3);
        if let Some(code) = &self.projection {
            commands.push(SessionCommand::Projection(code.clone()));
        }
        if let Some(extent) = self.bbox {
            commands.push(SessionCommand::Bbox(extent));
        }
        if let Some((dx, dy)) = self.buffer {
            commands.push(SessionCommand::Buffer { dx, dy });
        }
        commands
    }
}

struct ClientState {
    mux: Multiplexer,
    viewport: Viewport,
    ping: Option<TimerHandle>,
    reconnect: Option<TimerHandle>,
    reconnect_enabled: bool,
    reconnects: u64,
}

impl ClientState {
    fn cancel_timers(&mut self) {
        for timer in [self.ping.take(), self.reconnect.take()].into_iter().flatten() {
            timer.cancel();
        }
    }
}

struct ClientInner {
    config: RealtimeConfig,
    timers: Arc<dyn Scheduler>,
    state: Mutex<ClientState>,
    next_request_id: AtomicU64,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        state.reconnect_enabled = false;
        state.cancel_timers();
        state.mux.transport_mut().close();
    }
}

/// Client for the realtime vehicle protocol.
///
/// Wraps a [`Multiplexer`] with session handling:
///
/// - viewport (`PROJECTION`, `BBOX`, `BUFFER`) kept as state, sent while
///   open and replayed, in that order, before channels are resubscribed on
///   every open;
/// - `PING` every [`RealtimeConfig::ping_interval`] while open;
/// - reconnect [`RealtimeConfig::reconnect_timeout`] after an unexpected
///   close, unless disabled or closed deliberately.
///
/// Cloning is cheap; clones share one connection. Timers only hold weak
/// references, so dropping the last clone cancels them and closes the socket.
///
/// Socket events are fed in through [`handle_event`](Self::handle_event),
/// normally by [`run`](Self::run).
#[derive(Clone)]
pub struct RealtimeClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for RealtimeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeClient")
            .field("url", &self.inner.config.url)
            .field("stats", &self.stats())
            .finish()
    }
}

impl RealtimeClient {
    /// Create a client over `backend`.
    ///
    /// Returns the client and the socket event receiver to pass to
    /// [`run`](Self::run).
    pub fn new(
        config: RealtimeConfig,
        backend: Box<dyn SocketBackend>,
        timers: Arc<dyn Scheduler>,
    ) -> (Self, SocketEvents) {
        let (transport, events) = SocketTransport::new(backend);
        let viewport = Viewport {
            projection: config.projection.clone(),
            bbox: None,
            buffer: config.buffer,
        };
        let state = ClientState {
            mux: Multiplexer::new(transport),
            viewport,
            ping: None,
            reconnect: None,
            reconnect_enabled: config.reconnect,
            reconnects: 0,
        };
        let client = Self {
            inner: Arc::new(ClientInner {
                config,
                timers,
                state: Mutex::new(state),
                next_request_id: AtomicU64::new(1),
            }),
        };
        (client, events)
    }

    fn downgrade(&self) -> Weak<ClientInner> {
        Arc::downgrade(&self.inner)
    }

    fn upgrade(weak: &Weak<ClientInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    /// Client configuration.
    pub fn config(&self) -> &RealtimeConfig {
        &self.inner.config
    }

    /// Timer capability the client runs on.
    pub fn timers(&self) -> Arc<dyn Scheduler> {
        Arc::clone(&self.inner.timers)
    }

    /// Socket state.
    pub fn state(&self) -> ConnectionState {
        self.inner.state.lock().mux.transport().state()
    }

    /// Whether the socket is open.
    pub fn is_open(&self) -> bool {
        self.state().is_open()
    }

    /// Counter snapshot.
    pub fn stats(&self) -> ClientStats {
        let state = self.inner.state.lock();
        let mux = state.mux.stats();
        ClientStats {
            state: state.mux.transport().state(),
            frames_received: mux.frames_received,
            frames_dropped: mux.frames_dropped,
            deliveries: mux.deliveries,
            reconnects: state.reconnects,
            listeners: state.mux.listener_count(),
        }
    }

    /// Connect to the configured URL, closing any previous socket first.
    pub fn open(&self) -> RealtimeResult<()> {
        let mut state = self.inner.state.lock();
        state.cancel_timers();
        state.reconnect_enabled = self.inner.config.reconnect;
        state.mux.transport_mut().connect(&self.inner.config.url)?;
        Ok(())
    }

    /// Close the socket for good. Registrations are kept for a later `open`.
    pub fn close(&self) {
        let mut state = self.inner.state.lock();
        state.reconnect_enabled = false;
        state.cancel_timers();
        state.mux.transport_mut().close();
    }

    /// Tell the server to drop everything and forget every registration.
    pub fn reset(&self) {
        let mut state = self.inner.state.lock();
        if state.mux.transport().is_open() {
            state.mux.send(&SessionCommand::Reset.to_string());
        }
        state.mux.clear();
        info!("Realtime session reset");
    }

    /// Send a raw command; queued until open if the socket is not open yet.
    pub fn send(&self, command: &str) {
        self.inner.state.lock().mux.send(command);
    }

    fn send_session(state: &mut ClientState, command: SessionCommand) {
        if state.mux.transport().is_open() {
            state.mux.send(&command.to_string());
        }
    }

    /// Set the viewport. Sent now if open; the latest value is sent on every open.
    pub fn set_bbox(&self, extent: Extent) {
        let mut state = self.inner.state.lock();
        state.viewport.bbox = Some(extent);
        Self::send_session(&mut state, SessionCommand::Bbox(extent));
    }

    /// Set the viewport margin.
    pub fn set_buffer(&self, dx: f64, dy: f64) {
        let mut state = self.inner.state.lock();
        state.viewport.buffer = Some((dx, dy));
        Self::send_session(&mut state, SessionCommand::Buffer { dx, dy });
    }

    /// Set the projection code.
    pub fn set_projection(&self, code: impl Into<String>) {
        let code = code.into();
        let mut state = self.inner.state.lock();
        state.viewport.projection = Some(code.clone());
        Self::send_session(&mut state, SessionCommand::Projection(code));
    }

    /// Apply one socket event.
    ///
    /// Handlers run after the client lock is released, so they may call
    /// back into the client.
    pub fn handle_event(&self, event: SocketEvent) {
        let mut dispatches = Vec::new();
        let mut failure = None;

        {
            let mut state = self.inner.state.lock();
            let Some(kind) = state.mux.transport_mut().handle_event(event) else {
                return;
            };

            if let Some(error) = SocketTransport::error_for(&kind) {
                failure = Some((state.mux.error_handlers(), error));
            }

            match kind {
                SocketEventKind::Opened => self.on_open(&mut state),
                SocketEventKind::Message(text) => dispatches = state.mux.dispatch(&text),
                SocketEventKind::Closed { .. } => self.on_closed(&mut state),
                SocketEventKind::Error(_) => {}
            }
        }

        for dispatch in dispatches {
            dispatch.run();
        }
        if let Some((handlers, error)) = failure {
            notify_error(handlers, &error);
        }
    }

    fn on_open(&self, state: &mut ClientState) {
        for command in state.viewport.commands() {
            state.mux.send(&command.to_string());
        }
        state.mux.resubscribe_all();
        state.mux.transport_mut().flush_pending();

        if let Some(ping) = state.ping.take() {
            ping.cancel();
        }
        let weak = self.downgrade();
        state.ping = Some(self.inner.timers.every(
            self.inner.config.ping_interval,
            Box::new(move || {
                if let Some(client) = Self::upgrade(&weak) {
                    client.ping();
                }
            }),
        ));
    }

    fn on_closed(&self, state: &mut ClientState) {
        if let Some(ping) = state.ping.take() {
            ping.cancel();
        }
        if !state.reconnect_enabled {
            return;
        }

        let delay = self.inner.config.reconnect_timeout;
        debug!(delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
        let weak = self.downgrade();
        if let Some(previous) = state.reconnect.take() {
            previous.cancel();
        }
        state.reconnect = Some(self.inner.timers.after(
            delay,
            Box::new(move || {
                if let Some(client) = Self::upgrade(&weak) {
                    client.reconnect();
                }
            }),
        ));
    }

    fn ping(&self) {
        let mut state = self.inner.state.lock();
        if state.mux.transport().is_open() {
            trace!("Keep-alive");
            state.mux.send(&SessionCommand::Ping.to_string());
        }
    }

    fn reconnect(&self) {
        let mut state = self.inner.state.lock();
        state.reconnect = None;
        if !state.reconnect_enabled || state.mux.transport().state() != ConnectionState::Closed {
            return;
        }

        state.reconnects += 1;
        info!(attempt = state.reconnects, "Reconnecting");
        if let Err(e) = state.mux.transport_mut().connect(&self.inner.config.url) {
            warn!(error = %e, "Reconnect failed");
        }
    }

    /// Pump socket events until `shutdown` fires, then close.
    pub async fn run(&self, mut events: SocketEvents, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    info!("Realtime client shutting down");
                    self.close();
                    break;
                }

                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => {
                        debug!("Socket event channel closed");
                        break;
                    }
                }
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Channels
    // ─────────────────────────────────────────────────────────────────────

    /// Register `on_message` on `key`. See [`Multiplexer::subscribe`].
    pub fn subscribe(
        &self,
        key: ChannelKey,
        on_message: MessageHandler,
        on_error: Option<ErrorHandler>,
        quiet: bool,
    ) -> Subscription {
        self.inner
            .state
            .lock()
            .mux
            .subscribe(key.clone(), on_message.clone(), on_error, quiet);
        Subscription {
            key,
            handler: on_message,
        }
    }

    /// Remove one registration. Returns the number of listeners removed.
    pub fn unsubscribe(&self, subscription: &Subscription) -> usize {
        self.inner
            .state
            .lock()
            .mux
            .unsubscribe(&subscription.key, Some(&subscription.handler))
    }

    /// Remove every registration on `key`.
    pub fn unsubscribe_channel(&self, key: &ChannelKey) -> usize {
        self.inner.state.lock().mux.unsubscribe(key, None)
    }

    fn subscribe_decoded<T, F, D>(&self, key: ChannelKey, decode: D, on_item: F) -> Subscription
    where
        D: Fn(&Value) -> Option<T> + Send + Sync + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let handler = MessageHandler::new(move |frame: &Frame| {
            for item in items(&frame.content) {
                if let Some(decoded) = decode(item) {
                    on_item(decoded);
                }
            }
        });
        self.subscribe(key, handler, None, false)
    }

    /// Vehicle trajectory updates and deletions.
    pub fn subscribe_trajectories(
        &self,
        mode: RealtimeMode,
        on_update: impl Fn(TrajectoryMessage) + Send + Sync + 'static,
    ) -> Subscription {
        let key = mode.channel("trajectory");
        let channel = key.source();
        self.subscribe_decoded(
            key,
            move |item| decode_trajectory(&channel, item),
            on_update,
        )
    }

    /// Like [`subscribe_trajectories`](Self::subscribe_trajectories), but
    /// every frame is delivered as one batch.
    pub fn subscribe_trajectory_batches(
        &self,
        mode: RealtimeMode,
        on_batch: impl Fn(Vec<TrajectoryMessage>) + Send + Sync + 'static,
    ) -> Subscription {
        let key = mode.channel("trajectory");
        let channel = key.source();
        let handler = MessageHandler::new(move |frame: &Frame| {
            let batch: Vec<TrajectoryMessage> = items(&frame.content)
                .filter_map(|item| decode_trajectory(&channel, item))
                .collect();
            if !batch.is_empty() {
                on_batch(batch);
            }
        });
        self.subscribe(key, handler, None, false)
    }

    /// Ids of vehicles the server no longer tracks.
    pub fn subscribe_deleted_vehicles(
        &self,
        mode: RealtimeMode,
        on_delete: impl Fn(String) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe_decoded(mode.channel("deleted_vehicles"), deleted_vehicle_id, on_delete)
    }

    fn subscribe_features(
        &self,
        key: ChannelKey,
        on_feature: impl Fn(Feature) + Send + Sync + 'static,
    ) -> Subscription {
        let channel = key.source();
        self.subscribe_decoded(
            key,
            move |item| match Feature::from_value(item) {
                Ok(feature) => Some(feature),
                Err(e) => {
                    warn!(channel = %channel, error = %e, "Dropping undecodable feature");
                    None
                }
            },
            on_feature,
        )
    }

    /// Station features.
    pub fn subscribe_stations(
        &self,
        mode: RealtimeMode,
        on_station: impl Fn(Feature) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe_features(mode.channel("station"), on_station)
    }

    /// Additional map geometries.
    pub fn subscribe_extra_geoms(
        &self,
        mode: RealtimeMode,
        on_geometry: impl Fn(Feature) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe_features(mode.channel("extra_geoms"), on_geometry)
    }

    fn subscribe_raw(
        &self,
        key: ChannelKey,
        on_content: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        let handler = MessageHandler::new(move |frame: &Frame| on_content(&frame.content));
        self.subscribe(key, handler, None, false)
    }

    /// Service disruption messages.
    pub fn subscribe_disruptions(
        &self,
        mode: RealtimeMode,
        on_content: impl Fn(&Value) + Send + Sync + 'static,
    ) -> Subscription {
        self.subscribe_raw(mode.channel("disruptions"), on_content)
    }

    /// Server health reports.
    pub fn subscribe_healthcheck(&self, on_content: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.subscribe_raw(ChannelKey::new("healthcheck"), on_content)
    }

    /// News ticker messages.
    pub fn subscribe_newsticker(&self, on_content: impl Fn(&Value) + Send + Sync + 'static) -> Subscription {
        self.subscribe_raw(ChannelKey::new("newsticker"), on_content)
    }

    /// Departure board of one station.
    ///
    /// Records are collected per `call_id`; every update delivers the freshly
    /// derived list.
    pub fn subscribe_timetable(
        &self,
        station_id: &str,
        on_departures: impl Fn(Vec<Departure>) + Send + Sync + 'static,
    ) -> Subscription {
        let key = ChannelKey::new(format!("timetable_{}", station_id));
        let channel = key.source();
        let timers = self.timers();
        let options = DepartureOptions {
            max_departure_age_min: self.inner.config.max_departure_age_min,
            sort_by_min_arrival_time: self.inner.config.sort_by_min_arrival_time,
        };
        let records: Mutex<HashMap<String, Departure>> = Mutex::new(HashMap::new());

        let handler = MessageHandler::new(move |frame: &Frame| {
            let now = timers.now_ms();
            let list = {
                let mut records = records.lock();
                for item in items(&frame.content) {
                    match serde_json::from_value::<Departure>(item.clone()) {
                        Ok(departure) => {
                            records.insert(departure.call_id.clone(), departure);
                        }
                        Err(e) => warn!(channel = %channel, error = %e, "Dropping undecodable departure"),
                    }
                }
                prune_departures(&mut records, now, &options);
                derive_departures(&records, now, &options)
            };
            on_departures(list);
        });
        self.subscribe(key, handler, None, false)
    }

    // ─────────────────────────────────────────────────────────────────────
    // One-shot queries
    // ─────────────────────────────────────────────────────────────────────

    fn request(
        &self,
        key: ChannelKey,
        request_id: Option<u64>,
    ) -> impl Future<Output = RealtimeResult<Value>> + Send + 'static {
        let (tx, rx) = oneshot::channel::<Value>();
        let slot = Mutex::new(Some(tx));
        let channel = key.source();

        let handler = MessageHandler::new(move |frame: &Frame| {
            if let Some(tx) = slot.lock().take() {
                if tx.send(frame.content.clone()).is_err() {
                    trace!("Query answered after caller gave up");
                }
            }
        });
        self.inner
            .state
            .lock()
            .mux
            .get(key, request_id, handler, None);

        async move {
            let content = rx.await.map_err(|_| RealtimeError::ClientClosed)?;
            require_content(&channel, content)
        }
    }

    /// `GET` any channel once.
    pub fn query(&self, key: ChannelKey) -> impl Future<Output = RealtimeResult<Value>> + Send + 'static {
        self.request(key, None)
    }

    /// The complete line geometry of a vehicle.
    pub fn full_trajectory(
        &self,
        id: &str,
        mode: RealtimeMode,
    ) -> impl Future<Output = RealtimeResult<Vec<Feature>>> + Send + 'static {
        let key = mode.entity_channel("full_trajectory", id);
        let channel = key.source();
        let response = self.request(key, None);
        async move { decode_features(&channel, &response.await?) }
    }

    /// The stops a vehicle serves.
    pub fn stop_sequence(
        &self,
        id: &str,
    ) -> impl Future<Output = RealtimeResult<Vec<StopSequence>>> + Send + 'static {
        let key = ChannelKey::new(format!("stopsequence_{}", id));
        let channel = key.source();
        let response = self.request(key, None);
        async move { decode_stop_sequences(&channel, response.await?) }
    }

    /// One station by UIC number, correlated by request id.
    pub fn station(&self, uic: &str) -> impl Future<Output = RealtimeResult<Feature>> + Send + 'static {
        let key = ChannelKey::with_args("station", uic);
        let channel = key.source();
        let request_id = self.inner.next_request_id.fetch_add(1, Ordering::Relaxed);
        let response = self.request(key, Some(request_id));
        async move {
            let features = decode_features(&channel, &response.await?)?;
            features
                .into_iter()
                .next()
                .ok_or(RealtimeError::EmptyContent { channel })
        }
    }
}

fn decode_trajectory(channel: &str, item: &Value) -> Option<TrajectoryMessage> {
    match TrajectoryMessage::decode(item) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!(channel = %channel, error = %e, "Dropping undecodable trajectory");
            None
        }
    }
}

/// Elements of list content, or the content itself.
fn items(content: &Value) -> Box<dyn Iterator<Item = &Value> + '_> {
    match content {
        Value::Array(list) => Box::new(list.iter()),
        Value::Null => Box::new(std::iter::empty()),
        single => Box::new(std::iter::once(single)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::ManualScheduler;
    use crate::transport::MockSocket;
    use serde_json::json;
    use std::time::Duration;

    const START_MS: i64 = 1_700_000_000_000;

    struct Harness {
        client: RealtimeClient,
        mock: MockSocket,
        timers: Arc<ManualScheduler>,
    }

    impl Harness {
        fn new(config: RealtimeConfig) -> Self {
            let mock = MockSocket::new();
            let timers = Arc::new(ManualScheduler::new(START_MS));
            let (client, _events) =
                RealtimeClient::new(config, Box::new(mock.clone()), timers.clone());
            Self {
                client,
                mock,
                timers,
            }
        }

        fn event(&self, kind: SocketEventKind) {
            let event = self.mock.event(kind).unwrap();
            self.client.handle_event(event);
        }

        fn open(&self) {
            self.client.open().unwrap();
            self.event(SocketEventKind::Opened);
        }

        fn message(&self, value: serde_json::Value) {
            self.event(SocketEventKind::Message(value.to_string()));
        }
    }

    fn default_harness() -> Harness {
        Harness::new(RealtimeConfig::new("ws://test/ws"))
    }

    #[test]
    fn test_bbox_before_open_sent_once_with_last_value() {
        let h = default_harness();
        h.client.open().unwrap();
        h.client.set_bbox(Extent::new(1.0, 1.0, 2.0, 2.0));
        h.client.set_bbox(Extent::new(0.0, 0.0, 100.0, 100.0));
        h.client.set_bbox(Extent::new(0.0, 0.0, 100.0, 100.0));
        assert!(h.mock.sent().is_empty());

        h.event(SocketEventKind::Opened);
        let bboxes: Vec<String> = h
            .mock
            .sent()
            .into_iter()
            .filter(|c| c.starts_with("BBOX"))
            .collect();
        assert_eq!(bboxes, vec!["BBOX 0 0 100 100"]);
    }

    #[test]
    fn test_open_replays_viewport_before_channels() {
        let h = Harness::new(
            RealtimeConfig::new("ws://test/ws")
                .with_projection("EPSG:3857")
                .with_buffer(100.0, 100.0),
        );
        h.client.subscribe_trajectories(RealtimeMode::Topographic, |_| {});
        h.client.set_bbox(Extent::new(0.0, 0.0, 10.0, 10.0));
        h.client.send("GET healthcheck");

        h.open();

        assert_eq!(
            h.mock.sent(),
            vec![
                "PROJECTION EPSG:3857",
                "BBOX 0 0 10 10",
                "BUFFER 100 100",
                "GET trajectory",
                "SUB trajectory",
                "GET healthcheck",
            ]
        );
    }

    #[test]
    fn test_viewport_sent_immediately_when_open() {
        let h = default_harness();
        h.open();
        h.client.set_projection("EPSG:2056");
        h.client.set_buffer(10.0, 20.0);
        assert_eq!(h.mock.sent(), vec!["PROJECTION EPSG:2056", "BUFFER 10 20"]);
    }

    #[test]
    fn test_ping_every_interval_while_open() {
        let h = default_harness();
        h.open();

        h.timers.advance(Duration::from_secs(25));
        assert_eq!(h.mock.sent(), vec!["PING", "PING"]);

        h.client.close();
        h.timers.advance(Duration::from_secs(30));
        assert_eq!(h.mock.sent().len(), 2);
        assert_eq!(h.timers.pending(), 0);
    }

    #[test]
    fn test_unexpected_close_reconnects_and_resubscribes_once() {
        let h = default_harness();
        h.open();
        h.client.subscribe_trajectories(RealtimeMode::Topographic, |_| {});
        h.client.subscribe_deleted_vehicles(RealtimeMode::Topographic, |_| {});
        h.mock.take_sent();

        h.event(SocketEventKind::Closed { reason: None });
        assert_eq!(h.client.state(), ConnectionState::Closed);

        h.timers.advance(Duration::from_millis(99));
        assert_eq!(h.mock.opened_urls().len(), 1);
        h.timers.advance(Duration::from_millis(1));
        assert_eq!(h.mock.opened_urls().len(), 2);

        h.event(SocketEventKind::Opened);
        assert_eq!(
            h.mock.sent(),
            vec![
                "GET trajectory",
                "SUB trajectory",
                "GET deleted_vehicles",
                "SUB deleted_vehicles",
            ]
        );
        assert_eq!(h.client.stats().reconnects, 1);
    }

    #[test]
    fn test_deliberate_close_never_reconnects() {
        let h = default_harness();
        h.open();
        let connection = h.mock.connection().unwrap();

        h.client.close();
        // A late close event of the old socket
        h.client
            .handle_event(SocketEvent::new(connection, SocketEventKind::Closed { reason: None }));
        h.timers.advance(Duration::from_secs(1));

        assert_eq!(h.mock.opened_urls().len(), 1);
    }

    #[test]
    fn test_reconnect_disabled() {
        let h = Harness::new(RealtimeConfig::new("ws://test/ws").with_reconnect(false));
        h.open();
        h.event(SocketEventKind::Closed { reason: None });
        h.timers.advance(Duration::from_secs(1));
        assert_eq!(h.mock.opened_urls().len(), 1);
    }

    #[test]
    fn test_socket_errors_reach_error_handlers() {
        let h = default_harness();
        h.open();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        let on_error = ErrorHandler::new(move |e| sink.lock().push(e.to_string()));
        h.client.subscribe(
            ChannelKey::new("station"),
            MessageHandler::new(|_| {}),
            Some(on_error),
            false,
        );

        h.event(SocketEventKind::Error("reset by peer".to_string()));
        h.event(SocketEventKind::Closed { reason: None });

        assert_eq!(errors.lock().len(), 2);
        assert_eq!(h.client.stats().listeners, 1);
    }

    #[test]
    fn test_trajectory_stream_decodes_features() {
        let h = default_harness();
        h.open();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        h.client
            .subscribe_trajectories(RealtimeMode::Schematic, move |m| sink.lock().push(m));

        h.message(json!({
            "source": "trajectory_schematic",
            "content": {
                "type": "Feature",
                "geometry": {"type": "Point", "coordinates": [1, 1]},
                "properties": {"train_id": "a", "time_intervals": [[0, 0.0, null]]}
            }
        }));
        h.message(json!({
            "source": "trajectory_schematic",
            "content": {"geometry": null, "properties": {"train_id": "a"}}
        }));
        // Other mode, not delivered
        h.message(json!({
            "source": "trajectory",
            "content": {"geometry": null, "properties": {"train_id": "b"}}
        }));

        let seen = seen.lock();
        assert_eq!(seen.len(), 2);
        assert!(matches!(seen[0], TrajectoryMessage::Upsert(_)));
        assert_eq!(seen[1], TrajectoryMessage::Delete("a".to_string()));
    }

    #[test]
    fn test_trajectory_batches_one_call_per_frame() {
        let h = default_harness();
        h.open();
        let batches = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&batches);
        h.client
            .subscribe_trajectory_batches(RealtimeMode::Topographic, move |batch| {
                sink.lock().push(batch.len())
            });

        h.message(json!({
            "source": "trajectory",
            "content": [
                {"geometry": {"type": "Point", "coordinates": [1, 1]}, "properties": {"train_id": "a"}},
                {"geometry": null, "properties": {"train_id": "b"}},
                {"geometry": null, "properties": {}}
            ]
        }));
        h.message(json!({"source": "trajectory", "content": {"properties": {}}}));

        assert_eq!(*batches.lock(), vec![2]);
    }

    #[test]
    fn test_modes_unsubscribe_independently() {
        let h = default_harness();
        h.open();
        let topo = h.client.subscribe_trajectories(RealtimeMode::Topographic, |_| {});
        let schematic = h.client.subscribe_trajectories(RealtimeMode::Schematic, |_| {});
        h.mock.take_sent();

        h.client.unsubscribe(&topo);
        assert_eq!(h.mock.take_sent(), vec!["DEL trajectory"]);

        h.client.unsubscribe(&schematic);
        assert_eq!(h.mock.take_sent(), vec!["DEL trajectory_schematic"]);
    }

    #[test]
    fn test_timetable_derives_departure_list() {
        let h = default_harness();
        h.open();
        let lists = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lists);
        h.client
            .subscribe_timetable("8503000", move |list| sink.lock().push(list));

        h.message(json!({
            "source": "timetable_8503000",
            "content": {"call_id": 1, "time": START_MS + 60_000, "platform": "3", "state": "BOARDING", "to": "Bern"}
        }));
        h.message(json!({
            "source": "timetable_8503000",
            "content": [
                {"call_id": 2, "time": START_MS + 70_000, "platform": "3", "state": "BOARDING", "to": "Chur"},
                {"call_id": 3, "time": START_MS + 3_600_000, "to": "Genève"}
            ]
        }));

        let lists = lists.lock();
        assert_eq!(lists.len(), 2);
        let last = &lists[1];
        assert_eq!(last.len(), 2);
        assert!(!last[0].is_hidden());
        assert!(last[1].is_hidden());
    }

    #[test]
    fn test_reset_clears_registrations() {
        let h = default_harness();
        h.open();
        h.client.subscribe_trajectories(RealtimeMode::Topographic, |_| {});
        h.mock.take_sent();

        h.client.reset();
        assert_eq!(h.mock.sent(), vec!["RESET"]);
        assert_eq!(h.client.stats().listeners, 0);
    }

    #[test]
    fn test_dropping_client_cancels_timers() {
        let h = default_harness();
        h.open();
        assert_eq!(h.timers.pending(), 1);

        let Harness { client, mock, timers } = h;
        drop(client);
        assert_eq!(timers.pending(), 0);
        assert_eq!(mock.close_count(), 1);
    }

    #[tokio::test]
    async fn test_query_resolves_once() {
        let h = default_harness();
        h.open();

        let pending = h.client.stop_sequence("sbb_1");
        assert_eq!(h.mock.sent(), vec!["GET stopsequence_sbb_1"]);

        h.message(json!({
            "source": "stopsequence_sbb_1",
            "content": [{"destination": "Bern", "stations": []}]
        }));
        let sequences = pending.await.unwrap();
        assert_eq!(sequences[0].destination.as_deref(), Some("Bern"));
        assert_eq!(h.client.stats().listeners, 0);
    }

    #[tokio::test]
    async fn test_query_rejects_empty_content() {
        let h = default_harness();
        h.open();

        let pending = h.client.full_trajectory("sbb_1", RealtimeMode::Schematic);
        h.message(json!({"source": "full_trajectory_schematic_sbb_1", "content": null}));

        assert!(matches!(
            pending.await,
            Err(RealtimeError::EmptyContent { channel }) if channel == "full_trajectory_schematic_sbb_1"
        ));
    }

    #[tokio::test]
    async fn test_station_query_matches_request_id() {
        let h = default_harness();
        h.open();

        let pending = h.client.station("8503000");
        assert_eq!(h.mock.sent(), vec!["GET station 8503000 1"]);

        // Someone else's answer
        h.message(json!({
            "source": "station 8503000",
            "client_reference": 99,
            "content": {"geometry": null, "properties": {"name": "wrong"}}
        }));
        h.message(json!({
            "source": "station 8503000",
            "client_reference": "1",
            "content": {"geometry": {"type": "Point", "coordinates": [8.54, 47.37]}, "properties": {"name": "Zürich HB"}}
        }));

        let station = pending.await.unwrap();
        assert_eq!(station.property_str("name"), Some("Zürich HB"));
    }

    #[tokio::test]
    async fn test_query_before_open_is_sent_on_open() {
        let h = default_harness();
        h.client.open().unwrap();
        let pending = h.client.query(ChannelKey::new("newsticker"));
        assert!(h.mock.sent().is_empty());

        h.event(SocketEventKind::Opened);
        assert_eq!(h.mock.sent(), vec!["GET newsticker"]);

        h.message(json!({"source": "newsticker", "content": [{"title": "x"}]}));
        assert_eq!(pending.await.unwrap(), json!([{"title": "x"}]));
    }

    #[tokio::test]
    async fn test_reset_fails_pending_queries() {
        let h = default_harness();
        h.open();
        let pending = h.client.query(ChannelKey::new("newsticker"));
        h.client.reset();
        assert!(matches!(pending.await, Err(RealtimeError::ClientClosed)));
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let mock = MockSocket::new();
        let timers = Arc::new(ManualScheduler::new(START_MS));
        let (client, events) =
            RealtimeClient::new(RealtimeConfig::new("ws://test/ws"), Box::new(mock.clone()), timers);
        client.open().unwrap();

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        client.run(events, shutdown).await;

        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(mock.close_count(), 1);
    }
}

//! Realtime protocol client.
//!
//! Domain layer on top of the [`mux`](crate::mux) module: session commands,
//! keep-alive, reconnection, typed vehicle/station/timetable streams and
//! one-shot queries.
//!
//! # Architecture
//!
//! ```text
//!   SocketEvents ──► RealtimeClient::run ──► handle_event
//!                                               │
//!          Opened ──► PROJECTION, BBOX, BUFFER ─┤
//!                     resubscribe_all           │
//!                     flush_pending, PING timer │
//!          Closed ──► error handlers,           │
//!                     reconnect timer ──────────┤
//!          Message ─► Multiplexer::dispatch ────┴──► stream handlers
//! ```
//!
//! # Example
//!
//! ```ignore
//! let scheduler = Arc::new(TokioScheduler::current().unwrap());
//! let backend = WebSocketBackend::current().unwrap();
//! let (client, events) = RealtimeClient::new(config, Box::new(backend), scheduler);
//!
//! client.set_bbox(Extent::new(0.0, 0.0, 100.0, 100.0));
//! client.subscribe_trajectories(RealtimeMode::Topographic, |message| {
//!     println!("{:?}", message);
//! });
//! client.open()?;
//!
//! tokio::spawn({
//!     let client = client.clone();
//!     async move { client.run(events, shutdown).await }
//! });
//!
//! let stops = client.stop_sequence("sbb_1").await?;
//! ```

mod client;
mod command;
mod config;
mod departures;
mod error;
mod messages;
mod mode;

pub use client::{ClientStats, RealtimeClient, Subscription};
pub use command::{Extent, SessionCommand};
pub use config::{
    RealtimeConfig, DEFAULT_MAX_DEPARTURE_AGE_MIN, DEFAULT_PING_INTERVAL, DEFAULT_RECONNECT_TIMEOUT,
    DEFAULT_URL,
};
pub use departures::{
    derive_departures, prune_departures, Departure, DepartureOptions, LineInfo, STATE_BOARDING,
    STATE_HIDDEN, STATE_LEAVING,
};
pub use error::{RealtimeError, RealtimeResult};
pub use messages::{Feature, Stop, StopSequence};
pub use mode::RealtimeMode;

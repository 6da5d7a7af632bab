//! WebSocket backend built on `tokio-tungstenite`.

use futures_util::{SinkExt, StreamExt};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use super::backend::{SocketBackend, SocketEventKind, SocketEventSink};
use super::error::{TransportError, TransportResult};

/// Socket backend speaking WebSocket text frames.
///
/// Each `open` spawns one connection task on the runtime. The task owns the
/// stream: it forwards inbound text frames to the event sink and writes
/// whatever [`send`](SocketBackend::send) queues on its outbound channel.
#[derive(Debug)]
pub struct WebSocketBackend {
    handle: Handle,
    writer: Option<mpsc::UnboundedSender<Message>>,
    shutdown: Option<CancellationToken>,
}

impl WebSocketBackend {
    /// Create a backend spawning its connection tasks onto `handle`.
    pub fn new(handle: Handle) -> Self {
        Self {
            handle,
            writer: None,
            shutdown: None,
        }
    }

    /// Create a backend for the runtime we are currently inside, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl SocketBackend for WebSocketBackend {
    fn open(&mut self, url: &str, sink: SocketEventSink) -> TransportResult<()> {
        self.close();

        let request = url
            .into_client_request()
            .map_err(|e| TransportError::Connect {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let (writer, outgoing) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        self.handle
            .spawn(run_connection(request, outgoing, sink, shutdown.clone()));

        self.writer = Some(writer);
        self.shutdown = Some(shutdown);
        Ok(())
    }

    fn send(&mut self, text: &str) -> TransportResult<()> {
        let writer = self.writer.as_ref().ok_or(TransportError::NotConnected)?;
        writer
            .send(Message::Text(text.to_string()))
            .map_err(|_| TransportError::Send("connection task has ended".to_string()))
    }

    fn close(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown.cancel();
        }
        self.writer = None;
    }
}

/// Connection task: connect, then pump frames both ways until either side ends.
async fn run_connection(
    request: Request,
    mut outgoing: mpsc::UnboundedReceiver<Message>,
    sink: SocketEventSink,
    shutdown: CancellationToken,
) {
    let connected = tokio::select! {
        biased;

        _ = shutdown.cancelled() => {
            debug!(connection = sink.connection(), "Connect aborted");
            return;
        }

        result = tokio_tungstenite::connect_async(request) => result,
    };

    let stream = match connected {
        Ok((stream, _response)) => stream,
        Err(e) => {
            sink.emit(SocketEventKind::Error(e.to_string()));
            sink.emit(SocketEventKind::Closed {
                reason: Some(e.to_string()),
            });
            return;
        }
    };

    sink.emit(SocketEventKind::Opened);
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                if let Err(e) = write.send(Message::Close(None)).await {
                    trace!(error = %e, "Close frame not delivered");
                }
                break;
            }

            Some(message) = outgoing.recv() => {
                if let Err(e) = write.send(message).await {
                    sink.emit(SocketEventKind::Error(e.to_string()));
                    sink.emit(SocketEventKind::Closed { reason: Some(e.to_string()) });
                    break;
                }
            }

            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    sink.emit(SocketEventKind::Message(text));
                }
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => {
                        sink.emit(SocketEventKind::Message(text));
                    }
                    Err(e) => warn!(error = %e, "Dropping non UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    let reason = frame.map(|f| f.reason.to_string());
                    sink.emit(SocketEventKind::Closed { reason });
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    sink.emit(SocketEventKind::Error(e.to_string()));
                    sink.emit(SocketEventKind::Closed { reason: Some(e.to_string()) });
                    break;
                }
                None => {
                    sink.emit(SocketEventKind::Closed { reason: None });
                    break;
                }
            }
        }
    }

    debug!(connection = sink.connection(), "Connection task finished");
}

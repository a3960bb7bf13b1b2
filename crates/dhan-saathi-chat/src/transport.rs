//! WebSocket transport to the assistant backend.
//!
//! A [`Transport`] owns at most one live connection. Each connection runs as a
//! single spawned task that performs the handshake and then pumps frames in
//! both directions; everything it observes is reported on the event channel
//! handed out by [`Transport::new`], tagged with the connection's epoch.
//!
//! The owning task feeds those events back through [`Transport::handle_event`],
//! which applies the state transitions and drops events from connections that
//! have since been closed or replaced.

use std::fmt;
use std::time::Duration;

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Capacity of the transport event channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

const OUTGOING_CHANNEL_CAPACITY: usize = 32;

/// Connection state as shown in the status badge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No connection and none in progress.
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    /// Open and usable.
    Connected,
    /// The last connection failed. Cleared only by a new connection attempt.
    Error,
}

impl ConnectionState {
    /// Badge text.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Error => "error",
        }
    }

    /// Whether a new connection attempt is needed before sending.
    #[must_use]
    pub const fn needs_connect(&self) -> bool {
        matches!(self, Self::Disconnected | Self::Error)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Nothing is open or opening.
    #[error("not connected (state: {0})")]
    NotConnected(ConnectionState),

    /// The URL could not be turned into a handshake request.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// The connection task is gone.
    #[error("send failed: {0}")]
    Send(String),
}

/// What a connection task observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Handshake completed.
    Opened,
    /// A text frame arrived.
    Frame(String),
    /// The connection failed. Terminal.
    Failed(String),
    /// The connection closed cleanly. Terminal.
    Closed,
}

/// A [`ConnectionEvent`] tagged with the connection it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportEvent {
    epoch: u64,
    event: ConnectionEvent,
}

impl TransportEvent {
    /// The event payload.
    #[must_use]
    pub const fn event(&self) -> &ConnectionEvent {
        &self.event
    }
}

/// Manages the connection to the assistant.
#[derive(Debug)]
pub struct Transport {
    url: String,
    connect_timeout: Duration,
    state: ConnectionState,
    epoch: u64,
    outgoing: Option<mpsc::Sender<String>>,
    queued: Option<String>,
    task: Option<JoinHandle<()>>,
    events_tx: mpsc::Sender<TransportEvent>,
}

impl Transport {
    /// Create a disconnected transport.
    ///
    /// Returns the transport and the receiver its connection events arrive on.
    #[must_use]
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> (Self, mpsc::Receiver<TransportEvent>) {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let transport = Self {
            url: url.into(),
            connect_timeout,
            state: ConnectionState::Disconnected,
            epoch: 0,
            outgoing: None,
            queued: None,
            task: None,
            events_tx,
        };
        (transport, events_rx)
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        self.state
    }

    /// Endpoint this transport connects to.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Whether a payload is waiting for the handshake to finish.
    #[must_use]
    pub const fn has_queued(&self) -> bool {
        self.queued.is_some()
    }

    /// Start connecting unless a connection is already open or opening.
    ///
    /// Must be called from within a Tokio runtime. An endpoint that cannot be
    /// parsed moves the transport straight to [`ConnectionState::Error`].
    pub fn connect(&mut self) -> ConnectionState {
        if !self.state.needs_connect() {
            return self.state;
        }
        self.abort_task();

        let request = match self.url.as_str().into_client_request() {
            Ok(request) => request,
            Err(e) => {
                let err = TransportError::InvalidEndpoint(e.to_string());
                tracing::warn!(url = %self.url, error = %err, "Cannot connect");
                self.state = ConnectionState::Error;
                return self.state;
            }
        };

        self.epoch += 1;
        let (outgoing_tx, outgoing_rx) = mpsc::channel(OUTGOING_CHANNEL_CAPACITY);
        self.outgoing = Some(outgoing_tx);
        self.state = ConnectionState::Connecting;
        tracing::info!(url = %self.url, epoch = self.epoch, "Connecting to assistant");

        self.task = Some(tokio::spawn(run_connection(
            request,
            self.connect_timeout,
            self.epoch,
            self.events_tx.clone(),
            outgoing_rx,
        )));
        self.state
    }

    /// Send a text frame.
    ///
    /// While connecting, the payload is held until the handshake completes.
    /// Only the most recent payload is held; an earlier one is replaced.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::NotConnected`] when disconnected or failed,
    /// and [`TransportError::Send`] if the connection task has exited.
    pub async fn send(&mut self, payload: String) -> Result<(), TransportError> {
        match self.state {
            ConnectionState::Connected => {
                let outgoing = self
                    .outgoing
                    .as_ref()
                    .ok_or(TransportError::NotConnected(self.state))?;
                outgoing
                    .send(payload)
                    .await
                    .map_err(|e| TransportError::Send(e.to_string()))
            }
            ConnectionState::Connecting => {
                if self.queued.replace(payload).is_some() {
                    tracing::debug!("Replaced payload queued during handshake");
                }
                Ok(())
            }
            ConnectionState::Disconnected | ConnectionState::Error => {
                Err(TransportError::NotConnected(self.state))
            }
        }
    }

    /// Apply an event from the connection task.
    ///
    /// Returns the event if it belongs to the current connection, after the
    /// state has been updated. A payload queued during the handshake is sent
    /// as soon as the connection opens.
    pub fn handle_event(&mut self, event: TransportEvent) -> Option<ConnectionEvent> {
        if event.epoch != self.epoch || self.task.is_none() {
            tracing::trace!(epoch = event.epoch, current = self.epoch, "Ignoring stale transport event");
            return None;
        }

        match &event.event {
            ConnectionEvent::Opened => {
                self.state = ConnectionState::Connected;
                tracing::info!(url = %self.url, "Connected to assistant");
                if let (Some(payload), Some(outgoing)) = (self.queued.take(), self.outgoing.as_ref()) {
                    if let Err(e) = outgoing.try_send(payload) {
                        tracing::warn!(error = %e, "Failed to flush queued payload");
                    }
                }
            }
            ConnectionEvent::Frame(_) => {}
            ConnectionEvent::Failed(reason) => {
                tracing::warn!(reason = %reason, "Assistant connection failed");
                self.state = ConnectionState::Error;
                self.release();
            }
            ConnectionEvent::Closed => {
                tracing::info!("Assistant connection closed");
                if self.state != ConnectionState::Error {
                    self.state = ConnectionState::Disconnected;
                }
                self.release();
            }
        }
        Some(event.event)
    }

    /// Close the connection and drop anything queued.
    ///
    /// Events already emitted by the closed connection are ignored afterwards.
    pub fn close(&mut self) {
        self.abort_task();
        self.release();
        self.epoch += 1;
        if self.state != ConnectionState::Disconnected {
            tracing::info!(url = %self.url, "Closing assistant connection");
        }
        self.state = ConnectionState::Disconnected;
    }

    fn release(&mut self) {
        self.outgoing = None;
        self.queued = None;
        self.task = None;
    }

    fn abort_task(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.abort_task();
    }
}

/// How one direction of a connection ended.
enum Termination {
    Closed,
    Failed(String),
}

impl Termination {
    fn into_event(self) -> ConnectionEvent {
        match self {
            Self::Closed => ConnectionEvent::Closed,
            Self::Failed(reason) => ConnectionEvent::Failed(reason),
        }
    }
}

/// Connection task: handshake, then pump frames until either side ends.
///
/// Emits `Opened` at most once and exactly one terminal event.
async fn run_connection(
    request: Request,
    connect_timeout: Duration,
    epoch: u64,
    events: mpsc::Sender<TransportEvent>,
    outgoing: mpsc::Receiver<String>,
) {
    let emit = |event| TransportEvent { epoch, event };

    let ws_stream = match time::timeout(connect_timeout, connect_async(request)).await {
        Ok(Ok((ws_stream, _))) => ws_stream,
        Ok(Err(e)) => {
            let _ = events.send(emit(ConnectionEvent::Failed(e.to_string()))).await;
            return;
        }
        Err(_) => {
            let reason = format!("handshake timed out after {}s", connect_timeout.as_secs());
            let _ = events.send(emit(ConnectionEvent::Failed(reason))).await;
            return;
        }
    };

    if events.send(emit(ConnectionEvent::Opened)).await.is_err() {
        return;
    }

    let (write, read) = ws_stream.split();
    let termination = tokio::select! {
        t = ws_writer(write, outgoing) => t,
        t = ws_reader(read, &events, epoch) => t,
    };
    let _ = events.send(emit(termination.into_event())).await;
}

/// Writes outgoing frames until the sender side is dropped.
async fn ws_writer(mut write: SplitSink<WsStream, Message>, mut rx: mpsc::Receiver<String>) -> Termination {
    while let Some(text) = rx.recv().await {
        if let Err(e) = write.send(Message::Text(text)).await {
            return Termination::Failed(e.to_string());
        }
    }
    let _ = write.close().await;
    Termination::Closed
}

/// Forwards text frames until the peer closes or the stream errors.
async fn ws_reader(mut read: SplitStream<WsStream>, tx: &mpsc::Sender<TransportEvent>, epoch: u64) -> Termination {
    while let Some(result) = read.next().await {
        match result {
            Ok(Message::Text(text)) => {
                let event = TransportEvent {
                    epoch,
                    event: ConnectionEvent::Frame(text),
                };
                if tx.send(event).await.is_err() {
                    return Termination::Closed;
                }
            }
            Ok(Message::Close(frame)) => {
                tracing::debug!(?frame, "Peer closed connection");
                return Termination::Closed;
            }
            // Control frames are answered by tungstenite; binary is not part of the protocol.
            Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_) | Message::Binary(_)) => {}
            Err(e) => return Termination::Failed(e.to_string()),
        }
    }
    Termination::Closed
}

// =============================================================================
// Tests
// =============================================================================

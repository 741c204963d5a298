//! Reconnecting subscriber task
//!
//! One owned tokio task runs the whole connection lifecycle:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Disconnected -> ... -> Closed
//! ```
//!
//! The reconnect timer is a sleep inside that task, raced against the
//! cancellation token, so it only exists while disconnected and `close`
//! always disarms it.

use crate::config::SubscriberConfig;
use crate::error::{ConnectionFailure, SubscriberResult};
use calc_protocol::{RecordMessage, WireMessage};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

/// Connection lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closed,
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Events delivered to the owner of a subscriber
#[derive(Debug, Clone, PartialEq)]
pub enum FeedEvent {
    StateChanged(ConnectionState),

    /// The local view was replaced by a server snapshot
    SnapshotReplaced(Vec<RecordMessage>),

    /// A live update was appended to the local view
    RecordAppended(RecordMessage),

    /// A connection attempt or a live connection failed
    Failure(ConnectionFailure),
}

/// Self-healing client of the live history feed
///
/// Keeps a local copy of the history: replaced by each snapshot, extended by
/// each update. Dropping the subscriber cancels its task without waiting.
pub struct ReconnectingSubscriber {
    cancel: CancellationToken,
    state: watch::Receiver<ConnectionState>,
    view: Arc<RwLock<Vec<RecordMessage>>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectingSubscriber {
    /// Validate `config` and start the connection task
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        config: SubscriberConfig,
    ) -> SubscriberResult<(Self, mpsc::UnboundedReceiver<FeedEvent>)> {
        let url = config.validate()?;

        let cancel = CancellationToken::new();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let view = Arc::new(RwLock::new(Vec::new()));

        let worker = Worker {
            url,
            config,
            cancel: cancel.clone(),
            state: state_tx,
            events: events_tx,
            view: view.clone(),
        };
        let task = tokio::spawn(worker.run());

        let subscriber =
            Self { cancel, state: state_rx, view, task: Mutex::new(Some(task)) };
        Ok((subscriber, events_rx))
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Watch channel following every state change
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Copy of the local view
    pub fn records(&self) -> Vec<RecordMessage> {
        self.view.read().clone()
    }

    pub fn len(&self) -> usize {
        self.view.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.view.read().is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// Stop the subscriber and wait for its task
    ///
    /// Disarms a pending reconnect, aborts an in-flight connect attempt and
    /// sends a close frame on a live connection. Calling it again is a no-op.
    pub async fn close(&self) {
        self.cancel.cancel();

        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            if let Err(e) = handle.await {
                warn!("Subscriber task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ReconnectingSubscriber {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

type FeedStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How a live session ended
enum SessionEnd {
    Cancelled,
    Lost(ConnectionFailure),
}

struct Worker {
    url: Url,
    config: SubscriberConfig,
    cancel: CancellationToken,
    state: watch::Sender<ConnectionState>,
    events: mpsc::UnboundedSender<FeedEvent>,
    view: Arc<RwLock<Vec<RecordMessage>>>,
}

impl Worker {
    async fn run(self) {
        loop {
            self.set_state(ConnectionState::Connecting);

            let attempt =
                tokio::time::timeout(self.config.connect_timeout(), connect_async(self.url.as_str()));

            let outcome = tokio::select! {
                _ = self.cancel.cancelled() => break,
                outcome = attempt => outcome,
            };

            let failure = match outcome {
                Err(_) => ConnectionFailure::Timeout,
                Ok(Err(e)) => ConnectionFailure::from(e),
                Ok(Ok((stream, _response))) => {
                    info!("Connected to history feed at {}", self.url);
                    self.set_state(ConnectionState::Connected);

                    match self.session(stream).await {
                        SessionEnd::Cancelled => break,
                        SessionEnd::Lost(failure) => failure,
                    }
                }
            };

            warn!(
                "History feed at {} unavailable ({}), retrying in {:?}",
                self.url,
                failure,
                self.config.reconnect_delay()
            );
            self.emit(FeedEvent::Failure(failure));
            self.set_state(ConnectionState::Disconnected);

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(self.config.reconnect_delay()) => {}
            }
        }

        self.set_state(ConnectionState::Closed);
        info!("History subscriber for {} closed", self.url);
    }

    async fn session(&self, stream: FeedStream) -> SessionEnd {
        let (mut write, mut read) = stream.split();
        let mut snapshot_received = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    if let Err(e) = write.send(Message::Close(None)).await {
                        debug!("Failed to send close frame: {}", e);
                    }
                    let _ = write.close().await;
                    return SessionEnd::Cancelled;
                }
                message = read.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        self.handle_text(&text, &mut snapshot_received);
                    }
                    Some(Ok(Message::Close(frame))) => {
                        let reason = frame
                            .map(|f| format!("closed by server ({}): {}", f.code, f.reason))
                            .unwrap_or_else(|| "closed by server".to_string());
                        return SessionEnd::Lost(ConnectionFailure::Disconnected(reason));
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return SessionEnd::Lost(ConnectionFailure::from(e)),
                    None => {
                        return SessionEnd::Lost(ConnectionFailure::Disconnected(
                            "stream ended".to_string(),
                        ));
                    }
                },
            }
        }
    }

    fn handle_text(&self, text: &str, snapshot_received: &mut bool) {
        match WireMessage::parse(text) {
            Ok(WireMessage::History(history)) if !*snapshot_received => {
                *snapshot_received = true;
                debug!("Snapshot with {} records received", history.history.len());
                *self.view.write() = history.history.clone();
                self.emit(FeedEvent::SnapshotReplaced(history.history));
            }
            Ok(WireMessage::History(_)) => {
                warn!("Discarding unexpected second history message");
            }
            Ok(WireMessage::Record(record)) if *snapshot_received => {
                self.view.write().push(record.clone());
                self.emit(FeedEvent::RecordAppended(record));
            }
            Ok(WireMessage::Record(record)) => {
                warn!("Discarding record {} received before the snapshot", record.sequence);
            }
            Err(e) => {
                warn!("Discarding malformed feed message: {}", e);
            }
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
        self.emit(FeedEvent::StateChanged(state));
    }

    fn emit(&self, event: FeedEvent) {
        // The owner may have dropped its receiver
        let _ = self.events.send(event);
    }
}

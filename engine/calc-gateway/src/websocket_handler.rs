//! WebSocket connection handler for the live history feed

use crate::hub::BroadcastHub;
use calc_protocol::{BroadcastEvent, WireMessage};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};
use warp::ws::{Message, WebSocket};

/// Close code sent when the hub refuses a subscription (try again later)
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;

/// Close code sent when the subscription could not be set up
const CLOSE_INTERNAL_ERROR: u16 = 1011;

/// Serves one WebSocket connection
pub struct WebSocketHandler {
    /// Broadcast hub the connection subscribes to
    hub: Arc<BroadcastHub>,

    /// Interval between server pings
    heartbeat: Duration,

    /// Per-subscriber queue length
    channel_capacity: usize,
}

impl WebSocketHandler {
    /// Create a new WebSocket handler
    pub fn new(hub: Arc<BroadcastHub>, heartbeat: Duration, channel_capacity: usize) -> Self {
        Self { hub, heartbeat, channel_capacity }
    }

    /// Handle the WebSocket connection until either side closes it
    pub async fn handle(self, socket: WebSocket) {
        let (mut ws_sender, mut ws_receiver) = socket.split();

        let (tx, rx) = mpsc::channel::<BroadcastEvent>(self.channel_capacity);

        // Subscribing snapshots the ledger, which an in-flight append may hold
        let hub = self.hub.clone();
        let subscriber = match tokio::task::spawn_blocking(move || hub.subscribe(tx)).await {
            Ok(Ok(subscriber)) => subscriber,
            Ok(Err(e)) => {
                warn!("Refusing WebSocket subscription: {}", e);
                let _ = ws_sender.send(Message::close_with(CLOSE_TRY_AGAIN_LATER, e.to_string())).await;
                return;
            }
            Err(e) => {
                error!("Subscribe task failed: {}", e);
                let _ = ws_sender.send(Message::close_with(CLOSE_INTERNAL_ERROR, "subscribe failed")).await;
                return;
            }
        };

        info!("WebSocket subscriber {} connected", subscriber.id);

        let mut writer = tokio::spawn(write_events(ws_sender, rx, self.heartbeat));

        // Client messages carry no meaning; read only to detect close
        loop {
            tokio::select! {
                message = ws_receiver.next() => match message {
                    Some(Ok(message)) if message.is_close() => {
                        debug!("Subscriber {} sent close", subscriber.id);
                        break;
                    }
                    Some(Ok(message)) => {
                        if message.is_text() {
                            debug!("Ignoring client message from subscriber {}", subscriber.id);
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error on subscriber {}: {}", subscriber.id, e);
                        break;
                    }
                    None => break,
                },
                _ = &mut writer => {
                    debug!("Writer for subscriber {} finished", subscriber.id);
                    break;
                }
            }
        }

        self.hub.unsubscribe(subscriber.id);
        writer.abort();

        info!("WebSocket subscriber {} disconnected", subscriber.id);
    }
}

/// Forward hub events to the socket and keep the connection alive with pings
///
/// Ends when the hub drops the subscriber or the socket stops accepting writes.
async fn write_events(
    mut ws_sender: SplitSink<WebSocket, Message>,
    mut events: mpsc::Receiver<BroadcastEvent>,
    heartbeat: Duration,
) {
    let mut ping = interval_at(Instant::now() + heartbeat, heartbeat);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else {
                    break;
                };

                let text = match WireMessage::from(&event).to_json() {
                    Ok(text) => text,
                    Err(e) => {
                        error!("Failed to encode broadcast event: {}", e);
                        continue;
                    }
                };

                if let Err(e) = ws_sender.send(Message::text(text)).await {
                    debug!("Failed to send WebSocket message: {}", e);
                    break;
                }
            }
            _ = ping.tick() => {
                if ws_sender.send(Message::ping(Vec::new())).await.is_err() {
                    break;
                }
            }
        }
    }

    let _ = ws_sender.close().await;
}

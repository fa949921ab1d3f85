//! Per-connection relay handler
//!
//! Handles one WebSocket connection: parses JSON-RPC frames, feeds them
//! to the session registry, and fans the resulting events out to the
//! per-connection senders. A connection drop is a registry `disconnect`,
//! so presence stays correct on network failure or tab close.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

use crate::config::SignalingServerConfig;
use crate::error::Result;
use crate::signaling::protocol::{
    error_codes, message_from_request, notification_for_event, rejection_code, JsonRpcError,
    JsonRpcRequest, JsonRpcResponse,
};
use lessonlive_core::{
    ConnectionId, DispatchOutcome, DispatchReply, OutboundEvent, SessionRegistry,
};

/// Frame queued for one connection's writer task
#[derive(Debug)]
enum OutboundFrame {
    /// A JSON-RPC frame
    Text(String),
    /// Close the socket after draining queued frames
    Close,
}

/// Shared state across all relay connections
///
/// The registry is the single mutable shared resource; it is only
/// touched through its dispatch operations, and no lock is held across
/// a socket send.
pub struct SharedState {
    registry: Arc<RwLock<SessionRegistry>>,
    senders: Arc<RwLock<HashMap<ConnectionId, mpsc::Sender<OutboundFrame>>>>,
    config: Arc<SignalingServerConfig>,
}

impl SharedState {
    /// Create shared state around a registry
    pub fn new(registry: SessionRegistry, config: Arc<SignalingServerConfig>) -> Self {
        Self {
            registry: Arc::new(RwLock::new(registry)),
            senders: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// The registry, for introspection from tests and embedding code
    pub fn registry(&self) -> &Arc<RwLock<SessionRegistry>> {
        &self.registry
    }

    /// Number of live connections
    pub async fn connection_count(&self) -> usize {
        self.senders.read().await.len()
    }

    async fn register(&self, conn: ConnectionId, tx: mpsc::Sender<OutboundFrame>) {
        self.senders.write().await.insert(conn, tx);
    }

    async fn unregister(&self, conn: ConnectionId) {
        self.senders.write().await.remove(&conn);
    }

    /// Push one frame to a connection; departed receivers are ignored,
    /// their departure is already being handled by their own task.
    async fn send_to(&self, conn: ConnectionId, frame: OutboundFrame) {
        let sender = self.senders.read().await.get(&conn).cloned();
        if let Some(sender) = sender {
            if sender.send(frame).await.is_err() {
                debug!(conn = %conn, "Dropping frame for closing connection");
            }
        }
    }

    /// Fan out the events and hangups of one dispatch outcome
    async fn deliver(&self, events: Vec<OutboundEvent>, hangups: Vec<ConnectionId>) {
        for OutboundEvent { to, event } in events {
            match notification_for_event(&event).to_json() {
                Ok(frame) => self.send_to(to, OutboundFrame::Text(frame)).await,
                Err(e) => error!(error = %e, "Failed to encode notification"),
            }
        }
        for conn in hangups {
            self.send_to(conn, OutboundFrame::Close).await;
        }
    }
}

/// Handle a single relay connection to completion
pub async fn handle_connection(stream: TcpStream, state: Arc<SharedState>) -> Result<()> {
    let addr = stream.peer_addr()?;
    let conn = ConnectionId::new();
    info!(conn = %conn, peer = %addr, "New signaling connection");

    let ws_stream = accept_async(stream).await?;
    let (ws_tx, mut ws_rx) = ws_stream.split();

    // Channel for frames addressed to this connection
    let (tx, mut rx) = mpsc::channel::<OutboundFrame>(state.config.channel_capacity);
    state.register(conn, tx.clone()).await;

    // Writer task: drains the channel into the socket
    let ws_tx = Arc::new(RwLock::new(ws_tx));
    let ws_tx_writer = Arc::clone(&ws_tx);
    let forward_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let mut ws_tx = ws_tx_writer.write().await;
            match frame {
                OutboundFrame::Text(text) => {
                    if let Err(e) = ws_tx.send(Message::Text(text)).await {
                        error!(error = %e, "Failed to send frame");
                        break;
                    }
                }
                OutboundFrame::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    while let Some(msg) = ws_rx.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if text.len() > state.config.max_frame_bytes {
                    warn!(conn = %conn, bytes = text.len(), "Oversized frame rejected");
                    let error = JsonRpcError::new(
                        error_codes::INVALID_REQUEST,
                        "frame too large",
                        json!(null),
                    );
                    if let Ok(frame) = error.to_json() {
                        let _ = tx.send(OutboundFrame::Text(frame)).await;
                    }
                    continue;
                }
                handle_frame(&text, conn, &state, &tx).await;
            }
            Ok(Message::Ping(data)) => {
                let mut ws_tx = ws_tx.write().await;
                let _ = ws_tx.send(Message::Pong(data)).await;
            }
            Ok(Message::Close(_)) => {
                debug!(conn = %conn, "Connection closed by client");
                break;
            }
            Err(e) => {
                warn!(conn = %conn, error = %e, "WebSocket error");
                break;
            }
            _ => {}
        }
    }

    // Cleanup: presence must survive silent drops, so the transport
    // closing is equivalent to an explicit leave.
    state.unregister(conn).await;
    let outcome = state.registry.write().await.disconnect(conn);
    state.deliver(outcome.events, outcome.hangups).await;
    info!(conn = %conn, "Signaling connection closed");

    forward_task.abort();

    Ok(())
}

/// Handle one inbound JSON-RPC frame
async fn handle_frame(
    text: &str,
    conn: ConnectionId,
    state: &Arc<SharedState>,
    tx: &mpsc::Sender<OutboundFrame>,
) {
    let request: JsonRpcRequest = match serde_json::from_str(text) {
        Ok(request) => request,
        Err(e) => {
            let error = JsonRpcError::new(
                error_codes::PARSE_ERROR,
                format!("Failed to parse frame: {}", e),
                json!(null),
            );
            send_frame(tx, error.to_json()).await;
            return;
        }
    };

    let request_id = request.id.clone().unwrap_or(json!(null));

    let message = match message_from_request(&request) {
        Ok(message) => message,
        Err(e) => {
            let error = JsonRpcError::new(e.code, e.message, request_id);
            send_frame(tx, error.to_json()).await;
            return;
        }
    };

    let outcome: DispatchOutcome = state.registry.write().await.apply(conn, message);

    match outcome.reply {
        Ok(reply) => {
            // Notifications get no success reply
            if !request.is_notification() {
                let result = match reply {
                    DispatchReply::Joined(join) => match serde_json::to_value(&join) {
                        Ok(value) => value,
                        Err(e) => {
                            error!(error = %e, "Failed to encode join reply");
                            return;
                        }
                    },
                    DispatchReply::Ack => json!({"success": true}),
                };
                let response = JsonRpcResponse::new(result, request_id);
                send_frame(tx, response.to_json()).await;
            }
        }
        Err(e) => {
            // Rejections go back to the sender even on notifications;
            // they never affect other connections.
            let error = JsonRpcError::new(rejection_code(&e), e.to_string(), request_id);
            send_frame(tx, error.to_json()).await;
        }
    }

    state.deliver(outcome.events, outcome.hangups).await;
}

async fn send_frame(tx: &mpsc::Sender<OutboundFrame>, frame: serde_json::Result<String>) {
    match frame {
        Ok(text) => {
            let _ = tx.send(OutboundFrame::Text(text)).await;
        }
        Err(e) => error!(error = %e, "Failed to encode frame"),
    }
}

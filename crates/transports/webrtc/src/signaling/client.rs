//! Signaling client
//!
//! One durable WebSocket to the relay per participant. Requests are
//! correlated by JSON-RPC id; relay-pushed notifications surface on an
//! event channel the peer controller drains. When the connection drops,
//! every pending request fails and a final [`ClientEvent::Closed`] is
//! emitted: the controller treats that as a full session exit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::signaling::protocol::{
    event_from_notification, parse_frame, request_for_message, IncomingFrame,
};
use lessonlive_core::{
    ClientMessage, ConnectionId, ControlCommand, IceCandidate, JoinReply, ServerEvent,
};

/// Event surfaced to the embedding participant
#[derive(Debug)]
pub enum ClientEvent {
    /// A relay-pushed event
    Server(ServerEvent),
    /// The relay rejected a frame that carried no correlation id
    Error {
        /// JSON-RPC error code
        code: i64,
        /// Message from the relay
        message: String,
    },
    /// The signaling connection closed; the session is over for us
    Closed,
}

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Result<Value>>>>>;

/// Client half of the signaling wire
///
/// Cheap to clone; clones share the connection. Events are delivered on
/// the receiver returned by [`SignalingClient::connect`].
#[derive(Clone)]
pub struct SignalingClient {
    out_tx: mpsc::Sender<String>,
    pending: PendingMap,
    next_id: Arc<AtomicU64>,
}

impl SignalingClient {
    /// Connect to a relay
    pub async fn connect(url: &str) -> Result<(Self, mpsc::Receiver<ClientEvent>)> {
        let (ws_stream, _) = connect_async(url).await?;
        info!(url = %url, "Connected to signaling relay");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        let (out_tx, mut out_rx) = mpsc::channel::<String>(64);
        let (event_tx, event_rx) = mpsc::channel::<ClientEvent>(64);

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        // Writer: drains outbound frames into the socket
        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = ws_tx.send(Message::Text(frame)).await {
                    warn!(error = %e, "Signaling send failed");
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        // Reader: correlates responses, surfaces notifications
        let reader_pending = Arc::clone(&pending);
        tokio::spawn(async move {
            while let Some(msg) = ws_rx.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        Self::handle_frame(&text, &reader_pending, &event_tx).await;
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        warn!(error = %e, "Signaling receive failed");
                        break;
                    }
                }
            }

            // Fail whatever is still waiting, then tell the controller
            let waiters: Vec<_> = reader_pending.lock().drain().collect();
            for (_, waiter) in waiters {
                let _ = waiter.send(Err(Error::ConnectionClosed));
            }
            let _ = event_tx.send(ClientEvent::Closed).await;
        });

        Ok((
            Self {
                out_tx,
                pending,
                next_id: Arc::new(AtomicU64::new(1)),
            },
            event_rx,
        ))
    }

    async fn handle_frame(text: &str, pending: &PendingMap, event_tx: &mpsc::Sender<ClientEvent>) {
        match parse_frame(text) {
            Ok(IncomingFrame::Request(request)) => match event_from_notification(&request) {
                Ok(event) => {
                    let _ = event_tx.send(ClientEvent::Server(event)).await;
                }
                Err(e) => warn!(error = %e, "Ignoring unparseable notification"),
            },
            Ok(IncomingFrame::Response { id, result }) => {
                if let Some(waiter) = id.as_u64().and_then(|id| pending.lock().remove(&id)) {
                    let _ = waiter.send(Ok(result));
                } else {
                    debug!("Response with unknown id, ignoring");
                }
            }
            Ok(IncomingFrame::Error { id, code, message }) => {
                match id.as_u64().and_then(|id| pending.lock().remove(&id)) {
                    Some(waiter) => {
                        let _ = waiter.send(Err(Error::Rejected { code, message }));
                    }
                    None => {
                        let _ = event_tx.send(ClientEvent::Error { code, message }).await;
                    }
                }
            }
            Err(e) => warn!(error = %e, "Unparseable signaling frame"),
        }
    }

    /// Send a request and await the relay's reply
    async fn request(&self, message: &ClientMessage) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let frame = request_for_message(message, Some(id)).to_json()?;

        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.lock().insert(id, reply_tx);

        if self.out_tx.send(frame).await.is_err() {
            self.pending.lock().remove(&id);
            return Err(Error::ConnectionClosed);
        }

        reply_rx.await.map_err(|_| Error::ConnectionClosed)?
    }

    /// Send a notification (no reply expected)
    async fn notify(&self, message: &ClientMessage) -> Result<()> {
        let frame = request_for_message(message, None).to_json()?;
        self.out_tx
            .send(frame)
            .await
            .map_err(|_| Error::ConnectionClosed)
    }

    /// Join a session; the reply carries our handle and the roster
    pub async fn join(&self, token: &str, user_id: &str) -> Result<JoinReply> {
        let result = self
            .request(&ClientMessage::Join {
                token: token.to_string(),
                user_id: user_id.to_string(),
            })
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    /// Leave the session; fire-and-forget
    pub async fn leave(&self, token: &str) -> Result<()> {
        self.notify(&ClientMessage::Leave {
            token: token.to_string(),
        })
        .await
    }

    /// Relay an SDP offer to a session member
    pub async fn offer(&self, token: &str, to: ConnectionId, sdp: String) -> Result<()> {
        self.request(&ClientMessage::Offer {
            token: token.to_string(),
            to,
            sdp,
        })
        .await
        .map(|_| ())
    }

    /// Relay an SDP answer to a session member
    pub async fn answer(&self, token: &str, to: ConnectionId, sdp: String) -> Result<()> {
        self.request(&ClientMessage::Answer {
            token: token.to_string(),
            to,
            sdp,
        })
        .await
        .map(|_| ())
    }

    /// Relay a trickled ICE candidate to a session member
    pub async fn ice_candidate(
        &self,
        token: &str,
        to: ConnectionId,
        candidate: IceCandidate,
    ) -> Result<()> {
        self.request(&ClientMessage::IceCandidate {
            token: token.to_string(),
            to,
            candidate,
        })
        .await
        .map(|_| ())
    }

    /// Issue a tutor control command against a participant
    pub async fn control(
        &self,
        token: &str,
        command: ControlCommand,
        target_user_id: &str,
    ) -> Result<()> {
        self.request(&ClientMessage::Control {
            token: token.to_string(),
            command,
            target_user_id: target_user_id.to_string(),
        })
        .await
        .map(|_| ())
    }

    /// Tutor-only: end the session for everyone
    pub async fn end_session(&self, token: &str) -> Result<()> {
        self.request(&ClientMessage::EndSession {
            token: token.to_string(),
        })
        .await
        .map(|_| ())
    }
}

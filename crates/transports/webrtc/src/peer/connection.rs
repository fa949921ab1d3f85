//! Peer connection wrapper
//!
//! Wraps one `RTCPeerConnection` facing one remote participant. Owns the
//! offer/answer plumbing and the candidate buffer: trickled candidates
//! that arrive before the remote description are held here and applied
//! once it lands, so arrival order over the relay doesn't matter.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::TrackLocal;

use crate::config::SessionClientConfig;
use crate::error::Result;
use lessonlive_core::{ConnectionId, IceCandidate};

/// One peer connection to one remote participant
pub struct PeerConnection {
    remote: ConnectionId,
    pc: Arc<RTCPeerConnection>,
    pending_candidates: Mutex<Vec<RTCIceCandidateInit>>,
    remote_description_set: AtomicBool,
}

impl PeerConnection {
    /// Create a peer connection configured from the client's ICE servers
    pub async fn new(remote: ConnectionId, config: &SessionClientConfig) -> Result<Self> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs()?;

        let registry = register_default_interceptors(Registry::new(), &mut media_engine)?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: ice_servers(config),
            ..Default::default()
        };

        let pc = Arc::new(api.new_peer_connection(rtc_config).await?);
        debug!(remote = %remote, "Peer connection created");

        Ok(Self {
            remote,
            pc,
            pending_candidates: Mutex::new(Vec::new()),
            remote_description_set: AtomicBool::new(false),
        })
    }

    /// The remote participant this connection faces
    pub fn remote(&self) -> ConnectionId {
        self.remote
    }

    /// Attach a local track before negotiation
    pub async fn add_track(&self, track: Arc<dyn TrackLocal + Send + Sync>) -> Result<()> {
        self.pc.add_track(track).await?;
        Ok(())
    }

    /// Create an offer and install it as the local description
    pub async fn create_offer(&self) -> Result<String> {
        let offer = self.pc.create_offer(None).await?;
        self.pc.set_local_description(offer.clone()).await?;
        Ok(offer.sdp)
    }

    /// Apply a remote offer and produce the answer
    pub async fn accept_offer(&self, sdp: String) -> Result<String> {
        let offer = RTCSessionDescription::offer(sdp)?;
        self.apply_remote_description(offer).await?;

        let answer = self.pc.create_answer(None).await?;
        self.pc.set_local_description(answer.clone()).await?;
        Ok(answer.sdp)
    }

    /// Apply a remote answer to our outstanding offer
    pub async fn accept_answer(&self, sdp: String) -> Result<()> {
        let answer = RTCSessionDescription::answer(sdp)?;
        self.apply_remote_description(answer).await
    }

    /// Apply a candidate relayed from the remote peer
    ///
    /// Before the remote description lands the candidate is buffered; a
    /// buffered candidate that later fails to apply is dropped with a
    /// warning, renegotiation will recover connectivity.
    pub async fn add_remote_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let init = candidate_to_init(&candidate);

        if !self.remote_description_set.load(Ordering::Acquire) {
            self.pending_candidates.lock().push(init);
            debug!(remote = %self.remote, "Buffered candidate before remote description");
            return Ok(());
        }

        self.pc.add_ice_candidate(init).await?;
        Ok(())
    }

    /// Number of candidates waiting for the remote description
    pub fn pending_candidate_count(&self) -> usize {
        self.pending_candidates.lock().len()
    }

    /// Whether a remote description has been applied
    pub fn has_remote_description(&self) -> bool {
        self.remote_description_set.load(Ordering::Acquire)
    }

    /// Register a handler for locally discovered candidates
    pub fn on_local_candidate<F>(&self, handler: F)
    where
        F: Fn(IceCandidate) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.pc.on_ice_candidate(Box::new(move |candidate| {
            let handler = Arc::clone(&handler);
            Box::pin(async move {
                // `None` marks end of gathering; nothing to relay with
                // trickle ICE.
                if let Some(candidate) = candidate {
                    match candidate.to_json() {
                        Ok(init) => handler(IceCandidate {
                            candidate: init.candidate,
                            sdp_mid: init.sdp_mid,
                            sdp_m_line_index: init.sdp_mline_index,
                        }),
                        Err(e) => warn!(error = %e, "Failed to encode local candidate"),
                    }
                }
            })
        }));
    }

    /// Register a handler for connection state changes
    pub fn on_state_change<F>(&self, handler: F)
    where
        F: Fn(RTCPeerConnectionState) + Send + Sync + 'static,
    {
        let handler = Arc::new(handler);
        self.pc
            .on_peer_connection_state_change(Box::new(move |state| {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    handler(state);
                })
            }));
    }

    /// Current connection state
    pub fn connection_state(&self) -> RTCPeerConnectionState {
        self.pc.connection_state()
    }

    /// Close the connection
    pub async fn close(&self) -> Result<()> {
        self.pc.close().await?;
        Ok(())
    }

    async fn apply_remote_description(&self, description: RTCSessionDescription) -> Result<()> {
        self.pc.set_remote_description(description).await?;
        self.remote_description_set.store(true, Ordering::Release);

        let buffered: Vec<RTCIceCandidateInit> =
            self.pending_candidates.lock().drain(..).collect();
        for init in buffered {
            if let Err(e) = self.pc.add_ice_candidate(init).await {
                warn!(remote = %self.remote, error = %e, "Dropping buffered candidate");
            }
        }
        Ok(())
    }
}

fn ice_servers(config: &SessionClientConfig) -> Vec<RTCIceServer> {
    let mut servers = Vec::new();
    if !config.stun_servers.is_empty() {
        servers.push(RTCIceServer {
            urls: config.stun_servers.clone(),
            ..Default::default()
        });
    }
    for turn in &config.turn_servers {
        servers.push(RTCIceServer {
            urls: turn.urls.clone(),
            username: turn.username.clone(),
            credential: turn.credential.clone(),
            ..Default::default()
        });
    }
    servers
}

fn candidate_to_init(candidate: &IceCandidate) -> RTCIceCandidateInit {
    RTCIceCandidateInit {
        candidate: candidate.candidate.clone(),
        sdp_mid: candidate.sdp_mid.clone(),
        sdp_mline_index: candidate.sdp_m_line_index,
        username_fragment: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{LocalMedia, NullCaptureDevice};

    fn test_config() -> SessionClientConfig {
        SessionClientConfig {
            session_token: "lesson-1".into(),
            user_id: "alice".into(),
            stun_servers: vec![],
            ..Default::default()
        }
    }

    async fn peer_with_tracks() -> PeerConnection {
        let pc = PeerConnection::new(ConnectionId::new(), &test_config())
            .await
            .unwrap();
        let media = LocalMedia::acquire(&NullCaptureDevice).await.media;
        for track in media.tracks() {
            pc.add_track(track).await.unwrap();
        }
        pc
    }

    #[tokio::test]
    async fn test_offer_carries_media_sections() {
        let pc = peer_with_tracks().await;
        let sdp = pc.create_offer().await.unwrap();
        assert!(sdp.starts_with("v=0"));
        assert!(sdp.contains("m=audio"));
        assert!(sdp.contains("m=video"));
        pc.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_offer_answer_between_two_connections() {
        let offerer = peer_with_tracks().await;
        let answerer = peer_with_tracks().await;

        let offer = offerer.create_offer().await.unwrap();
        let answer = answerer.accept_offer(offer).await.unwrap();
        assert!(answer.starts_with("v=0"));
        assert!(answerer.has_remote_description());

        offerer.accept_answer(answer).await.unwrap();
        assert!(offerer.has_remote_description());

        offerer.close().await.unwrap();
        answerer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_candidates_buffer_until_remote_description() {
        let offerer = peer_with_tracks().await;
        let answerer = peer_with_tracks().await;

        let candidate = IceCandidate {
            candidate: "candidate:1 1 UDP 2122252543 192.0.2.1 54321 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        };
        answerer.add_remote_candidate(candidate).await.unwrap();
        assert_eq!(answerer.pending_candidate_count(), 1);
        assert!(!answerer.has_remote_description());

        let offer = offerer.create_offer().await.unwrap();
        answerer.accept_offer(offer).await.unwrap();
        assert_eq!(answerer.pending_candidate_count(), 0);

        offerer.close().await.unwrap();
        answerer.close().await.unwrap();
    }
}

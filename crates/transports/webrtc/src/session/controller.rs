//! Peer controller
//!
//! Drives one participant's side of a two-party session: joins over the
//! signaling client, reacts to presence events by negotiating a peer
//! connection with the other participant, streams trickled candidates in
//! both directions, and applies tutor control commands to the local
//! media flags.
//!
//! Offerer selection: the participant that is already in the session
//! offers when a newcomer's presence event arrives; the newcomer waits
//! for that offer and answers. The two never race.

use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;

use crate::config::SessionClientConfig;
use crate::error::Result;
use crate::media::{LocalMedia, MediaKind};
use crate::peer::PeerConnection;
use crate::signaling::{ClientEvent, SignalingClient};
use lessonlive_core::{ConnectionId, ControlCommand, ServerEvent};

/// What the participant's UI should currently display
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControllerState {
    /// Alone in the session, remote media sink cleared
    WaitingForParticipant,
    /// Offer/answer/ICE exchange in progress
    Negotiating,
    /// Peer-to-peer media is flowing
    Connected,
    /// The session is over for this participant
    Ended(ExitReason),
}

/// Why a session ended for this participant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// We left on our own
    Left,
    /// The tutor removed us
    Removed,
    /// The tutor ended the session
    EndedByTutor,
    /// The relay connection dropped
    ConnectionLost,
}

impl ExitReason {
    /// Message to show the user
    pub fn user_message(&self) -> &'static str {
        match self {
            ExitReason::Left => "You left the session",
            ExitReason::Removed => "You have been removed from the session",
            ExitReason::EndedByTutor => "Session ended by instructor",
            ExitReason::ConnectionLost => "Connection to the session was lost",
        }
    }
}

struct ActivePeer {
    remote: ConnectionId,
    pc: Arc<PeerConnection>,
}

/// Handle for driving a running controller from the outside
///
/// Cloneable; the UI keeps one for state display and, on the tutor side,
/// for issuing control commands.
#[derive(Clone)]
pub struct ControllerHandle {
    client: SignalingClient,
    token: String,
    state_rx: watch::Receiver<ControllerState>,
}

impl ControllerHandle {
    /// Current controller state
    pub fn state(&self) -> ControllerState {
        self.state_rx.borrow().clone()
    }

    /// Watch receiver for state transitions
    pub fn state_receiver(&self) -> watch::Receiver<ControllerState> {
        self.state_rx.clone()
    }

    /// Mute a participant's audio (tutor only)
    pub async fn mute_participant_audio(&self, target_user_id: &str) -> Result<()> {
        self.client
            .control(&self.token, ControlCommand::MuteAudio, target_user_id)
            .await
    }

    /// Unmute a participant's audio (tutor only)
    pub async fn unmute_participant_audio(&self, target_user_id: &str) -> Result<()> {
        self.client
            .control(&self.token, ControlCommand::UnmuteAudio, target_user_id)
            .await
    }

    /// Mute a participant's video (tutor only)
    pub async fn mute_participant_video(&self, target_user_id: &str) -> Result<()> {
        self.client
            .control(&self.token, ControlCommand::MuteVideo, target_user_id)
            .await
    }

    /// Unmute a participant's video (tutor only)
    pub async fn unmute_participant_video(&self, target_user_id: &str) -> Result<()> {
        self.client
            .control(&self.token, ControlCommand::UnmuteVideo, target_user_id)
            .await
    }

    /// Approve a participant into the lesson (tutor only)
    pub async fn approve_participant(&self, target_user_id: &str) -> Result<()> {
        self.client
            .control(&self.token, ControlCommand::Approve, target_user_id)
            .await
    }

    /// Remove a participant from the session (tutor only)
    pub async fn remove_participant(&self, target_user_id: &str) -> Result<()> {
        self.client
            .control(&self.token, ControlCommand::Remove, target_user_id)
            .await
    }

    /// End the session for everyone (tutor only)
    pub async fn end_session(&self) -> Result<()> {
        self.client.end_session(&self.token).await
    }

    /// Leave the session
    pub async fn leave(&self) -> Result<()> {
        self.client.leave(&self.token).await
    }
}

/// One participant's protocol driver
pub struct PeerController {
    config: SessionClientConfig,
    client: SignalingClient,
    events: mpsc::Receiver<ClientEvent>,
    media: LocalMedia,
    peer: Option<ActivePeer>,
    state_tx: watch::Sender<ControllerState>,
    connection_id: ConnectionId,
}

impl PeerController {
    /// Connect to the relay and join the configured session
    pub async fn connect(
        config: SessionClientConfig,
        media: LocalMedia,
    ) -> Result<(Self, ControllerHandle)> {
        config.validate()?;

        let (client, events) = SignalingClient::connect(&config.signaling_url).await?;
        let reply = client
            .join(&config.session_token, &config.user_id)
            .await?;

        info!(
            token = %config.session_token,
            user = %config.user_id,
            conn = %reply.connection_id,
            roster = reply.participants.len(),
            "Joined session"
        );

        // A non-empty roster means someone is already here; they will
        // offer to us once our presence event reaches them.
        let initial = if reply.participants.is_empty() {
            ControllerState::WaitingForParticipant
        } else {
            ControllerState::Negotiating
        };
        let (state_tx, state_rx) = watch::channel(initial);

        let handle = ControllerHandle {
            client: client.clone(),
            token: config.session_token.clone(),
            state_rx,
        };

        let controller = Self {
            connection_id: reply.connection_id,
            config,
            client,
            events,
            media,
            peer: None,
            state_tx,
        };

        Ok((controller, handle))
    }

    /// Our connection handle, assigned by the relay
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Drive the session until it ends
    pub async fn run(mut self) -> Result<ExitReason> {
        loop {
            let Some(event) = self.events.recv().await else {
                return self.finish(ExitReason::ConnectionLost).await;
            };

            match event {
                ClientEvent::Server(event) => {
                    if let Some(reason) = self.handle_event(event).await? {
                        return self.finish(reason).await;
                    }
                }
                ClientEvent::Error { code, message } => {
                    warn!(code, message = %message, "Relay reported an error");
                }
                ClientEvent::Closed => {
                    return self.finish(ExitReason::ConnectionLost).await;
                }
            }
        }
    }

    /// Leave the session voluntarily and tear down
    pub async fn leave(mut self) -> Result<ExitReason> {
        let _ = self.client.leave(&self.config.session_token).await;
        self.finish(ExitReason::Left).await
    }

    async fn handle_event(&mut self, event: ServerEvent) -> Result<Option<ExitReason>> {
        match event {
            ServerEvent::ParticipantJoined {
                connection_id,
                user_id,
                role,
            } => {
                info!(peer = %connection_id, user = %user_id, role = %role, "Participant joined");
                self.start_offer(connection_id).await?;
            }
            ServerEvent::Offer { from, sdp } => {
                self.answer_offer(from, sdp).await?;
            }
            ServerEvent::Answer { from, sdp } => match &self.peer {
                Some(active) if active.remote == from => {
                    active.pc.accept_answer(sdp).await?;
                    debug!(peer = %from, "Answer applied");
                }
                _ => warn!(peer = %from, "Answer from unexpected peer, ignoring"),
            },
            ServerEvent::IceCandidate { from, candidate } => match &self.peer {
                Some(active) if active.remote == from => {
                    if let Err(e) = active.pc.add_remote_candidate(candidate).await {
                        warn!(peer = %from, error = %e, "Failed to apply candidate");
                    }
                }
                _ => debug!(peer = %from, "Candidate from unknown peer, dropping"),
            },
            ServerEvent::ParticipantLeft { connection_id } => {
                if self
                    .peer
                    .as_ref()
                    .is_some_and(|active| active.remote == connection_id)
                {
                    info!(peer = %connection_id, "Participant left, waiting for rejoin");
                    if let Some(active) = self.peer.take() {
                        let _ = active.pc.close().await;
                    }
                    // Local capture stays alive; only the remote sink is
                    // cleared.
                    self.set_state(ControllerState::WaitingForParticipant);
                }
            }
            ServerEvent::AudioMuted => {
                info!("Audio muted by tutor");
                self.media.set_enabled(MediaKind::Audio, false);
            }
            ServerEvent::AudioUnmuted => {
                info!("Audio unmuted by tutor");
                self.media.set_enabled(MediaKind::Audio, true);
            }
            ServerEvent::VideoMuted => {
                info!("Video muted by tutor");
                self.media.set_enabled(MediaKind::Video, false);
            }
            ServerEvent::VideoUnmuted => {
                info!("Video unmuted by tutor");
                self.media.set_enabled(MediaKind::Video, true);
            }
            ServerEvent::Approved => {
                info!("Approved into the lesson");
            }
            ServerEvent::Removed => {
                return Ok(Some(ExitReason::Removed));
            }
            ServerEvent::SessionEnded => {
                return Ok(Some(ExitReason::EndedByTutor));
            }
        }
        Ok(None)
    }

    /// We are the established member: offer to the newcomer
    async fn start_offer(&mut self, remote: ConnectionId) -> Result<()> {
        let pc = self.new_peer(remote).await?;
        let sdp = pc.create_offer().await?;
        self.client
            .offer(&self.config.session_token, remote, sdp)
            .await?;
        self.set_state(ControllerState::Negotiating);
        debug!(peer = %remote, "Offer sent");
        Ok(())
    }

    /// We are the newcomer (or a renegotiation target): answer
    async fn answer_offer(&mut self, from: ConnectionId, sdp: String) -> Result<()> {
        let pc = match &self.peer {
            // Renegotiation on the existing connection
            Some(active) if active.remote == from => Arc::clone(&active.pc),
            _ => self.new_peer(from).await?,
        };

        let answer = pc.accept_offer(sdp).await?;
        self.client
            .answer(&self.config.session_token, from, answer)
            .await?;
        self.set_state(ControllerState::Negotiating);
        debug!(peer = %from, "Answer sent");
        Ok(())
    }

    /// Build the peer connection facing `remote`, wired for trickle ICE
    /// and state reporting. Any previous peer connection is closed: this
    /// system is two-party, one peer connection at a time.
    async fn new_peer(&mut self, remote: ConnectionId) -> Result<Arc<PeerConnection>> {
        if let Some(stale) = self.peer.take() {
            debug!(peer = %stale.remote, "Closing stale peer connection");
            let _ = stale.pc.close().await;
        }

        let pc = Arc::new(PeerConnection::new(remote, &self.config).await?);

        for track in self.media.tracks() {
            pc.add_track(track).await?;
        }

        // Locally discovered candidates go straight to the peer
        let client = self.client.clone();
        let token = self.config.session_token.clone();
        pc.on_local_candidate(move |candidate| {
            let client = client.clone();
            let token = token.clone();
            tokio::spawn(async move {
                if let Err(e) = client.ice_candidate(&token, remote, candidate).await {
                    warn!(error = %e, "Failed to relay candidate");
                }
            });
        });

        let state_tx = self.state_tx.clone();
        pc.on_state_change(move |state| {
            debug!(state = %state, "Peer connection state changed");
            if state == RTCPeerConnectionState::Connected {
                let _ = state_tx.send(ControllerState::Connected);
            }
        });

        self.peer = Some(ActivePeer {
            remote,
            pc: Arc::clone(&pc),
        });
        Ok(pc)
    }

    async fn finish(&mut self, reason: ExitReason) -> Result<ExitReason> {
        if let Some(active) = self.peer.take() {
            let _ = active.pc.close().await;
        }
        self.media.stop();
        self.set_state(ControllerState::Ended(reason));
        info!(message = reason.user_message(), "Session over");
        Ok(reason)
    }

    fn set_state(&self, state: ControllerState) {
        let _ = self.state_tx.send(state);
    }
}

//! Typed signaling messages and events
//!
//! The relay's inbound and outbound vocabulary as tagged unions. The
//! registry dispatches over [`ClientMessage`] and emits [`ServerEvent`]s;
//! the transport layer owns the wire framing and never leaks it in here.
//!
//! Offer/answer SDP and ICE candidate payloads are opaque to the relay:
//! they are carried as strings and forwarded verbatim.

use serde::{Deserialize, Serialize};

use crate::session::{ConnectionId, Participant, Role};

/// ICE candidate payload, relayed without inspection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    /// Candidate attribute line
    pub candidate: String,
    /// Media stream identification tag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    /// Index of the media description the candidate belongs to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

/// Role-gated commands a tutor can issue against another participant
///
/// Targets are addressed by stable user id, so a command stays valid
/// across the target's reconnect. All commands are idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    /// Disable the target's local audio track
    MuteAudio,
    /// Re-enable the target's local audio track
    UnmuteAudio,
    /// Disable the target's local video track
    MuteVideo,
    /// Re-enable the target's local video track
    UnmuteVideo,
    /// Admit a non-tutor participant into the lesson
    Approve,
    /// Tear down the target's connection and eject it from the session
    Remove,
}

impl ControlCommand {
    /// Command name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::MuteAudio => "mute_audio",
            Self::UnmuteAudio => "unmute_audio",
            Self::MuteVideo => "mute_video",
            Self::UnmuteVideo => "unmute_video",
            Self::Approve => "approve",
            Self::Remove => "remove",
        }
    }
}

/// Inbound message from a connected client
#[derive(Debug, Clone)]
pub enum ClientMessage {
    /// Announce intent to join a session token
    Join {
        /// Booking-derived session token
        token: String,
        /// Verified user identifier of the caller
        user_id: String,
    },
    /// Leave the session (the connection stays open)
    Leave {
        /// Session token, for logging; membership is keyed by connection
        token: String,
    },
    /// Relay an SDP offer to one member of the session
    Offer {
        /// Session token the sender claims membership of
        token: String,
        /// Target connection handle
        to: ConnectionId,
        /// Opaque SDP payload
        sdp: String,
    },
    /// Relay an SDP answer to one member of the session
    Answer {
        /// Session token the sender claims membership of
        token: String,
        /// Target connection handle
        to: ConnectionId,
        /// Opaque SDP payload
        sdp: String,
    },
    /// Relay a trickled ICE candidate to one member of the session
    IceCandidate {
        /// Session token the sender claims membership of
        token: String,
        /// Target connection handle
        to: ConnectionId,
        /// Opaque candidate payload
        candidate: IceCandidate,
    },
    /// Tutor-issued control command against another participant
    Control {
        /// Session token
        token: String,
        /// The command
        command: ControlCommand,
        /// Stable user id of the target
        target_user_id: String,
    },
    /// Tutor-issued termination of the whole session
    EndSession {
        /// Session token
        token: String,
    },
}

impl ClientMessage {
    /// Message kind for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Join { .. } => "join",
            Self::Leave { .. } => "leave",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice_candidate",
            Self::Control { .. } => "control",
            Self::EndSession { .. } => "end_session",
        }
    }
}

/// Event pushed from the relay to one specific connection
#[derive(Debug, Clone)]
pub enum ServerEvent {
    /// A new participant joined the session
    ParticipantJoined {
        /// The new participant's connection handle
        connection_id: ConnectionId,
        /// Stable user id
        user_id: String,
        /// Server-derived role
        role: Role,
    },
    /// A participant left or disconnected
    ParticipantLeft {
        /// The departed connection handle
        connection_id: ConnectionId,
    },
    /// Relayed SDP offer
    Offer {
        /// Sending connection handle
        from: ConnectionId,
        /// Opaque SDP payload
        sdp: String,
    },
    /// Relayed SDP answer
    Answer {
        /// Sending connection handle
        from: ConnectionId,
        /// Opaque SDP payload
        sdp: String,
    },
    /// Relayed ICE candidate
    IceCandidate {
        /// Sending connection handle
        from: ConnectionId,
        /// Opaque candidate payload
        candidate: IceCandidate,
    },
    /// Your local audio track was muted by the tutor
    AudioMuted,
    /// Your local audio track was unmuted by the tutor
    AudioUnmuted,
    /// Your local video track was muted by the tutor
    VideoMuted,
    /// Your local video track was unmuted by the tutor
    VideoUnmuted,
    /// You were approved into the lesson
    Approved,
    /// You were removed from the session by the tutor
    Removed,
    /// The session was ended by the tutor
    SessionEnded,
}

impl ServerEvent {
    /// Event name for logging and wire method selection
    pub fn name(&self) -> &'static str {
        match self {
            Self::ParticipantJoined { .. } => "participant_joined",
            Self::ParticipantLeft { .. } => "participant_left",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice_candidate",
            Self::AudioMuted => "audio_muted",
            Self::AudioUnmuted => "audio_unmuted",
            Self::VideoMuted => "video_muted",
            Self::VideoUnmuted => "video_unmuted",
            Self::Approved => "approved",
            Self::Removed => "removed",
            Self::SessionEnded => "session_ended",
        }
    }
}

/// Reply to a successful join: the caller's handle plus the current
/// roster, so the new arrival can initiate negotiation with each member
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinReply {
    /// Connection handle assigned to the caller
    pub connection_id: ConnectionId,
    /// Members already in the session, with their media state
    pub participants: Vec<Participant>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_command_names() {
        assert_eq!(ControlCommand::MuteAudio.name(), "mute_audio");
        assert_eq!(ControlCommand::Remove.name(), "remove");
    }

    #[test]
    fn test_control_command_wire_form() {
        let json = serde_json::to_string(&ControlCommand::UnmuteVideo).unwrap();
        assert_eq!(json, "\"unmute_video\"");
        let back: ControlCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(back, ControlCommand::UnmuteVideo);
    }

    #[test]
    fn test_ice_candidate_optional_fields() {
        let json = r#"{"candidate":"candidate:1 1 UDP 2122252543 192.0.2.1 54321 typ host"}"#;
        let candidate: IceCandidate = serde_json::from_str(json).unwrap();
        assert!(candidate.sdp_mid.is_none());
        assert!(candidate.sdp_m_line_index.is_none());
    }

    #[test]
    fn test_event_names() {
        let event = ServerEvent::ParticipantLeft {
            connection_id: ConnectionId::new(),
        };
        assert_eq!(event.name(), "participant_left");
        assert_eq!(ServerEvent::SessionEnded.name(), "session_ended");
    }
}

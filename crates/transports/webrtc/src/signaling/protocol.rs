//! JSON-RPC 2.0 framing for the signaling wire
//!
//! Frames are mapped to and from the typed unions in `lessonlive-core`
//! here, so neither the relay handler nor the client ever touches raw
//! JSON beyond this module. SDP and ICE payloads pass through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use lessonlive_core::{
    ClientMessage, ConnectionId, ControlCommand, IceCandidate, Role, ServerEvent,
};

/// Wire method names
pub mod methods {
    /// Join a session, reply carries the roster
    pub const SESSION_JOIN: &str = "session.join";
    /// Leave the session, no reply
    pub const SESSION_LEAVE: &str = "session.leave";
    /// Tutor-only: terminate the session for everyone
    pub const SESSION_END: &str = "session.end";
    /// Relay an SDP offer
    pub const PEER_OFFER: &str = "peer.offer";
    /// Relay an SDP answer
    pub const PEER_ANSWER: &str = "peer.answer";
    /// Relay a trickled ICE candidate
    pub const PEER_ICE_CANDIDATE: &str = "peer.ice_candidate";
    /// Tutor-only control commands
    pub const CONTROL_MUTE_AUDIO: &str = "control.mute_audio";
    pub const CONTROL_UNMUTE_AUDIO: &str = "control.unmute_audio";
    pub const CONTROL_MUTE_VIDEO: &str = "control.mute_video";
    pub const CONTROL_UNMUTE_VIDEO: &str = "control.unmute_video";
    pub const CONTROL_APPROVE: &str = "control.approve";
    pub const CONTROL_REMOVE: &str = "control.remove";

    /// Notifications pushed by the relay
    pub const SESSION_PARTICIPANT_JOINED: &str = "session.participant_joined";
    pub const SESSION_PARTICIPANT_LEFT: &str = "session.participant_left";
    pub const SESSION_ENDED: &str = "session.ended";
    pub const CONTROL_AUDIO_MUTED: &str = "control.audio_muted";
    pub const CONTROL_AUDIO_UNMUTED: &str = "control.audio_unmuted";
    pub const CONTROL_VIDEO_MUTED: &str = "control.video_muted";
    pub const CONTROL_VIDEO_UNMUTED: &str = "control.video_unmuted";
    pub const CONTROL_APPROVED: &str = "control.approved";
    pub const CONTROL_REMOVED: &str = "control.removed";
}

/// JSON-RPC error codes
pub mod error_codes {
    /// Invalid JSON was received
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON is not a valid request object
    pub const INVALID_REQUEST: i64 = -32600;
    /// The method does not exist
    pub const METHOD_NOT_FOUND: i64 = -32601;
    /// Invalid method parameters
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal relay error
    pub const INTERNAL_ERROR: i64 = -32603;

    /// Sender is not a member of the addressed session
    pub const NOT_A_SESSION_MEMBER: i64 = -32000;
    /// The booking does not authorize this user for the session
    pub const NOT_AUTHORIZED: i64 = -32001;
    /// Control command issued without the tutor role
    pub const COMMAND_NOT_PERMITTED: i64 = -32002;
    /// Command target is not in the session
    pub const TARGET_NOT_IN_SESSION: i64 = -32003;
    /// Session token failed structural validation
    pub const INVALID_TOKEN: i64 = -32004;
}

/// JSON-RPC request or notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: Value,
    /// Correlation id; absent for notifications
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
}

impl JsonRpcRequest {
    /// Build a request with a correlation id
    pub fn new(method: &str, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: Some(json!(id)),
        }
    }

    /// Build a notification (no reply expected)
    pub fn notification(method: &str, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: None,
        }
    }

    /// Whether this frame expects no reply
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }

    /// Serialize to a wire frame
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// JSON-RPC success response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// Always "2.0"
    pub jsonrpc: String,
    /// Result payload
    pub result: Value,
    /// Correlation id of the request
    pub id: Value,
}

impl JsonRpcResponse {
    /// Build a response for a request id
    pub fn new(result: Value, id: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result,
            id,
        }
    }

    /// Serialize to a wire frame
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// JSON-RPC error object body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcErrorBody {
    /// Error code
    pub code: i64,
    /// Human-readable message
    pub message: String,
    /// Optional structured detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// JSON-RPC error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    /// Always "2.0"
    pub jsonrpc: String,
    /// The error body
    pub error: JsonRpcErrorBody,
    /// Correlation id, or null for frames without one
    pub id: Value,
}

impl JsonRpcError {
    /// Build an error response
    pub fn new(code: i64, message: impl Into<String>, id: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            error: JsonRpcErrorBody {
                code,
                message: message.into(),
                data: None,
            },
            id,
        }
    }

    /// Serialize to a wire frame
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// One parsed inbound frame, from either direction
#[derive(Debug)]
pub enum IncomingFrame {
    /// A request or notification
    Request(JsonRpcRequest),
    /// A success response
    Response {
        /// Correlation id
        id: Value,
        /// Result payload
        result: Value,
    },
    /// An error response
    Error {
        /// Correlation id (null when the frame had none)
        id: Value,
        /// Error code
        code: i64,
        /// Error message
        message: String,
    },
}

/// Parse a wire frame into its JSON-RPC shape
pub fn parse_frame(text: &str) -> serde_json::Result<IncomingFrame> {
    let value: Value = serde_json::from_str(text)?;
    if value.get("method").is_some() {
        let request: JsonRpcRequest = serde_json::from_value(value)?;
        return Ok(IncomingFrame::Request(request));
    }
    if let Some(error) = value.get("error") {
        let code = error.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        let id = value.get("id").cloned().unwrap_or(Value::Null);
        return Ok(IncomingFrame::Error { id, code, message });
    }
    let id = value.get("id").cloned().unwrap_or(Value::Null);
    let result = value.get("result").cloned().unwrap_or(Value::Null);
    Ok(IncomingFrame::Response { id, result })
}

// ---------------------------------------------------------------------------
// Params structs
// ---------------------------------------------------------------------------

/// Params for `session.join`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinParams {
    /// Booking-derived session token
    pub session_token: String,
    /// Verified user identifier
    pub user_id: String,
}

/// Params for `session.leave` and `session.end`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionParams {
    /// Session token
    pub session_token: String,
}

/// Params for `peer.offer` / `peer.answer` requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SdpParams {
    /// Session token
    pub session_token: String,
    /// Target connection handle
    pub to: ConnectionId,
    /// Opaque SDP payload
    pub sdp: String,
}

/// Params for `peer.ice_candidate` requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IceParams {
    /// Session token
    pub session_token: String,
    /// Target connection handle
    pub to: ConnectionId,
    /// Opaque candidate payload
    #[serde(flatten)]
    pub candidate: IceCandidate,
}

/// Params for the six `control.*` requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlParams {
    /// Session token
    pub session_token: String,
    /// Stable user id of the target
    pub target_user_id: String,
}

/// Params for the `session.participant_joined` notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantJoinedParams {
    /// The new participant's connection handle
    pub connection_id: ConnectionId,
    /// Stable user id
    pub user_id: String,
    /// Server-derived role
    pub role: Role,
}

/// Params for the `session.participant_left` notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParticipantLeftParams {
    /// The departed connection handle
    pub connection_id: ConnectionId,
}

/// Params for relayed `peer.offer` / `peer.answer` notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayedSdpParams {
    /// Sending connection handle
    pub from: ConnectionId,
    /// Opaque SDP payload
    pub sdp: String,
}

/// Params for relayed `peer.ice_candidate` notifications
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayedIceParams {
    /// Sending connection handle
    pub from: ConnectionId,
    /// Opaque candidate payload
    #[serde(flatten)]
    pub candidate: IceCandidate,
}

// ---------------------------------------------------------------------------
// Frame <-> typed-union mapping
// ---------------------------------------------------------------------------

fn control_method(command: ControlCommand) -> &'static str {
    match command {
        ControlCommand::MuteAudio => methods::CONTROL_MUTE_AUDIO,
        ControlCommand::UnmuteAudio => methods::CONTROL_UNMUTE_AUDIO,
        ControlCommand::MuteVideo => methods::CONTROL_MUTE_VIDEO,
        ControlCommand::UnmuteVideo => methods::CONTROL_UNMUTE_VIDEO,
        ControlCommand::Approve => methods::CONTROL_APPROVE,
        ControlCommand::Remove => methods::CONTROL_REMOVE,
    }
}

fn control_command_for(method: &str) -> Option<ControlCommand> {
    match method {
        methods::CONTROL_MUTE_AUDIO => Some(ControlCommand::MuteAudio),
        methods::CONTROL_UNMUTE_AUDIO => Some(ControlCommand::UnmuteAudio),
        methods::CONTROL_MUTE_VIDEO => Some(ControlCommand::MuteVideo),
        methods::CONTROL_UNMUTE_VIDEO => Some(ControlCommand::UnmuteVideo),
        methods::CONTROL_APPROVE => Some(ControlCommand::Approve),
        methods::CONTROL_REMOVE => Some(ControlCommand::Remove),
        _ => None,
    }
}

/// A request the relay could not map to a message
#[derive(Debug)]
pub struct RequestError {
    /// JSON-RPC error code
    pub code: i64,
    /// Human-readable message
    pub message: String,
}

/// Map an inbound request to a typed [`ClientMessage`] (relay side)
pub fn message_from_request(
    request: &JsonRpcRequest,
) -> std::result::Result<ClientMessage, RequestError> {
    let invalid_params = |e: serde_json::Error| RequestError {
        code: error_codes::INVALID_PARAMS,
        message: format!("Invalid params for {}: {}", request.method, e),
    };

    match request.method.as_str() {
        methods::SESSION_JOIN => {
            let params: JoinParams =
                serde_json::from_value(request.params.clone()).map_err(invalid_params)?;
            Ok(ClientMessage::Join {
                token: params.session_token,
                user_id: params.user_id,
            })
        }
        methods::SESSION_LEAVE => {
            let params: SessionParams =
                serde_json::from_value(request.params.clone()).map_err(invalid_params)?;
            Ok(ClientMessage::Leave {
                token: params.session_token,
            })
        }
        methods::SESSION_END => {
            let params: SessionParams =
                serde_json::from_value(request.params.clone()).map_err(invalid_params)?;
            Ok(ClientMessage::EndSession {
                token: params.session_token,
            })
        }
        methods::PEER_OFFER => {
            let params: SdpParams =
                serde_json::from_value(request.params.clone()).map_err(invalid_params)?;
            Ok(ClientMessage::Offer {
                token: params.session_token,
                to: params.to,
                sdp: params.sdp,
            })
        }
        methods::PEER_ANSWER => {
            let params: SdpParams =
                serde_json::from_value(request.params.clone()).map_err(invalid_params)?;
            Ok(ClientMessage::Answer {
                token: params.session_token,
                to: params.to,
                sdp: params.sdp,
            })
        }
        methods::PEER_ICE_CANDIDATE => {
            let params: IceParams =
                serde_json::from_value(request.params.clone()).map_err(invalid_params)?;
            Ok(ClientMessage::IceCandidate {
                token: params.session_token,
                to: params.to,
                candidate: params.candidate,
            })
        }
        method => {
            if let Some(command) = control_command_for(method) {
                let params: ControlParams =
                    serde_json::from_value(request.params.clone()).map_err(invalid_params)?;
                Ok(ClientMessage::Control {
                    token: params.session_token,
                    command,
                    target_user_id: params.target_user_id,
                })
            } else {
                Err(RequestError {
                    code: error_codes::METHOD_NOT_FOUND,
                    message: format!("Unknown method: {}", method),
                })
            }
        }
    }
}

/// Build the wire request for a typed [`ClientMessage`] (client side)
///
/// `session.leave` goes out as a notification; everything else carries a
/// correlation id and expects a reply.
pub fn request_for_message(message: &ClientMessage, id: Option<u64>) -> JsonRpcRequest {
    let (method, params) = match message {
        ClientMessage::Join { token, user_id } => (
            methods::SESSION_JOIN,
            json!(JoinParams {
                session_token: token.clone(),
                user_id: user_id.clone(),
            }),
        ),
        ClientMessage::Leave { token } => (
            methods::SESSION_LEAVE,
            json!(SessionParams {
                session_token: token.clone(),
            }),
        ),
        ClientMessage::EndSession { token } => (
            methods::SESSION_END,
            json!(SessionParams {
                session_token: token.clone(),
            }),
        ),
        ClientMessage::Offer { token, to, sdp } => (
            methods::PEER_OFFER,
            json!(SdpParams {
                session_token: token.clone(),
                to: *to,
                sdp: sdp.clone(),
            }),
        ),
        ClientMessage::Answer { token, to, sdp } => (
            methods::PEER_ANSWER,
            json!(SdpParams {
                session_token: token.clone(),
                to: *to,
                sdp: sdp.clone(),
            }),
        ),
        ClientMessage::IceCandidate {
            token,
            to,
            candidate,
        } => (
            methods::PEER_ICE_CANDIDATE,
            json!(IceParams {
                session_token: token.clone(),
                to: *to,
                candidate: candidate.clone(),
            }),
        ),
        ClientMessage::Control {
            token,
            command,
            target_user_id,
        } => (
            control_method(*command),
            json!(ControlParams {
                session_token: token.clone(),
                target_user_id: target_user_id.clone(),
            }),
        ),
    };

    match id {
        Some(id) => JsonRpcRequest::new(method, params, id),
        None => JsonRpcRequest::notification(method, params),
    }
}

/// Build the notification frame for a [`ServerEvent`] (relay side)
pub fn notification_for_event(event: &ServerEvent) -> JsonRpcRequest {
    match event {
        ServerEvent::ParticipantJoined {
            connection_id,
            user_id,
            role,
        } => JsonRpcRequest::notification(
            methods::SESSION_PARTICIPANT_JOINED,
            json!(ParticipantJoinedParams {
                connection_id: *connection_id,
                user_id: user_id.clone(),
                role: *role,
            }),
        ),
        ServerEvent::ParticipantLeft { connection_id } => JsonRpcRequest::notification(
            methods::SESSION_PARTICIPANT_LEFT,
            json!(ParticipantLeftParams {
                connection_id: *connection_id,
            }),
        ),
        ServerEvent::Offer { from, sdp } => JsonRpcRequest::notification(
            methods::PEER_OFFER,
            json!(RelayedSdpParams {
                from: *from,
                sdp: sdp.clone(),
            }),
        ),
        ServerEvent::Answer { from, sdp } => JsonRpcRequest::notification(
            methods::PEER_ANSWER,
            json!(RelayedSdpParams {
                from: *from,
                sdp: sdp.clone(),
            }),
        ),
        ServerEvent::IceCandidate { from, candidate } => JsonRpcRequest::notification(
            methods::PEER_ICE_CANDIDATE,
            json!(RelayedIceParams {
                from: *from,
                candidate: candidate.clone(),
            }),
        ),
        ServerEvent::AudioMuted => {
            JsonRpcRequest::notification(methods::CONTROL_AUDIO_MUTED, json!({}))
        }
        ServerEvent::AudioUnmuted => {
            JsonRpcRequest::notification(methods::CONTROL_AUDIO_UNMUTED, json!({}))
        }
        ServerEvent::VideoMuted => {
            JsonRpcRequest::notification(methods::CONTROL_VIDEO_MUTED, json!({}))
        }
        ServerEvent::VideoUnmuted => {
            JsonRpcRequest::notification(methods::CONTROL_VIDEO_UNMUTED, json!({}))
        }
        ServerEvent::Approved => {
            JsonRpcRequest::notification(methods::CONTROL_APPROVED, json!({}))
        }
        ServerEvent::Removed => {
            JsonRpcRequest::notification(methods::CONTROL_REMOVED, json!({}))
        }
        ServerEvent::SessionEnded => {
            JsonRpcRequest::notification(methods::SESSION_ENDED, json!({}))
        }
    }
}

/// Map an inbound notification to a [`ServerEvent`] (client side)
pub fn event_from_notification(
    request: &JsonRpcRequest,
) -> crate::error::Result<ServerEvent> {
    use crate::error::Error;

    let invalid = |e: serde_json::Error| {
        Error::Signaling(format!("bad params for {}: {}", request.method, e))
    };

    match request.method.as_str() {
        methods::SESSION_PARTICIPANT_JOINED => {
            let params: ParticipantJoinedParams =
                serde_json::from_value(request.params.clone()).map_err(invalid)?;
            Ok(ServerEvent::ParticipantJoined {
                connection_id: params.connection_id,
                user_id: params.user_id,
                role: params.role,
            })
        }
        methods::SESSION_PARTICIPANT_LEFT => {
            let params: ParticipantLeftParams =
                serde_json::from_value(request.params.clone()).map_err(invalid)?;
            Ok(ServerEvent::ParticipantLeft {
                connection_id: params.connection_id,
            })
        }
        methods::PEER_OFFER => {
            let params: RelayedSdpParams =
                serde_json::from_value(request.params.clone()).map_err(invalid)?;
            Ok(ServerEvent::Offer {
                from: params.from,
                sdp: params.sdp,
            })
        }
        methods::PEER_ANSWER => {
            let params: RelayedSdpParams =
                serde_json::from_value(request.params.clone()).map_err(invalid)?;
            Ok(ServerEvent::Answer {
                from: params.from,
                sdp: params.sdp,
            })
        }
        methods::PEER_ICE_CANDIDATE => {
            let params: RelayedIceParams =
                serde_json::from_value(request.params.clone()).map_err(invalid)?;
            Ok(ServerEvent::IceCandidate {
                from: params.from,
                candidate: params.candidate,
            })
        }
        methods::CONTROL_AUDIO_MUTED => Ok(ServerEvent::AudioMuted),
        methods::CONTROL_AUDIO_UNMUTED => Ok(ServerEvent::AudioUnmuted),
        methods::CONTROL_VIDEO_MUTED => Ok(ServerEvent::VideoMuted),
        methods::CONTROL_VIDEO_UNMUTED => Ok(ServerEvent::VideoUnmuted),
        methods::CONTROL_APPROVED => Ok(ServerEvent::Approved),
        methods::CONTROL_REMOVED => Ok(ServerEvent::Removed),
        methods::SESSION_ENDED => Ok(ServerEvent::SessionEnded),
        other => Err(Error::Signaling(format!("unknown notification: {}", other))),
    }
}

/// JSON-RPC error code for a core rejection
pub fn rejection_code(error: &lessonlive_core::Error) -> i64 {
    use lessonlive_core::Error as Core;
    match error {
        Core::InvalidToken(_) => error_codes::INVALID_TOKEN,
        Core::NotAuthorized { .. } => error_codes::NOT_AUTHORIZED,
        Core::NotASessionMember => error_codes::NOT_A_SESSION_MEMBER,
        Core::CommandNotPermitted | Core::ApproveTargetIsTutor => {
            error_codes::COMMAND_NOT_PERMITTED
        }
        Core::TargetNotInSession { .. } => error_codes::TARGET_NOT_IN_SESSION,
        _ => error_codes::INTERNAL_ERROR,
    }
}

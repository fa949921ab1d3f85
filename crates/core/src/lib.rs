//! Core signaling domain for LessonLive video sessions
//!
//! Transport-agnostic building blocks for the session coordination layer:
//! the in-memory session registry, the typed message/event unions it
//! dispatches over, role resolution, and the shared error taxonomy.
//!
//! Nothing in this crate touches a socket. The registry consumes
//! [`protocol::ClientMessage`] values and produces a
//! [`registry::DispatchOutcome`] describing the reply, the events to push
//! to other connections, and the connections to hang up; the transport
//! layer in `lessonlive-webrtc` maps those onto WebSocket frames.

pub mod auth;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod session;

pub use auth::{BookingEntry, RoleDirectory, StaticRoleDirectory};
pub use error::{Error, Result};
pub use protocol::{ClientMessage, ControlCommand, IceCandidate, JoinReply, ServerEvent};
pub use registry::{DispatchOutcome, DispatchReply, OutboundEvent, SessionRegistry};
pub use session::{
    validate_session_token, ConnectionId, MediaState, Participant, Role, Session, SessionState,
    TokenError,
};

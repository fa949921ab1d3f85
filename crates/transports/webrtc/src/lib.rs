//! WebRTC transport for LessonLive video sessions
//!
//! Two halves share this crate, mirroring the two ends of the signaling
//! wire:
//!
//! - the **relay**: a WebSocket server that feeds every parsed frame into
//!   the `lessonlive-core` session registry and fans the resulting events
//!   out to per-connection senders ([`signaling::websocket`]);
//! - the **client**: a signaling connection ([`signaling::SignalingClient`])
//!   and the [`session::PeerController`] that drives offer/answer/ICE
//!   exchange against one remote participant and applies tutor control
//!   commands to the local media tracks.
//!
//! The relay carries no media. Once negotiation completes, audio and
//! video flow directly between the two peers.

pub mod config;
pub mod error;
pub mod media;
pub mod peer;
pub mod session;
pub mod signaling;

pub use config::{SessionClientConfig, SignalingServerConfig, TurnServerConfig};
pub use error::{Error, Result};
pub use media::{CaptureDevice, LocalMedia, MediaAcquisition, MediaKind, NullCaptureDevice};
pub use peer::PeerConnection;
pub use session::{ControllerHandle, ControllerState, ExitReason, PeerController};
pub use signaling::{ClientEvent, SignalingClient};
pub use signaling::websocket::{ServerHandle, SharedState, SignalingServer};

//! Error types for the LessonLive WebRTC transport

use thiserror::Error;

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the transport layer
#[derive(Debug, Error)]
pub enum Error {
    /// Signaling protocol error (malformed frame, unexpected method)
    #[error("Signaling error: {0}")]
    Signaling(String),

    /// The relay rejected a request
    #[error("Rejected by relay ({code}): {message}")]
    Rejected {
        /// JSON-RPC error code
        code: i64,
        /// Human-readable message from the relay
        message: String,
    },

    /// The signaling connection closed
    #[error("Signaling connection closed")]
    ConnectionClosed,

    /// Local media acquisition failure (camera/microphone)
    #[error("Media error: {0}")]
    Media(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// WebSocket transport error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// WebRTC stack error
    #[error("WebRTC error: {0}")]
    WebRtc(#[from] webrtc::Error),

    /// Signaling core error
    #[error(transparent)]
    Core(#[from] lessonlive_core::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

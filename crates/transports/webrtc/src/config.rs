//! Transport configuration
//!
//! One config struct per end of the wire: the relay's listener settings
//! and the client's connection/ICE settings. Both validate before use so
//! misconfiguration fails at startup, not mid-session.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use lessonlive_core::validate_session_token;

/// Default per-connection outbound queue capacity
pub const DEFAULT_CHANNEL_CAPACITY: usize = 128;

/// Default maximum accepted frame size (SDP offers run a few KB)
pub const DEFAULT_MAX_FRAME_BYTES: usize = 256 * 1024;

/// Configuration for the WebSocket signaling relay
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalingServerConfig {
    /// Address the relay listens on
    pub bind_address: String,
    /// Per-connection outbound queue capacity
    pub channel_capacity: usize,
    /// Maximum accepted inbound frame size in bytes
    pub max_frame_bytes: usize,
}

impl Default for SignalingServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1:8080".to_string(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl SignalingServerConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.bind_address
            .parse::<std::net::SocketAddr>()
            .map_err(|e| Error::Config(format!("invalid bind address: {}", e)))?;
        if self.channel_capacity == 0 {
            return Err(Error::Config("channel_capacity must be non-zero".into()));
        }
        Ok(())
    }
}

/// TURN server credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnServerConfig {
    /// TURN URLs (e.g. `turn:turn.example.com:3478`)
    pub urls: Vec<String>,
    /// Username
    pub username: String,
    /// Credential
    pub credential: String,
}

/// Configuration for a session client: signaling connection plus ICE
#[derive(Debug, Clone)]
pub struct SessionClientConfig {
    /// WebSocket URL of the signaling relay
    pub signaling_url: String,
    /// Booking-derived session token to join
    pub session_token: String,
    /// Verified user identifier of this participant
    pub user_id: String,
    /// STUN servers for candidate discovery
    pub stun_servers: Vec<String>,
    /// TURN servers for relayed connectivity
    pub turn_servers: Vec<TurnServerConfig>,
}

impl Default for SessionClientConfig {
    fn default() -> Self {
        Self {
            signaling_url: "ws://localhost:8080".to_string(),
            session_token: String::new(),
            user_id: String::new(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            turn_servers: vec![],
        }
    }
}

impl SessionClientConfig {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        let url = url::Url::parse(&self.signaling_url)
            .map_err(|e| Error::Config(format!("invalid signaling URL: {}", e)))?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(Error::Config(format!(
                    "signaling URL must be ws:// or wss://, got {}://",
                    other
                )))
            }
        }
        validate_session_token(&self.session_token)
            .map_err(|e| Error::Config(format!("invalid session token: {}", e)))?;
        if self.user_id.is_empty() {
            return Err(Error::Config("user_id must be set".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_config_validation() {
        assert!(SignalingServerConfig::default().validate().is_ok());

        let bad_addr = SignalingServerConfig {
            bind_address: "not-an-address".into(),
            ..Default::default()
        };
        assert!(bad_addr.validate().is_err());

        let zero_capacity = SignalingServerConfig {
            channel_capacity: 0,
            ..Default::default()
        };
        assert!(zero_capacity.validate().is_err());
    }

    #[test]
    fn test_client_config_validation() {
        let config = SessionClientConfig {
            session_token: "lesson-1".into(),
            user_id: "alice".into(),
            ..Default::default()
        };
        assert!(config.validate().is_ok());

        let bad_scheme = SessionClientConfig {
            signaling_url: "http://localhost:8080".into(),
            ..config.clone()
        };
        assert!(bad_scheme.validate().is_err());

        let bad_token = SessionClientConfig {
            session_token: "not a token".into(),
            ..config.clone()
        };
        assert!(bad_token.validate().is_err());

        let missing_user = SessionClientConfig {
            user_id: String::new(),
            ..config
        };
        assert!(missing_user.validate().is_err());
    }
}

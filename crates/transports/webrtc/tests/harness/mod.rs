//! Test harness: loopback relay plus thin signaling clients
//!
//! Binds the relay on an ephemeral port with a canned role directory so
//! tests exercise the real WebSocket path end to end.

#![allow(dead_code)]

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;

use lessonlive_core::{Role, ServerEvent, SessionRegistry, StaticRoleDirectory};
use lessonlive_webrtc::{
    ClientEvent, ServerHandle, SessionClientConfig, SignalingServer, SignalingServerConfig,
};

/// The lesson every test joins
pub const TOKEN: &str = "lesson-1";

/// How long tests wait for an expected event
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// Initialize tracing for tests (call once per test)
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info,webrtc=warn")
        .try_init();
}

/// Role directory for the canned lesson: alice teaches, bob and carol
/// learn
pub fn lesson_directory() -> StaticRoleDirectory {
    let mut directory = StaticRoleDirectory::new();
    directory.insert(TOKEN, "alice", Role::Tutor);
    directory.insert(TOKEN, "bob", Role::Student);
    directory.insert(TOKEN, "carol", Role::Student);
    directory
}

/// A relay bound to a loopback ephemeral port
pub struct RelayHarness {
    handle: ServerHandle,
}

impl RelayHarness {
    /// Start a relay with the canned lesson directory
    pub async fn start() -> Self {
        Self::start_with(lesson_directory()).await
    }

    /// Start a relay with a specific role directory
    pub async fn start_with(directory: StaticRoleDirectory) -> Self {
        let config = SignalingServerConfig {
            bind_address: "127.0.0.1:0".to_string(),
            ..Default::default()
        };
        let registry = SessionRegistry::new(std::sync::Arc::new(directory));
        let handle = SignalingServer::bind(config, registry)
            .await
            .expect("relay bind failed");
        Self { handle }
    }

    /// WebSocket URL for clients
    pub fn url(&self) -> String {
        self.handle.url()
    }

    /// The relay handle, for registry introspection
    pub fn handle(&self) -> &ServerHandle {
        &self.handle
    }

    /// Client config pointing a user at this relay
    pub fn client_config(&self, user_id: &str) -> SessionClientConfig {
        SessionClientConfig {
            signaling_url: self.url(),
            session_token: TOKEN.to_string(),
            user_id: user_id.to_string(),
            stun_servers: vec![],
            ..Default::default()
        }
    }

    /// Stop the relay
    pub async fn shutdown(self) {
        self.handle.shutdown().await;
    }
}

/// Receive the next relay-pushed event or panic
pub async fn recv_server_event(events: &mut mpsc::Receiver<ClientEvent>) -> ServerEvent {
    match timeout(EVENT_TIMEOUT, events.recv()).await {
        Ok(Some(ClientEvent::Server(event))) => event,
        other => panic!("expected a server event, got {:?}", other),
    }
}

/// Receive the next client event of any kind or panic
pub async fn recv_client_event(events: &mut mpsc::Receiver<ClientEvent>) -> ClientEvent {
    match timeout(EVENT_TIMEOUT, events.recv()).await {
        Ok(Some(event)) => event,
        other => panic!("expected an event, got {:?}", other),
    }
}

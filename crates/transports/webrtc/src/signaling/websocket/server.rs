//! Relay server: accept loop and lifecycle handle

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::handler::{handle_connection, SharedState};
use crate::config::SignalingServerConfig;
use crate::error::Result;
use lessonlive_core::SessionRegistry;

/// The WebSocket signaling relay
pub struct SignalingServer;

impl SignalingServer {
    /// Bind the relay and start accepting connections
    ///
    /// Returns once the listener is bound; accepted connections are
    /// served on spawned tasks until [`ServerHandle::shutdown`].
    pub async fn bind(
        config: SignalingServerConfig,
        registry: SessionRegistry,
    ) -> Result<ServerHandle> {
        config.validate()?;

        let listener = TcpListener::bind(&config.bind_address).await?;
        let local_addr = listener.local_addr()?;
        info!(addr = %local_addr, "Signaling relay listening");

        let state = Arc::new(SharedState::new(registry, Arc::new(config)));
        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);

        let accept_state = Arc::clone(&state);
        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _)) => {
                                let state = Arc::clone(&accept_state);
                                tokio::spawn(async move {
                                    if let Err(e) = handle_connection(stream, state).await {
                                        warn!(error = %e, "Connection handler failed");
                                    }
                                });
                            }
                            Err(e) => {
                                error!(error = %e, "Accept failed");
                            }
                        }
                    }
                    _ = shutdown_rx.changed() => {
                        info!("Signaling relay shutting down");
                        break;
                    }
                }
            }
        });

        Ok(ServerHandle {
            local_addr,
            state,
            shutdown_tx,
            task,
        })
    }
}

/// Handle to a running relay
pub struct ServerHandle {
    local_addr: SocketAddr,
    state: Arc<SharedState>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ServerHandle {
    /// The address the relay is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// WebSocket URL clients should connect to
    pub fn url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Shared state, for registry introspection in tests
    pub fn state(&self) -> &Arc<SharedState> {
        &self.state
    }

    /// Stop accepting connections and tear the accept loop down
    ///
    /// Connections already accepted run until their sockets close.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self.task.await;
    }
}

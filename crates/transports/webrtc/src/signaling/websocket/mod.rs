//! WebSocket signaling relay
//!
//! One WebSocket per participant; JSON-RPC 2.0 frames in both
//! directions. The relay owns no session logic of its own: every parsed
//! frame goes through the `lessonlive-core` registry, and the resulting
//! outcome is fanned out over per-connection senders.

mod handler;
mod server;

pub use handler::{handle_connection, SharedState};
pub use server::{ServerHandle, SignalingServer};

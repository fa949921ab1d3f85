//! Signaling protocol, client, and relay server
//!
//! The wire is JSON-RPC 2.0 over one WebSocket per participant: requests
//! for client-initiated messages, notifications for relay-pushed events.
//! [`protocol`] owns the framing and the mapping to the typed unions in
//! `lessonlive-core`; [`websocket`] is the relay; [`client`] is the
//! participant side.

pub mod client;
pub mod protocol;
pub mod websocket;

pub use client::{ClientEvent, SignalingClient};

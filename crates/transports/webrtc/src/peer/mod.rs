//! WebRTC peer connection management

mod connection;

pub use connection::PeerConnection;

//! Client-side session orchestration

pub mod controller;

pub use controller::{ControllerHandle, ControllerState, ExitReason, PeerController};

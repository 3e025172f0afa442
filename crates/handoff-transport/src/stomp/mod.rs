//! STOMP 1.2 over WebSocket.

pub mod client;
pub mod frame;

pub use client::{StompConnector, StompHandle};
pub use frame::{Command, Frame, parse_frames};

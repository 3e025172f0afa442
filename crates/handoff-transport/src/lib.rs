//! # handoff-transport
//!
//! The publish/subscribe transport the coordinator talks through.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`traits`] | [`TransportConnector`], [`TransportHandle`], [`FrameHandler`] |
//! | [`stomp`] | STOMP 1.2 over WebSocket ([`StompConnector`]) |
//! | [`memory`] | In-process broker ([`MemoryTransport`]) |
//! | [`errors`] | [`TransportError`] |

#![deny(unsafe_code)]

pub mod errors;
pub mod memory;
pub mod stomp;
pub mod traits;

pub use errors::TransportError;
pub use memory::{MemoryTransport, SentFrame};
pub use stomp::{StompConnector, StompHandle};
pub use traits::{
    Credentials, FrameHandler, InboundMessage, SubscriptionId, TransportConnector,
    TransportHandle,
};

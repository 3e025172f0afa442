//! # handoff-core
//!
//! Foundation types shared by every crate in the handoff coordinator.
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`ids`] | [`ChannelId`], [`Participant`], nonce generation |
//! | [`events`] | [`ChannelEvent`], [`EventKind`], [`Role`], [`ChannelMode`], [`Notice`] |
//! | [`wire`] | Inbound/outbound JSON frames and STOMP destinations |
//! | [`errors`] | [`WireError`], [`ProtocolViolation`] |
//! | [`logging`] | `tracing` subscriber setup |
//! | [`constants`] | Protocol timings and package metadata |

#![deny(unsafe_code)]

pub mod constants;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod wire;

pub use errors::{ProtocolViolation, WireError};
pub use events::{ChannelEvent, ChannelMode, DedupKey, EventKind, Notice, Origin, Role};
pub use ids::{ChannelId, Participant};

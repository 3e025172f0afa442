//! Error types shared across the coordinator.

use thiserror::Error;

use crate::events::ChannelMode;

/// Errors decoding or encoding wire frames.
#[derive(Debug, Error)]
pub enum WireError {
    /// The body was not valid JSON for the expected shape.
    #[error("malformed frame body: {0}")]
    Json(#[from] serde_json::Error),
    /// The frame carried neither a control type nor any text.
    #[error("frame has no control type and no text")]
    Empty,
}

/// An event that is not valid in the channel's current mode.
///
/// Violations are logged and dropped; they never change channel state.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{event} is not accepted while {mode}")]
pub struct ProtocolViolation {
    /// Mode the channel was in.
    pub mode: ChannelMode,
    /// Label of the rejected trigger.
    pub event: String,
}

impl ProtocolViolation {
    /// Build a violation record.
    pub fn new(mode: ChannelMode, event: impl Into<String>) -> Self {
        Self {
            mode,
            event: event.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

//! Coordinator error types.

use handoff_core::{ChannelId, ProtocolViolation, WireError};
use handoff_oracle::OracleError;
use handoff_transport::TransportError;

/// Errors raised while coordinating a channel.
///
/// None of these end a channel. Violations are logged and dropped; the
/// rest are surfaced to the user as notices or returned to the caller.
#[derive(Debug, thiserror::Error)]
pub enum CoordinatorError {
    /// Connect, send, or subscribe failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An event arrived that the current mode does not accept.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// A handoff was requested without a signed-in participant.
    #[error("handoff requested without identity on {channel_id}")]
    UnauthorizedHandoff {
        /// Channel the request was made on.
        channel_id: ChannelId,
    },

    /// The automated responder failed.
    #[error("responder error: {0}")]
    Oracle(#[from] OracleError),

    /// A frame could not be encoded or decoded.
    #[error("wire error: {0}")]
    Wire(#[from] WireError),

    /// Reading or writing local state failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// The channel was disposed.
    #[error("channel {channel_id} is closed")]
    ChannelClosed {
        /// The disposed channel.
        channel_id: ChannelId,
    },
}

impl CoordinatorError {
    /// Whether retrying the operation may succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_retryable(),
            Self::Oracle(_) | Self::Storage(_) => true,
            Self::Protocol(_)
            | Self::UnauthorizedHandoff { .. }
            | Self::Wire(_)
            | Self::ChannelClosed { .. } => false,
        }
    }

    /// Stable label for logs and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Protocol(_) => "protocol_violation",
            Self::UnauthorizedHandoff { .. } => "unauthorized_handoff",
            Self::Oracle(_) => "oracle",
            Self::Wire(_) => "wire",
            Self::Storage(_) => "storage",
            Self::ChannelClosed { .. } => "channel_closed",
        }
    }
}

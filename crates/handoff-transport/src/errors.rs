//! Transport error types.

use thiserror::Error;

/// Errors from the publish/subscribe transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The connection could not be established.
    #[error("failed to connect to {url}: {reason}")]
    Connect {
        /// Endpoint that was dialed.
        url: String,
        /// Why it failed.
        reason: String,
    },

    /// An operation did not complete in time.
    #[error("timed out after {timeout_ms}ms: {context}")]
    Timeout {
        /// How long we waited.
        timeout_ms: u64,
        /// What was being waited for.
        context: String,
    },

    /// The handle is not (or no longer) connected.
    #[error("transport is not connected")]
    NotConnected,

    /// The broker rejected a frame or closed the session with an error.
    #[error("broker error: {message}")]
    Broker {
        /// Message reported by the broker.
        message: String,
    },

    /// A frame violated the wire protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The underlying socket failed.
    #[error("socket error: {0}")]
    Socket(String),
}

impl TransportError {
    /// Whether the caller may retry by reconnecting.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Connect { .. } | Self::Timeout { .. } | Self::NotConnected | Self::Socket(_)
        )
    }
}

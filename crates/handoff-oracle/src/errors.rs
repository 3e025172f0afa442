//! Automated responder error types.

use thiserror::Error;

/// Errors from the automated responder.
#[derive(Debug, Error)]
pub enum OracleError {
    /// The request could not be sent or the connection failed.
    #[error("request failed: {0}")]
    Request(String),

    /// The request did not complete in time.
    #[error("timed out after {timeout_ms}ms")]
    Timeout {
        /// Configured timeout.
        timeout_ms: u64,
    },

    /// The endpoint answered with a non-success status.
    #[error("status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body, truncated.
        body: String,
    },

    /// The response body was not a usable answer.
    #[error("malformed response: {0}")]
    Malformed(String),
}

impl OracleError {
    /// Short label shown to users in notices.
    pub fn short_reason(&self) -> String {
        match self {
            Self::Request(_) => "network error".into(),
            Self::Timeout { .. } => "timed out".into(),
            Self::Status { status, .. } => format!("status {status}"),
            Self::Malformed(_) => "unexpected response".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_display() {
        let err = OracleError::Status {
            status: 503,
            body: "busy".into(),
        };
        assert_eq!(err.to_string(), "status 503: busy");
        assert_eq!(err.short_reason(), "status 503");
    }

    #[test]
    fn timeout_short_reason() {
        assert_eq!(OracleError::Timeout { timeout_ms: 10 }.short_reason(), "timed out");
    }
}

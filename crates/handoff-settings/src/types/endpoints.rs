//! Remote endpoints: the pub/sub transport and the automated responder.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pub/sub transport settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TransportSettings {
    /// WebSocket URL of the STOMP endpoint.
    pub url: String,
    /// Prefix for outbound destinations.
    pub app_prefix: String,
    /// Prefix for inbound topics.
    pub topic_prefix: String,
    /// Timeout for the WebSocket + STOMP handshake.
    pub connect_timeout_ms: u64,
    /// First reconnect delay; doubles on each failed attempt.
    pub reconnect_delay_ms: u64,
    /// Upper bound on the reconnect delay.
    pub reconnect_max_delay_ms: u64,
    /// Bearer token sent with `CONNECT`, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws/websocket".to_string(),
            app_prefix: "/app".to_string(),
            topic_prefix: "/topic".to_string(),
            connect_timeout_ms: 10_000,
            reconnect_delay_ms: 5_000,
            reconnect_max_delay_ms: 60_000,
            access_token: None,
        }
    }
}

impl TransportSettings {
    /// Connect timeout as a [`Duration`].
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Reconnect delay as a [`Duration`].
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    /// Reconnect delay cap as a [`Duration`].
    pub fn reconnect_max_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_max_delay_ms)
    }
}

/// Automated responder settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OracleSettings {
    /// Base URL of the HTTP API.
    pub base_url: String,
    /// Path of the chat endpoint.
    pub chat_path: String,
    /// Request timeout.
    pub timeout_ms: u64,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            chat_path: "/api/ai/chat".to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl OracleSettings {
    /// Full chat endpoint URL.
    pub fn chat_url(&self) -> String {
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            self.chat_path.trim_start_matches('/')
        )
    }

    /// Request timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

//! Automated responder: a request/response oracle for AI answers.
//!
//! [`HttpAiResponder`] posts `{ message, userId, sessionId }` to the chat
//! endpoint and expects `{ answer }` back. Any non-success status or a body
//! without a usable answer is an [`OracleError`].

use std::time::Duration;

use async_trait::async_trait;
use handoff_core::ChannelId;
use handoff_settings::OracleSettings;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::errors::OracleError;

/// Longest response body kept in a status error.
const MAX_ERROR_BODY: usize = 512;

/// One question for the responder.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AiQuery {
    /// Question text.
    pub message: String,
    /// Account id of the asker, if signed in.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Channel the question was asked on.
    pub session_id: ChannelId,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    answer: Option<String>,
}

/// Produces automated answers.
#[async_trait]
pub trait AiResponder: Send + Sync {
    /// Answer `query`.
    async fn answer(&self, query: &AiQuery) -> Result<String, OracleError>;
}

/// [`AiResponder`] backed by the HTTP chat endpoint.
#[derive(Clone, Debug)]
pub struct HttpAiResponder {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpAiResponder {
    /// Build a responder from settings.
    pub fn new(settings: &OracleSettings) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()
            .map_err(|e| OracleError::Request(e.to_string()))?;
        Ok(Self {
            client,
            url: settings.chat_url(),
            timeout: settings.timeout(),
        })
    }

    /// Endpoint URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn map_send_error(&self, e: &reqwest::Error) -> OracleError {
        if e.is_timeout() {
            OracleError::Timeout {
                timeout_ms: u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX),
            }
        } else {
            OracleError::Request(e.to_string())
        }
    }
}

#[async_trait]
impl AiResponder for HttpAiResponder {
    #[instrument(skip(self, query), fields(channel_id = %query.session_id))]
    async fn answer(&self, query: &AiQuery) -> Result<String, OracleError> {
        let resp = self
            .client
            .post(&self.url)
            .json(query)
            .send()
            .await
            .map_err(|e| self.map_send_error(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let mut body = resp.text().await.unwrap_or_default();
            body.truncate(floor_char_boundary(&body, MAX_ERROR_BODY));
            warn!(status = status.as_u16(), "responder returned error status");
            return Err(OracleError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| OracleError::Malformed(e.to_string()))?;
        let answer = parsed
            .answer
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .ok_or_else(|| OracleError::Malformed("missing answer".into()))?;

        debug!(len = answer.len(), "responder answered");
        Ok(answer)
    }
}

fn floor_char_boundary(s: &str, max: usize) -> usize {
    if s.len() <= max {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

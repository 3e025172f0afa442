//! The transport contract the coordinator consumes.
//!
//! A [`TransportConnector`] dials the broker and yields a shared
//! [`TransportHandle`]. Handles deliver inbound frames to a synchronous
//! [`FrameHandler`]; handlers must not block.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::TransportError;

/// A frame delivered on a subscribed topic.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    /// Topic the frame arrived on.
    pub destination: String,
    /// Raw frame body.
    pub body: String,
}

/// Callback invoked for every inbound frame on a subscription.
pub type FrameHandler = Arc<dyn Fn(InboundMessage) + Send + Sync>;

/// Identifier of one active subscription on a handle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Credentials presented when connecting.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Bearer token, sent as an `Authorization` header.
    pub access_token: Option<String>,
}

impl Credentials {
    /// Anonymous credentials.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Credentials carrying a bearer token.
    pub fn bearer(token: impl Into<String>) -> Self {
        Self {
            access_token: Some(token.into()),
        }
    }
}

/// Dials the broker.
#[async_trait]
pub trait TransportConnector: Send + Sync {
    /// Open a connection. Failures are retried by the caller.
    async fn connect(
        &self,
        credentials: &Credentials,
    ) -> Result<Arc<dyn TransportHandle>, TransportError>;
}

/// A live broker connection.
#[async_trait]
pub trait TransportHandle: Send + Sync {
    /// Whether the connection is currently usable.
    fn is_connected(&self) -> bool;

    /// Subscribe `handler` to `topic`.
    async fn subscribe(
        &self,
        topic: &str,
        handler: FrameHandler,
    ) -> Result<SubscriptionId, TransportError>;

    /// Cancel a subscription. Unknown ids are ignored.
    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError>;

    /// Publish `body` to `destination`.
    async fn send(&self, destination: &str, body: &str) -> Result<(), TransportError>;

    /// Close the connection. Safe to call more than once.
    async fn disconnect(&self);
}

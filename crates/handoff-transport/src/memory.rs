//! In-process broker.
//!
//! [`MemoryTransport`] implements both [`TransportConnector`] and
//! [`TransportHandle`] against a local topic table. Frames sent through it
//! are recorded and can be inspected; frames can be injected on any topic
//! with [`MemoryTransport::publish`].

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use crate::errors::TransportError;
use crate::traits::{
    Credentials, FrameHandler, InboundMessage, SubscriptionId, TransportConnector,
    TransportHandle,
};

/// A frame published through the transport.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SentFrame {
    /// Destination path.
    pub destination: String,
    /// Raw body.
    pub body: String,
}

struct Subscription {
    topic: String,
    handler: FrameHandler,
}

/// In-process broker and connection.
pub struct MemoryTransport {
    connected: AtomicBool,
    refuse_connect: AtomicBool,
    next_sub: AtomicU64,
    connects: AtomicU64,
    subscriptions: Mutex<HashMap<SubscriptionId, Subscription>>,
    sent: Mutex<Vec<SentFrame>>,
}

impl MemoryTransport {
    /// Create a disconnected broker.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            connected: AtomicBool::new(false),
            refuse_connect: AtomicBool::new(false),
            next_sub: AtomicU64::new(1),
            connects: AtomicU64::new(0),
            subscriptions: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        })
    }

    /// Create a broker that is already connected.
    pub fn connected() -> Arc<Self> {
        let t = Self::new();
        t.set_connected(true);
        t
    }

    /// Force the liveness flag, simulating a drop or a recovery.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Make subsequent `connect` calls fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.refuse_connect.store(refuse, Ordering::SeqCst);
    }

    /// Number of successful `connect` calls.
    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::SeqCst)
    }

    /// Deliver `body` to every handler subscribed to `topic`.
    ///
    /// Returns the number of handlers invoked.
    pub fn publish(&self, topic: &str, body: &str) -> usize {
        let handlers: Vec<FrameHandler> = self
            .subscriptions
            .lock()
            .values()
            .filter(|s| s.topic == topic)
            .map(|s| Arc::clone(&s.handler))
            .collect();
        for handler in &handlers {
            handler(InboundMessage {
                destination: topic.to_string(),
                body: body.to_string(),
            });
        }
        handlers.len()
    }

    /// Every frame sent so far, in order.
    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().clone()
    }

    /// Frames sent to `destination`, in order.
    pub fn sent_to(&self, destination: &str) -> Vec<SentFrame> {
        self.sent
            .lock()
            .iter()
            .filter(|f| f.destination == destination)
            .cloned()
            .collect()
    }

    /// Number of live subscriptions on `topic`.
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscriptions
            .lock()
            .values()
            .filter(|s| s.topic == topic)
            .count()
    }
}

#[async_trait]
impl TransportConnector for Arc<MemoryTransport> {
    async fn connect(
        &self,
        _credentials: &Credentials,
    ) -> Result<Arc<dyn TransportHandle>, TransportError> {
        if self.refuse_connect.load(Ordering::SeqCst) {
            return Err(TransportError::Connect {
                url: "memory://".into(),
                reason: "connection refused".into(),
            });
        }
        self.set_connected(true);
        let _ = self.connects.fetch_add(1, Ordering::SeqCst);
        let handle: Arc<dyn TransportHandle> = Arc::clone(self) as Arc<dyn TransportHandle>;
        Ok(handle)
    }
}

#[async_trait]
impl TransportHandle for MemoryTransport {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn subscribe(
        &self,
        topic: &str,
        handler: FrameHandler,
    ) -> Result<SubscriptionId, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let id = SubscriptionId(self.next_sub.fetch_add(1, Ordering::SeqCst));
        let _ = self.subscriptions.lock().insert(
            id,
            Subscription {
                topic: topic.to_string(),
                handler,
            },
        );
        debug!(%id, topic, "memory subscribe");
        Ok(id)
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
        let _ = self.subscriptions.lock().remove(&id);
        Ok(())
    }

    async fn send(&self, destination: &str, body: &str) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.sent.lock().push(SentFrame {
            destination: destination.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }

    async fn disconnect(&self) {
        self.set_connected(false);
        self.subscriptions.lock().clear();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

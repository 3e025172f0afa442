//! Session registry: one [`ChannelContext`] per channel id.
//!
//! Channels are created lazily on first use and live until they are
//! explicitly disposed or reset. Operations on an id that is not registered
//! are logged and otherwise ignored; a later `get_or_create` starts a fresh
//! channel rather than resurrecting the old one.

use std::sync::Arc;

use dashmap::DashMap;
use handoff_core::{ChannelEvent, ChannelId, Participant};
use handoff_transport::TransportHandle;
use metrics::gauge;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

use crate::context::{ChannelConfig, ChannelContext, ChannelServices};
use crate::errors::CoordinatorError;
use crate::metrics::CHANNELS_ACTIVE;

/// Owns every live channel.
pub struct SessionRegistry {
    channels: DashMap<ChannelId, Arc<ChannelContext>>,
    /// Serializes creation so concurrent callers share one context.
    create_lock: Mutex<()>,
    default_participant: Option<Participant>,
    config: ChannelConfig,
    services: ChannelServices,
}

impl SessionRegistry {
    /// Create an empty registry.
    ///
    /// `default_participant` is attached to channels created through
    /// [`get_or_create`](Self::get_or_create).
    pub fn new(
        config: ChannelConfig,
        services: ChannelServices,
        default_participant: Option<Participant>,
    ) -> Self {
        Self {
            channels: DashMap::new(),
            create_lock: Mutex::new(()),
            default_participant,
            config,
            services,
        }
    }

    /// The live channel for `channel_id`, creating it if needed.
    pub async fn get_or_create(&self, channel_id: &ChannelId) -> Arc<ChannelContext> {
        self.get_or_create_for(channel_id, self.default_participant.clone())
            .await
    }

    /// Like [`get_or_create`](Self::get_or_create) with an explicit
    /// participant. An existing channel keeps the participant it was
    /// created with.
    pub async fn get_or_create_for(
        &self,
        channel_id: &ChannelId,
        participant: Option<Participant>,
    ) -> Arc<ChannelContext> {
        if let Some(ctx) = self.get(channel_id) {
            return ctx;
        }

        let _guard = self.create_lock.lock().await;
        if let Some(ctx) = self.get(channel_id) {
            return ctx;
        }
        let ctx = ChannelContext::open(
            channel_id.clone(),
            participant,
            self.config.clone(),
            self.services.clone(),
        )
        .await;
        let _ = self.channels.insert(channel_id.clone(), Arc::clone(&ctx));
        self.record_gauge();
        info!(%channel_id, channels = self.channels.len(), "channel registered");
        ctx
    }

    /// The live channel for `channel_id`, if registered.
    pub fn get(&self, channel_id: &ChannelId) -> Option<Arc<ChannelContext>> {
        self.channels
            .get(channel_id)
            .map(|entry| Arc::clone(entry.value()))
            .filter(|ctx| !ctx.is_closed())
    }

    /// Process a local event on a registered channel.
    ///
    /// Unknown ids are a no-op.
    pub async fn dispatch(
        &self,
        channel_id: &ChannelId,
        event: ChannelEvent,
    ) -> Result<(), CoordinatorError> {
        let Some(ctx) = self.get(channel_id) else {
            debug!(%channel_id, kind = %event.kind, "dispatch to unknown channel ignored");
            return Ok(());
        };
        ctx.dispatch(event).await
    }

    /// Stop a channel: disarm its watchdog, drop its subscription, and
    /// forget it. Unknown ids are a no-op.
    #[instrument(skip(self), fields(channel_id = %channel_id))]
    pub async fn dispose(&self, channel_id: &ChannelId) {
        let Some((_, ctx)) = self.channels.remove(channel_id) else {
            debug!("dispose of unknown channel ignored");
            return;
        };
        ctx.close().await;
        self.record_gauge();
        info!(channels = self.channels.len(), "channel disposed");
    }

    /// Dispose `channel_id` and start a fresh channel under the same id.
    ///
    /// The new channel keeps the old one's participant.
    pub async fn reset(&self, channel_id: &ChannelId) -> Arc<ChannelContext> {
        let participant = match self.get(channel_id) {
            Some(ctx) => ctx.participant().cloned(),
            None => self.default_participant.clone(),
        };
        self.dispose(channel_id).await;
        self.get_or_create_for(channel_id, participant).await
    }

    /// Swap the transport after a reconnect and tell every channel.
    pub async fn replace_transport(&self, handle: Arc<dyn TransportHandle>) {
        self.services.transport.replace(handle);
        for ctx in self.contexts() {
            ctx.resubscribe().await;
            ctx.transport_restored();
        }
        info!(channels = self.channels.len(), "transport replaced");
    }

    /// Dispose every channel.
    pub async fn shutdown(&self) {
        for id in self.channel_ids() {
            self.dispose(&id).await;
        }
    }

    /// Registered channel ids.
    pub fn channel_ids(&self) -> Vec<ChannelId> {
        self.channels.iter().map(|e| e.key().clone()).collect()
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether no channel is registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Shared services.
    pub fn services(&self) -> &ChannelServices {
        &self.services
    }

    fn contexts(&self) -> Vec<Arc<ChannelContext>> {
        self.channels.iter().map(|e| Arc::clone(e.value())).collect()
    }

    fn record_gauge(&self) {
        #[allow(clippy::cast_precision_loss)]
        gauge!(CHANNELS_ACTIVE).set(self.channels.len() as f64);
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("channels", &self.channels.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handoff_core::ChannelMode;
    use handoff_transport::MemoryTransport;

    fn registry(t: &Arc<MemoryTransport>) -> SessionRegistry {
        let handle: Arc<dyn TransportHandle> = Arc::clone(t) as Arc<dyn TransportHandle>;
        SessionRegistry::new(
            ChannelConfig::default(),
            ChannelServices::new(handle),
            Some(Participant::new("9")),
        )
    }

    #[tokio::test]
    async fn get_or_create_is_lazy_and_stable() {
        let t = MemoryTransport::connected();
        let r = registry(&t);
        let id = ChannelId::for_user("9", "a");
        assert!(r.get(&id).is_none());

        let a = r.get_or_create(&id).await;
        let b = r.get_or_create(&id).await;
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(r.len(), 1);
        assert_eq!(a.participant().map(|p| p.user_id.as_str()), Some("9"));
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let t = MemoryTransport::connected();
        let r = registry(&t);
        let a = r.get_or_create(&ChannelId::for_user("9", "a")).await;
        let b = r.get_or_create(&ChannelId::for_user("9", "b")).await;
        a.request_handoff().await.unwrap();
        assert_eq!(a.mode(), ChannelMode::HandoffRequested);
        assert_eq!(b.mode(), ChannelMode::Ai);
    }

    #[tokio::test]
    async fn dispose_unknown_is_noop() {
        let t = MemoryTransport::connected();
        let r = registry(&t);
        r.dispose(&ChannelId::for_guest("nope")).await;
        assert!(r.is_empty());
    }

    #[tokio::test]
    async fn dispatch_unknown_is_noop() {
        let t = MemoryTransport::connected();
        let r = registry(&t);
        r.dispatch(&ChannelId::for_guest("nope"), ChannelEvent::user_message("x"))
            .await
            .unwrap();
        assert!(t.sent().is_empty());
    }

    #[tokio::test]
    async fn dispose_then_recreate_is_fresh() {
        let t = MemoryTransport::connected();
        let r = registry(&t);
        let id = ChannelId::for_user("9", "a");
        let old = r.get_or_create(&id).await;
        old.request_handoff().await.unwrap();

        r.dispose(&id).await;
        assert!(old.is_closed());
        assert!(r.get(&id).is_none());
        assert_eq!(t.subscriber_count(old.topic()), 0);

        let new = r.get_or_create(&id).await;
        assert!(!Arc::ptr_eq(&old, &new));
        assert_eq!(new.mode(), ChannelMode::Ai);
        assert_eq!(t.subscriber_count(new.topic()), 1);
    }

    #[tokio::test]
    async fn reset_keeps_participant() {
        let t = MemoryTransport::connected();
        let r = registry(&t);
        let id = ChannelId::for_user("5", "a");
        let old = r
            .get_or_create_for(&id, Some(Participant::new("5")))
            .await;
        let new = r.reset(&id).await;
        assert!(old.is_closed());
        assert_eq!(new.participant().map(|p| p.user_id.as_str()), Some("5"));
        assert_eq!(r.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_disposes_all() {
        let t = MemoryTransport::connected();
        let r = registry(&t);
        let a = r.get_or_create(&ChannelId::for_guest("a")).await;
        let _b = r.get_or_create(&ChannelId::for_guest("b")).await;
        r.shutdown().await;
        assert!(r.is_empty());
        assert!(a.is_closed());
    }
}

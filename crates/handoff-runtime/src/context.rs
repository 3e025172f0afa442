//! One live channel: a single-writer actor around the state machine.
//!
//! [`ChannelContext`] owns the channel's [`ProtocolStateMachine`],
//! [`MessageDeduplicator`] and [`InactivityWatchdog`] inside a spawned task.
//! Everything that touches channel state (local events, inbound frames,
//! watchdog expiries, responder replies) is posted to that task's inbox and
//! handled strictly in arrival order. Observers follow the channel through a
//! broadcast of [`ChannelUpdate`]s.

use std::sync::Arc;
use std::time::Duration;

use handoff_core::constants::IDLE_TIMEOUT;
use handoff_core::wire::{OutboundFrame, decode_inbound, room_topic};
use handoff_core::{ChannelEvent, ChannelId, ChannelMode, EventKind, Participant, Role};
use handoff_oracle::{AiQuery, AiResponder, AllowAll, GateDecision, QueryGate};
use handoff_settings::HandoffSettings;
use handoff_transport::{FrameHandler, InboundMessage, SubscriptionId, TransportHandle};
use metrics::counter;
use parking_lot::{Mutex, RwLock};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::dedup::{DedupConfig, MessageDeduplicator};
use crate::errors::CoordinatorError;
use crate::machine::{Effect, OracleOutcome, ProtocolStateMachine, Step, Trigger};
use crate::metrics::{
    EVENTS_TOTAL, IGNORED_EVENTS_TOTAL, MODE_TRANSITIONS_TOTAL, ORACLE_FAILURES_TOTAL,
    SEND_FAILURES_TOTAL, WATCHDOG_TIMEOUTS_TOTAL,
};
use crate::watchdog::{InactivityWatchdog, WatchdogFired};

/// Default capacity of the per-channel update broadcast.
const DEFAULT_UPDATE_CAPACITY: usize = 256;

// ─────────────────────────────────────────────────────────────────────────────
// Configuration and services
// ─────────────────────────────────────────────────────────────────────────────

/// Per-channel tuning.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelConfig {
    /// Duplicate suppression timing.
    pub dedup: DedupConfig,
    /// Idle period before an agent session is released.
    pub idle_timeout: Duration,
    /// Prefix of outbound destinations.
    pub app_prefix: String,
    /// Prefix of inbound topics.
    pub topic_prefix: String,
    /// Capacity of the update broadcast. Slow observers lag past this.
    pub update_capacity: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            dedup: DedupConfig::default(),
            idle_timeout: IDLE_TIMEOUT,
            app_prefix: "/app".into(),
            topic_prefix: "/topic".into(),
            update_capacity: DEFAULT_UPDATE_CAPACITY,
        }
    }
}

impl ChannelConfig {
    /// Derive channel tuning from loaded settings.
    pub fn from_settings(settings: &HandoffSettings) -> Self {
        Self {
            dedup: DedupConfig::from(&settings.dedup),
            idle_timeout: settings.watchdog.idle_timeout(),
            app_prefix: settings.transport.app_prefix.clone(),
            topic_prefix: settings.transport.topic_prefix.clone(),
            update_capacity: settings.registry.event_buffer_capacity.max(1),
        }
    }
}

/// The connection every channel publishes through. Swapped on reconnect.
#[derive(Clone)]
pub struct TransportSlot(Arc<RwLock<Arc<dyn TransportHandle>>>);

impl TransportSlot {
    /// Wrap an initial handle.
    pub fn new(handle: Arc<dyn TransportHandle>) -> Self {
        Self(Arc::new(RwLock::new(handle)))
    }

    /// The handle currently in use.
    pub fn current(&self) -> Arc<dyn TransportHandle> {
        Arc::clone(&self.0.read())
    }

    /// Swap in a new handle.
    pub fn replace(&self, handle: Arc<dyn TransportHandle>) {
        *self.0.write() = handle;
    }
}

impl std::fmt::Debug for TransportSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransportSlot")
            .field("connected", &self.current().is_connected())
            .finish()
    }
}

/// Collaborators shared by every channel.
#[derive(Clone)]
pub struct ChannelServices {
    /// Broker connection.
    pub transport: TransportSlot,
    /// Automated responder. Queries fail with a notice when absent.
    pub responder: Option<Arc<dyn AiResponder>>,
    /// Policy consulted before each automated query.
    pub gate: Arc<dyn QueryGate>,
}

impl ChannelServices {
    /// Services with no responder and a gate that allows everything.
    pub fn new(transport: Arc<dyn TransportHandle>) -> Self {
        Self {
            transport: TransportSlot::new(transport),
            responder: None,
            gate: Arc::new(AllowAll),
        }
    }

    /// Use `responder` for automated answers.
    #[must_use]
    pub fn with_responder(mut self, responder: Arc<dyn AiResponder>) -> Self {
        self.responder = Some(responder);
        self
    }

    /// Use `gate` before automated queries.
    #[must_use]
    pub fn with_gate(mut self, gate: Arc<dyn QueryGate>) -> Self {
        self.gate = gate;
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Updates
// ─────────────────────────────────────────────────────────────────────────────

/// What observers of a channel see.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelUpdate {
    /// The mode moved.
    ModeChanged {
        /// Previous mode.
        from: ChannelMode,
        /// New mode.
        to: ChannelMode,
    },
    /// An event to show: a message, an answer, or a system notice.
    Message(ChannelEvent),
    /// The channel was disposed. Nothing follows.
    Closed,
}

#[derive(Clone, Copy, Debug, Default)]
struct Snapshot {
    mode: ChannelMode,
    last_activity_at: Option<Instant>,
}

type Ack<T> = oneshot::Sender<T>;

/// A live room subscription and the connection it was made on.
struct Subscription {
    handle: Arc<dyn TransportHandle>,
    id: SubscriptionId,
}

impl Subscription {
    async fn cancel(self, channel_id: &ChannelId) {
        if !self.handle.is_connected() {
            return;
        }
        if let Err(e) = self.handle.unsubscribe(self.id).await {
            debug!(%channel_id, id = %self.id, error = %e, "unsubscribe failed");
        }
    }
}

enum Command {
    Local {
        event: ChannelEvent,
        ack: Ack<Result<(), CoordinatorError>>,
    },
    Inbound(String),
    VisibilityResumed,
    TransportRestored,
    OracleReply {
        query_id: u64,
        outcome: OracleOutcome,
    },
    Flush(Ack<()>),
}

// ─────────────────────────────────────────────────────────────────────────────
// ChannelContext
// ─────────────────────────────────────────────────────────────────────────────

/// Handle to a running channel.
pub struct ChannelContext {
    channel_id: ChannelId,
    participant: Option<Participant>,
    topic: String,
    inbox: mpsc::UnboundedSender<Command>,
    updates: broadcast::Sender<ChannelUpdate>,
    snapshot: Arc<RwLock<Snapshot>>,
    transport: TransportSlot,
    subscription: Mutex<Option<Subscription>>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChannelContext {
    /// Subscribe to the channel's room topic and start its actor.
    ///
    /// A failed subscription is logged; the channel still runs and is
    /// re-subscribed by [`resubscribe`](Self::resubscribe).
    #[instrument(skip_all, fields(channel_id = %channel_id))]
    pub async fn open(
        channel_id: ChannelId,
        participant: Option<Participant>,
        config: ChannelConfig,
        services: ChannelServices,
    ) -> Arc<Self> {
        let (inbox, inbox_rx) = mpsc::unbounded_channel();
        let (updates, _) = broadcast::channel(config.update_capacity.max(1));
        let snapshot = Arc::new(RwLock::new(Snapshot::default()));
        let cancel = CancellationToken::new();
        let topic = room_topic(&config.topic_prefix, &channel_id);
        let transport = services.transport.clone();

        let ctx = Arc::new(Self {
            channel_id: channel_id.clone(),
            participant: participant.clone(),
            topic,
            inbox: inbox.clone(),
            updates: updates.clone(),
            snapshot: Arc::clone(&snapshot),
            transport,
            subscription: Mutex::new(None),
            cancel: cancel.clone(),
            task: Mutex::new(None),
        });
        ctx.resubscribe().await;

        let (fire_tx, watchdog_rx) = mpsc::unbounded_channel();
        let actor = ChannelActor {
            machine: ProtocolStateMachine::new(channel_id, participant),
            dedup: MessageDeduplicator::new(config.dedup),
            watchdog: InactivityWatchdog::new(config.idle_timeout, fire_tx),
            watchdog_rx,
            inbox_rx,
            inbox,
            updates,
            snapshot,
            services,
            config,
            cancel,
        };
        *ctx.task.lock() = Some(tokio::spawn(actor.run()));
        info!(channel_id = %ctx.channel_id, "channel opened");
        ctx
    }

    /// Channel identifier.
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Signed-in participant, if any.
    pub fn participant(&self) -> Option<&Participant> {
        self.participant.as_ref()
    }

    /// Inbound topic this channel listens on.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Mode after the last processed command.
    pub fn mode(&self) -> ChannelMode {
        self.snapshot.read().mode
    }

    /// Last accepted activity while an agent was attached.
    pub fn last_activity_at(&self) -> Option<Instant> {
        self.snapshot.read().last_activity_at
    }

    /// Whether the channel has been disposed.
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Follow the channel. Only updates after this call are received.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<ChannelUpdate> {
        self.updates.subscribe()
    }

    /// Process a local event and wait for its effects to complete.
    ///
    /// Returns the reason when the event was refused. Refusals never change
    /// the mode; an unauthorized handoff still emits its notice.
    pub async fn dispatch(&self, event: ChannelEvent) -> Result<(), CoordinatorError> {
        let (ack, done) = oneshot::channel();
        self.post(Command::Local { event, ack })?;
        done.await.map_err(|_| self.closed())?
    }

    /// Ask for a human agent.
    pub async fn request_handoff(&self) -> Result<(), CoordinatorError> {
        self.dispatch(ChannelEvent::control(EventKind::HandoffRequest, Role::User))
            .await
    }

    /// Send a message to the attached agent.
    pub async fn send_text(&self, text: impl Into<String>) -> Result<(), CoordinatorError> {
        self.dispatch(ChannelEvent::user_message(text)).await
    }

    /// End the agent session from this side.
    pub async fn leave(&self) -> Result<(), CoordinatorError> {
        self.dispatch(ChannelEvent::control(EventKind::UserDisconnect, Role::User))
            .await
    }

    /// Ask the automated responder. The answer arrives as an update.
    pub async fn ask(&self, question: impl Into<String>) -> Result<(), CoordinatorError> {
        self.dispatch(ChannelEvent::ai_query(question)).await
    }

    /// Hand a raw inbound frame body to the channel.
    pub fn receive(&self, body: impl Into<String>) {
        let _ = self.post(Command::Inbound(body.into()));
    }

    /// The client returned to the foreground.
    pub fn visibility_resumed(&self) {
        let _ = self.post(Command::VisibilityResumed);
    }

    /// The transport reconnected.
    pub fn transport_restored(&self) {
        let _ = self.post(Command::TransportRestored);
    }

    /// Wait until every command posted before this call has been handled.
    pub async fn flush(&self) -> Result<(), CoordinatorError> {
        let (ack, done) = oneshot::channel();
        self.post(Command::Flush(ack))?;
        done.await.map_err(|_| self.closed())
    }

    /// Subscribe the room topic on the current transport, replacing any
    /// earlier subscription.
    pub async fn resubscribe(&self) {
        let previous = self.subscription.lock().take();
        if let Some(previous) = previous {
            previous.cancel(&self.channel_id).await;
        }
        if self.is_closed() {
            return;
        }

        let inbox = self.inbox.clone();
        let handler: FrameHandler = Arc::new(move |m: InboundMessage| {
            let _ = inbox.send(Command::Inbound(m.body));
        });
        let handle = self.transport.current();
        match handle.subscribe(&self.topic, handler).await {
            Ok(id) => {
                debug!(channel_id = %self.channel_id, topic = %self.topic, %id, "subscribed");
                *self.subscription.lock() = Some(Subscription { handle, id });
                // close() may have run while subscribing.
                if self.is_closed() {
                    let orphan = self.subscription.lock().take();
                    if let Some(orphan) = orphan {
                        orphan.cancel(&self.channel_id).await;
                    }
                }
            }
            Err(e) => {
                warn!(channel_id = %self.channel_id, topic = %self.topic, error = %e, "subscribe failed");
            }
        }
    }

    /// Stop the actor and detach from the transport.
    ///
    /// Commands still queued are dropped. Safe to call more than once.
    #[instrument(skip(self), fields(channel_id = %self.channel_id))]
    pub async fn close(&self) {
        self.cancel.cancel();
        let subscription = self.subscription.lock().take();
        if let Some(subscription) = subscription {
            subscription.cancel(&self.channel_id).await;
        }
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
            info!("channel closed");
        }
    }

    fn post(&self, cmd: Command) -> Result<(), CoordinatorError> {
        if self.is_closed() {
            debug!(channel_id = %self.channel_id, "command for closed channel dropped");
            return Err(self.closed());
        }
        self.inbox.send(cmd).map_err(|_| self.closed())
    }

    fn closed(&self) -> CoordinatorError {
        CoordinatorError::ChannelClosed {
            channel_id: self.channel_id.clone(),
        }
    }
}

impl Drop for ChannelContext {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for ChannelContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelContext")
            .field("channel_id", &self.channel_id)
            .field("mode", &self.mode())
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Actor
// ─────────────────────────────────────────────────────────────────────────────

struct ChannelActor {
    machine: ProtocolStateMachine,
    dedup: MessageDeduplicator,
    watchdog: InactivityWatchdog,
    watchdog_rx: mpsc::UnboundedReceiver<WatchdogFired>,
    inbox_rx: mpsc::UnboundedReceiver<Command>,
    inbox: mpsc::UnboundedSender<Command>,
    updates: broadcast::Sender<ChannelUpdate>,
    snapshot: Arc<RwLock<Snapshot>>,
    services: ChannelServices,
    config: ChannelConfig,
    cancel: CancellationToken,
}

impl ChannelActor {
    async fn run(mut self) {
        let mut sweep = tokio::time::interval_at(
            Instant::now() + self.config.dedup.sweep_interval,
            self.config.dedup.sweep_interval,
        );
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                cmd = self.inbox_rx.recv() => match cmd {
                    Some(cmd) => self.handle(cmd).await,
                    None => break,
                },
                Some(fired) = self.watchdog_rx.recv() => {
                    if self.watchdog.acknowledge(fired) {
                        counter!(WATCHDOG_TIMEOUTS_TOTAL).increment(1);
                        let _ = self.apply(Trigger::WatchdogTimeout).await;
                    }
                }
                _ = sweep.tick() => {
                    let _ = self.dedup.sweep(Instant::now());
                }
            }
        }

        self.watchdog.disarm();
        let _ = self.updates.send(ChannelUpdate::Closed);
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Local { event, ack } => {
                let result = self.on_local(event).await;
                let _ = ack.send(result);
            }
            Command::Inbound(body) => self.on_inbound(&body).await,
            Command::VisibilityResumed => {
                let _ = self.apply(Trigger::VisibilityResumed).await;
            }
            Command::TransportRestored => {
                let _ = self.apply(Trigger::TransportRestored).await;
            }
            Command::OracleReply { query_id, outcome } => {
                let _ = self.apply(Trigger::OracleReply { query_id, outcome }).await;
            }
            Command::Flush(ack) => {
                let _ = ack.send(());
            }
        }
    }

    async fn on_local(&mut self, event: ChannelEvent) -> Result<(), CoordinatorError> {
        counter!(EVENTS_TOTAL, "kind" => event.kind.as_str(), "origin" => "local").increment(1);
        let key = (event.kind == EventKind::UserMessage).then(|| event.dedup_key());
        let result = self.apply(Trigger::local(event)).await;
        if let (Some(key), Ok(())) = (key, &result) {
            // The server echoes what we send; treat that echo as a repeat.
            self.dedup.record(&key);
        }
        result
    }

    async fn on_inbound(&mut self, body: &str) {
        let Some(event) = decode_inbound(body) else {
            debug!(channel_id = %self.machine.channel_id(), "empty inbound frame dropped");
            return;
        };
        if self.dedup.seen(&event.dedup_key()) {
            return;
        }
        counter!(EVENTS_TOTAL, "kind" => event.kind.as_str(), "origin" => "remote").increment(1);
        let _ = self.apply(Trigger::remote(event)).await;
    }

    async fn apply(&mut self, trigger: Trigger) -> Result<(), CoordinatorError> {
        let step = self.machine.apply(trigger, Instant::now());
        {
            let mut snap = self.snapshot.write();
            snap.mode = self.machine.mode();
            snap.last_activity_at = self.machine.last_activity_at();
        }
        let Step {
            effects,
            transitions,
            rejected,
        } = step;

        for (from, to) in transitions {
            counter!(MODE_TRANSITIONS_TOTAL, "from" => from.to_string(), "to" => to.to_string())
                .increment(1);
            self.emit(ChannelUpdate::ModeChanged { from, to });
        }
        for effect in effects {
            self.perform(effect).await;
        }

        match rejected {
            None => Ok(()),
            Some(err) => {
                if matches!(err, CoordinatorError::Protocol(_)) {
                    counter!(IGNORED_EVENTS_TOTAL, "mode" => self.machine.mode().to_string())
                        .increment(1);
                }
                Err(err)
            }
        }
    }

    async fn perform(&mut self, effect: Effect) {
        match effect {
            Effect::Send(frame) => self.send(&frame).await,
            Effect::Notice(notice) => self.emit(ChannelUpdate::Message(ChannelEvent::notice(&notice))),
            Effect::Deliver(event) => self.emit(ChannelUpdate::Message(event)),
            Effect::ArmWatchdog => self.watchdog.arm(),
            Effect::DisarmWatchdog => self.watchdog.disarm(),
            Effect::QueryOracle { query_id, question } => self.spawn_query(query_id, question),
        }
    }

    async fn send(&self, frame: &OutboundFrame) {
        let destination = frame
            .destination()
            .path(&self.config.app_prefix, self.machine.channel_id());
        let body = match frame.encode() {
            Ok(body) => body,
            Err(e) => {
                warn!(channel_id = %self.machine.channel_id(), error = %e, "frame encode failed");
                return;
            }
        };

        let transport = self.services.transport.current();
        if !transport.is_connected() {
            warn!(channel_id = %self.machine.channel_id(), %destination, "transport down, frame dropped");
            counter!(SEND_FAILURES_TOTAL, "destination" => destination).increment(1);
            return;
        }
        if let Err(e) = transport.send(&destination, &body).await {
            warn!(channel_id = %self.machine.channel_id(), %destination, error = %e, "send failed");
            counter!(SEND_FAILURES_TOTAL, "destination" => destination).increment(1);
        }
    }

    fn spawn_query(&self, query_id: u64, question: String) {
        let responder = self.services.responder.clone();
        let gate = Arc::clone(&self.services.gate);
        let participant = self.machine.participant().cloned();
        let channel_id = self.machine.channel_id().clone();
        let inbox = self.inbox.clone();
        let cancel = self.cancel.clone();

        let _handle = tokio::spawn(async move {
            let outcome = tokio::select! {
                () = cancel.cancelled() => return,
                outcome = run_query(responder, gate, participant, channel_id, question) => outcome,
            };
            let _ = inbox.send(Command::OracleReply { query_id, outcome });
        });
    }

    fn emit(&self, update: ChannelUpdate) {
        let _ = self.updates.send(update);
    }
}

async fn run_query(
    responder: Option<Arc<dyn AiResponder>>,
    gate: Arc<dyn QueryGate>,
    participant: Option<Participant>,
    channel_id: ChannelId,
    question: String,
) -> OracleOutcome {
    if let GateDecision::Deny { reason } = gate.check(participant.as_ref(), &question).await {
        info!(%channel_id, %reason, "query denied by gate");
        return OracleOutcome::Denied(reason);
    }
    let Some(responder) = responder else {
        warn!(%channel_id, "no responder configured");
        counter!(ORACLE_FAILURES_TOTAL, "reason" => "unconfigured").increment(1);
        return OracleOutcome::Failed("not configured".into());
    };

    let query = AiQuery {
        message: question,
        user_id: participant.map(|p| p.user_id),
        session_id: channel_id,
    };
    match responder.answer(&query).await {
        Ok(answer) => OracleOutcome::Answer(answer),
        Err(e) => {
            warn!(channel_id = %query.session_id, error = %e, "responder failed");
            counter!(ORACLE_FAILURES_TOTAL, "reason" => e.short_reason()).increment(1);
            OracleOutcome::Failed(e.short_reason())
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use handoff_transport::{MemoryTransport, TransportError};

    async fn open(transport: &Arc<MemoryTransport>, participant: Option<Participant>) -> Arc<ChannelContext> {
        let handle: Arc<dyn TransportHandle> = Arc::clone(transport) as Arc<dyn TransportHandle>;
        ChannelContext::open(
            ChannelId::for_user("1", "n"),
            participant,
            ChannelConfig::default(),
            ChannelServices::new(handle),
        )
        .await
    }

    #[tokio::test]
    async fn open_subscribes_room_topic() {
        let t = MemoryTransport::connected();
        let ctx = open(&t, None).await;
        assert_eq!(ctx.topic(), "/topic/rooms/user-1-n");
        assert_eq!(t.subscriber_count("/topic/rooms/user-1-n"), 1);
        assert_eq!(ctx.mode(), ChannelMode::Ai);
    }

    #[tokio::test]
    async fn open_survives_failed_subscribe() {
        let t = MemoryTransport::new();
        let ctx = open(&t, None).await;
        assert_eq!(t.subscriber_count(ctx.topic()), 0);

        t.set_connected(true);
        ctx.resubscribe().await;
        assert_eq!(t.subscriber_count(ctx.topic()), 1);
    }

    #[tokio::test]
    async fn resubscribe_replaces_previous_subscription() {
        let t = MemoryTransport::connected();
        let ctx = open(&t, None).await;
        ctx.resubscribe().await;
        ctx.resubscribe().await;
        assert_eq!(t.subscriber_count(ctx.topic()), 1);
    }

    /// Delegates to a memory broker but holds `subscribe` until released.
    struct HeldSubscribe {
        inner: Arc<MemoryTransport>,
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait::async_trait]
    impl TransportHandle for HeldSubscribe {
        fn is_connected(&self) -> bool {
            self.inner.is_connected()
        }

        async fn subscribe(
            &self,
            topic: &str,
            handler: FrameHandler,
        ) -> Result<SubscriptionId, TransportError> {
            self.entered.notify_one();
            self.release.notified().await;
            self.inner.subscribe(topic, handler).await
        }

        async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), TransportError> {
            self.inner.unsubscribe(id).await
        }

        async fn send(&self, destination: &str, body: &str) -> Result<(), TransportError> {
            self.inner.send(destination, body).await
        }

        async fn disconnect(&self) {
            self.inner.disconnect().await;
        }
    }

    #[tokio::test]
    async fn close_during_resubscribe_leaves_no_subscription() {
        let t = MemoryTransport::connected();
        let services = ChannelServices::new(Arc::clone(&t) as Arc<dyn TransportHandle>);
        let slot = services.transport.clone();
        let ctx = ChannelContext::open(
            ChannelId::for_user("1", "n"),
            None,
            ChannelConfig::default(),
            services,
        )
        .await;
        assert_eq!(t.subscriber_count(ctx.topic()), 1);

        let held = Arc::new(HeldSubscribe {
            inner: Arc::clone(&t),
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        slot.replace(Arc::clone(&held) as Arc<dyn TransportHandle>);
        let resubscribing = {
            let ctx = Arc::clone(&ctx);
            tokio::spawn(async move { ctx.resubscribe().await })
        };

        held.entered.notified().await;
        ctx.close().await;
        held.release.notify_one();
        resubscribing.await.unwrap();

        assert_eq!(t.subscriber_count(ctx.topic()), 0);
    }

    #[tokio::test]
    async fn handoff_sends_frame() {
        let t = MemoryTransport::connected();
        let ctx = open(&t, Some(Participant::from_email("1", "ana@example.com"))).await;
        ctx.request_handoff().await.unwrap();

        assert_eq!(ctx.mode(), ChannelMode::HandoffRequested);
        let sent = t.sent_to("/app/support.handoff/user-1-n");
        assert_eq!(sent.len(), 1);
        let body: serde_json::Value = serde_json::from_str(&sent[0].body).unwrap();
        assert_eq!(body["type"], "HANDOFF");
        assert_eq!(body["userName"], "ana");
    }

    #[tokio::test]
    async fn send_skipped_while_disconnected() {
        let t = MemoryTransport::connected();
        let ctx = open(&t, Some(Participant::new("1"))).await;
        t.set_connected(false);
        ctx.request_handoff().await.unwrap();
        assert!(t.sent().is_empty());
        assert_eq!(ctx.mode(), ChannelMode::HandoffRequested);
    }

    #[tokio::test]
    async fn inbound_frames_flow_to_observers() {
        let t = MemoryTransport::connected();
        let ctx = open(&t, None).await;
        let mut updates = ctx.subscribe_updates();

        let _ = t.publish(ctx.topic(), r#"{"role":"BOT","text":"welcome"}"#);
        let update = updates.recv().await.unwrap();
        assert_matches!(update, ChannelUpdate::Message(e) if e.kind == EventKind::AiAnswer && e.payload == "welcome");
    }

    #[tokio::test]
    async fn duplicate_inbound_is_dropped() {
        let t = MemoryTransport::connected();
        let ctx = open(&t, None).await;
        let mut updates = ctx.subscribe_updates();

        let body = r#"{"role":"SYSTEM","text":"maintenance"}"#;
        let _ = t.publish(ctx.topic(), body);
        let _ = t.publish(ctx.topic(), body);
        ctx.flush().await.unwrap();

        assert_matches!(updates.try_recv(), Ok(ChannelUpdate::Message(_)));
        assert!(updates.try_recv().is_err());
    }

    #[tokio::test]
    async fn ignored_event_reports_violation() {
        let t = MemoryTransport::connected();
        let ctx = open(&t, None).await;
        let err = ctx.send_text("nobody is listening").await.unwrap_err();
        assert_eq!(err.category(), "protocol_violation");
        assert_eq!(ctx.mode(), ChannelMode::Ai);
    }

    #[tokio::test]
    async fn close_is_final() {
        let t = MemoryTransport::connected();
        let ctx = open(&t, None).await;
        let mut updates = ctx.subscribe_updates();
        ctx.close().await;
        ctx.close().await;

        assert!(ctx.is_closed());
        assert_eq!(t.subscriber_count(ctx.topic()), 0);
        assert_eq!(updates.recv().await.unwrap(), ChannelUpdate::Closed);
        assert_matches!(
            ctx.request_handoff().await,
            Err(CoordinatorError::ChannelClosed { .. })
        );
    }

    #[tokio::test]
    async fn query_without_responder_notices() {
        let t = MemoryTransport::connected();
        let ctx = open(&t, None).await;
        let mut updates = ctx.subscribe_updates();
        ctx.ask("hello?").await.unwrap();

        assert_matches!(updates.recv().await.unwrap(), ChannelUpdate::Message(e) if e.kind == EventKind::AiQuery);
        assert_matches!(
            updates.recv().await.unwrap(),
            ChannelUpdate::Message(e) if e.kind == EventKind::SystemNotice && e.payload.contains("not configured")
        );
    }

    #[test]
    fn config_from_settings() {
        let mut settings = HandoffSettings::default();
        settings.transport.app_prefix = "/svc".into();
        settings.watchdog.idle_timeout_ms = 60_000;
        settings.registry.event_buffer_capacity = 0;
        let c = ChannelConfig::from_settings(&settings);
        assert_eq!(c.app_prefix, "/svc");
        assert_eq!(c.idle_timeout, Duration::from_secs(60));
        assert_eq!(c.update_capacity, 1);
    }
}

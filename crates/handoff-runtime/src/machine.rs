//! The per-channel protocol state machine.
//!
//! [`ProtocolStateMachine`] is pure: [`apply`](ProtocolStateMachine::apply)
//! takes a [`Trigger`] and the current instant, updates the mode, and returns
//! the [`Effect`]s the caller must carry out. It performs no I/O and owns no
//! timers, so every transition can be exercised without a runtime.
//!
//! ```text
//!            HANDOFF_REQUEST (identity)         HANDOFF_ACCEPTED
//!   ┌────┐ ───────────────────────────▶ ┌───────────────────┐ ─────────▶ ┌─────────────────┐
//!   │ AI │                              │ HANDOFF_REQUESTED │            │ AGENT_CONNECTED │
//!   └────┘ ◀─── RELEASED ◀──────────────┴───────────────────┘            └─────────────────┘
//!                  ▲       AGENT_DISCONNECT / USER_DISCONNECT / idle timeout      │
//!                  └──────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashSet;

use handoff_core::wire::OutboundFrame;
use handoff_core::{
    ChannelEvent, ChannelId, ChannelMode, EventKind, Notice, Origin, Participant,
    ProtocolViolation,
};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::errors::CoordinatorError;

// ─────────────────────────────────────────────────────────────────────────────
// Inputs and outputs
// ─────────────────────────────────────────────────────────────────────────────

/// Result of an automated query, fed back into the machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OracleOutcome {
    /// The responder answered.
    Answer(String),
    /// The responder failed; the string is a short reason.
    Failed(String),
    /// The query gate refused the query.
    Denied(String),
}

/// Something that can move the machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// A channel event from the user or the transport.
    Event {
        /// The event.
        event: ChannelEvent,
        /// Where it came from.
        origin: Origin,
    },
    /// The idle watchdog expired.
    WatchdogTimeout,
    /// The client came back to the foreground.
    VisibilityResumed,
    /// The transport reconnected.
    TransportRestored,
    /// A pending automated query completed.
    OracleReply {
        /// Id issued with [`Effect::QueryOracle`].
        query_id: u64,
        /// What happened.
        outcome: OracleOutcome,
    },
}

impl Trigger {
    /// Local event.
    pub fn local(event: ChannelEvent) -> Self {
        Self::Event {
            event,
            origin: Origin::Local,
        }
    }

    /// Remote event.
    pub fn remote(event: ChannelEvent) -> Self {
        Self::Event {
            event,
            origin: Origin::Remote,
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> String {
        match self {
            Self::Event { event, origin } => format!("{}({origin:?})", event.kind),
            Self::WatchdogTimeout => "WATCHDOG_TIMEOUT".into(),
            Self::VisibilityResumed => "VISIBILITY_RESUMED".into(),
            Self::TransportRestored => "TRANSPORT_RESTORED".into(),
            Self::OracleReply { query_id, .. } => format!("ORACLE_REPLY#{query_id}"),
        }
    }
}

/// Work the caller must perform after a transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Publish a frame on the transport.
    Send(OutboundFrame),
    /// Show a system notice.
    Notice(Notice),
    /// Show an event to the user.
    Deliver(ChannelEvent),
    /// Start or restart the idle watchdog.
    ArmWatchdog,
    /// Stop the idle watchdog.
    DisarmWatchdog,
    /// Ask the automated responder.
    QueryOracle {
        /// Id to echo back in [`Trigger::OracleReply`].
        query_id: u64,
        /// Question text.
        question: String,
    },
}

/// Outcome of one [`ProtocolStateMachine::apply`] call.
#[derive(Debug, Default)]
pub struct Step {
    /// Effects, in the order they must be carried out.
    pub effects: Vec<Effect>,
    /// Mode changes, in order. A release shows up as two entries.
    pub transitions: Vec<(ChannelMode, ChannelMode)>,
    /// Why the trigger was refused or only partly honored.
    pub rejected: Option<CoordinatorError>,
}

impl Step {
    fn with(effects: Vec<Effect>) -> Self {
        Self {
            effects,
            ..Self::default()
        }
    }

    fn ignored(violation: ProtocolViolation) -> Self {
        Self {
            rejected: Some(CoordinatorError::Protocol(violation)),
            ..Self::default()
        }
    }

    /// Whether the trigger was dropped without any effect.
    pub fn is_ignored(&self) -> bool {
        self.effects.is_empty() && matches!(self.rejected, Some(CoordinatorError::Protocol(_)))
    }

    /// Notices among the effects.
    pub fn notices(&self) -> impl Iterator<Item = &Notice> {
        self.effects.iter().filter_map(|e| match e {
            Effect::Notice(n) => Some(n),
            _ => None,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Machine
// ─────────────────────────────────────────────────────────────────────────────

/// Authoritative mode and transition rules for one channel.
#[derive(Debug)]
pub struct ProtocolStateMachine {
    channel_id: ChannelId,
    mode: ChannelMode,
    participant: Option<Participant>,
    last_activity_at: Option<Instant>,
    pending_queries: HashSet<u64>,
    next_query_id: u64,
}

impl ProtocolStateMachine {
    /// Create a machine in [`ChannelMode::Ai`].
    pub fn new(channel_id: ChannelId, participant: Option<Participant>) -> Self {
        Self {
            channel_id,
            mode: ChannelMode::Ai,
            participant,
            last_activity_at: None,
            pending_queries: HashSet::new(),
            next_query_id: 1,
        }
    }

    /// Channel this machine governs.
    pub fn channel_id(&self) -> &ChannelId {
        &self.channel_id
    }

    /// Current mode.
    pub fn mode(&self) -> ChannelMode {
        self.mode
    }

    /// Signed-in participant, if any.
    pub fn participant(&self) -> Option<&Participant> {
        self.participant.as_ref()
    }

    /// Last accepted activity while an agent was attached.
    pub fn last_activity_at(&self) -> Option<Instant> {
        self.last_activity_at
    }

    /// Number of automated queries awaiting a reply.
    pub fn pending_queries(&self) -> usize {
        self.pending_queries.len()
    }

    /// Feed one trigger through the transition table.
    pub fn apply(&mut self, trigger: Trigger, now: Instant) -> Step {
        let mode = self.mode;
        match (mode, trigger) {
            // ── Automated replies (any mode) ────────────────────────────
            (_, Trigger::OracleReply { query_id, outcome }) => self.on_oracle_reply(query_id, outcome),

            // ── Pass-through server text (any mode, no activity) ────────
            (
                _,
                Trigger::Event {
                    event,
                    origin: Origin::Remote,
                },
            ) if matches!(event.kind, EventKind::SystemNotice | EventKind::AiAnswer) => {
                Step::with(vec![Effect::Deliver(event)])
            }

            // ── AI ──────────────────────────────────────────────────────
            (
                ChannelMode::Ai,
                Trigger::Event {
                    event,
                    origin: Origin::Local,
                },
            ) if event.kind == EventKind::HandoffRequest => self.request_handoff(),
            (
                ChannelMode::Ai,
                Trigger::Event {
                    event,
                    origin: Origin::Local,
                },
            ) if event.kind == EventKind::AiQuery => self.start_query(event),

            // ── HANDOFF_REQUESTED ───────────────────────────────────────
            (
                ChannelMode::HandoffRequested,
                Trigger::Event {
                    event,
                    origin: Origin::Remote,
                },
            ) if event.kind == EventKind::HandoffAcknowledged => {
                Step::with(vec![Effect::Notice(Notice::AwaitingAgent)])
            }
            (
                ChannelMode::HandoffRequested,
                Trigger::Event {
                    event,
                    origin: Origin::Remote,
                },
            ) if event.kind == EventKind::HandoffAccepted => self.agent_joined(event, now),

            // ── AGENT_CONNECTED ─────────────────────────────────────────
            (ChannelMode::AgentConnected, Trigger::Event { event, origin })
                if event.kind == EventKind::AgentMessage && origin == Origin::Remote =>
            {
                self.touch(now);
                Step::with(vec![Effect::ArmWatchdog, Effect::Deliver(event)])
            }
            (ChannelMode::AgentConnected, Trigger::Event { event, origin })
                if event.kind == EventKind::UserMessage =>
            {
                self.touch(now);
                let mut effects = vec![Effect::ArmWatchdog];
                if origin == Origin::Local {
                    effects.push(Effect::Send(OutboundFrame::user_text(
                        event.payload.clone(),
                        self.participant.as_ref(),
                    )));
                }
                effects.push(Effect::Deliver(event));
                Step::with(effects)
            }
            (ChannelMode::AgentConnected, Trigger::Event { event, origin })
                if event.kind == EventKind::AgentDisconnect && origin == Origin::Remote =>
            {
                self.release(vec![Effect::DisarmWatchdog, Effect::Notice(Notice::AgentLeft)])
            }
            (ChannelMode::AgentConnected, Trigger::Event { event, origin })
                if event.kind == EventKind::UserDisconnect =>
            {
                let effects = match origin {
                    Origin::Local => vec![
                        Effect::DisarmWatchdog,
                        Effect::Send(OutboundFrame::disconnect(self.participant.as_ref())),
                    ],
                    Origin::Remote => {
                        vec![Effect::DisarmWatchdog, Effect::Notice(Notice::UserLeft)]
                    }
                };
                self.release(effects)
            }
            (ChannelMode::AgentConnected, Trigger::WatchdogTimeout) => {
                info!(channel_id = %self.channel_id, "idle timeout, releasing agent");
                self.release(vec![
                    Effect::DisarmWatchdog,
                    Effect::Send(OutboundFrame::disconnect(self.participant.as_ref())),
                    Effect::Notice(Notice::TimedOut),
                ])
            }
            (ChannelMode::AgentConnected, Trigger::VisibilityResumed) => {
                self.touch(now);
                Step::with(vec![Effect::ArmWatchdog])
            }
            (ChannelMode::AgentConnected, Trigger::TransportRestored) => {
                self.touch(now);
                Step::with(vec![
                    Effect::ArmWatchdog,
                    Effect::Notice(Notice::ConnectionRestored),
                ])
            }

            // Liveness signals outside an agent session carry no meaning.
            (_, Trigger::VisibilityResumed | Trigger::TransportRestored) => Step::default(),

            // ── Everything else ─────────────────────────────────────────
            (mode, trigger) => {
                let violation = ProtocolViolation::new(mode, trigger.label());
                debug!(channel_id = %self.channel_id, %violation, "event ignored");
                Step::ignored(violation)
            }
        }
    }

    fn request_handoff(&mut self) -> Step {
        let Some(participant) = &self.participant else {
            warn!(channel_id = %self.channel_id, "handoff requested without identity");
            return Step {
                effects: vec![Effect::Notice(Notice::LoginRequired)],
                rejected: Some(CoordinatorError::UnauthorizedHandoff {
                    channel_id: self.channel_id.clone(),
                }),
                ..Step::default()
            };
        };
        let frame = OutboundFrame::handoff(participant);
        let mut step = Step::with(vec![Effect::Send(frame), Effect::Notice(Notice::RequestSent)]);
        self.transition(ChannelMode::HandoffRequested, &mut step);
        step
    }

    fn agent_joined(&mut self, event: ChannelEvent, now: Instant) -> Step {
        self.touch(now);
        let mut effects = vec![Effect::ArmWatchdog, Effect::Notice(Notice::AgentConnected)];
        if !event.payload.is_empty() {
            effects.push(Effect::Deliver(event));
        }
        let mut step = Step::with(effects);
        self.transition(ChannelMode::AgentConnected, &mut step);
        step
    }

    fn start_query(&mut self, event: ChannelEvent) -> Step {
        let query_id = self.next_query_id;
        self.next_query_id += 1;
        let _ = self.pending_queries.insert(query_id);
        let question = event.payload.clone();
        Step::with(vec![
            Effect::Deliver(event),
            Effect::QueryOracle { query_id, question },
        ])
    }

    fn on_oracle_reply(&mut self, query_id: u64, outcome: OracleOutcome) -> Step {
        if !self.pending_queries.remove(&query_id) {
            return Step::ignored(ProtocolViolation::new(
                self.mode,
                format!("ORACLE_REPLY#{query_id}"),
            ));
        }
        let effect = match outcome {
            OracleOutcome::Answer(answer) => Effect::Deliver(ChannelEvent::ai_answer(answer)),
            OracleOutcome::Failed(detail) => Effect::Notice(Notice::OracleUnavailable { detail }),
            OracleOutcome::Denied(reason) => Effect::Notice(Notice::QueryDenied { reason }),
        };
        Step::with(vec![effect])
    }

    /// Leave the agent session: AGENT_CONNECTED → RELEASED → AI.
    fn release(&mut self, effects: Vec<Effect>) -> Step {
        let mut step = Step::with(effects);
        self.transition(ChannelMode::Released, &mut step);
        self.transition(ChannelMode::Ai, &mut step);
        self.last_activity_at = None;
        step
    }

    fn transition(&mut self, to: ChannelMode, step: &mut Step) {
        let from = self.mode;
        self.mode = to;
        step.transitions.push((from, to));
        debug!(channel_id = %self.channel_id, %from, %to, "mode changed");
    }

    fn touch(&mut self, now: Instant) {
        self.last_activity_at = Some(match self.last_activity_at {
            Some(prev) if prev > now => prev,
            _ => now,
        });
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

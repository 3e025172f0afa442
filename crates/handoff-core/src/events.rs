//! Channel events, roles, modes, and system notices.
//!
//! A [`ChannelEvent`] is the unit of communication on a channel, whether it
//! arrived over the transport, was produced by the local user, or was
//! synthesized by the coordinator itself (a [`Notice`]).

use serde::{Deserialize, Serialize};
use std::fmt;

// ─────────────────────────────────────────────────────────────────────────────
// Enums
// ─────────────────────────────────────────────────────────────────────────────

/// What an event means to the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    /// The user asks for a human agent.
    HandoffRequest,
    /// The server acknowledged a pending handoff request.
    HandoffAcknowledged,
    /// An agent picked up the channel.
    HandoffAccepted,
    /// Text written by the agent.
    AgentMessage,
    /// Text written by the user.
    UserMessage,
    /// The agent left the channel.
    AgentDisconnect,
    /// The user left the channel.
    UserDisconnect,
    /// A question for the automated responder.
    AiQuery,
    /// An answer from the automated responder.
    AiAnswer,
    /// Informational text from the system.
    SystemNotice,
}

impl EventKind {
    /// Stable wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HandoffRequest => "HANDOFF_REQUEST",
            Self::HandoffAcknowledged => "HANDOFF_ACKNOWLEDGED",
            Self::HandoffAccepted => "HANDOFF_ACCEPTED",
            Self::AgentMessage => "AGENT_MESSAGE",
            Self::UserMessage => "USER_MESSAGE",
            Self::AgentDisconnect => "AGENT_DISCONNECT",
            Self::UserDisconnect => "USER_DISCONNECT",
            Self::AiQuery => "AI_QUERY",
            Self::AiAnswer => "AI_ANSWER",
            Self::SystemNotice => "SYSTEM_NOTICE",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who authored an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Scripted bot content.
    Bot,
    /// The end user.
    User,
    /// A human support agent.
    Admin,
    /// The coordinator or server.
    System,
    /// The automated responder.
    Ai,
}

impl Role {
    /// Stable wire label.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Bot => "BOT",
            Self::User => "USER",
            Self::Admin => "ADMIN",
            Self::System => "SYSTEM",
            Self::Ai => "AI",
        }
    }

    /// Parse a wire role, accepting the aliases servers use in practice.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BOT" => Some(Self::Bot),
            "USER" => Some(Self::User),
            "ADMIN" | "AGENT" => Some(Self::Admin),
            "SYSTEM" | "SYS" => Some(Self::System),
            "AI" => Some(Self::Ai),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who currently serves the channel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelMode {
    /// Automated answers only.
    #[default]
    Ai,
    /// Waiting for an agent to accept.
    HandoffRequested,
    /// A human agent is attached.
    AgentConnected,
    /// The agent session just ended. Never observed at rest.
    Released,
}

impl fmt::Display for ChannelMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ai => "AI",
            Self::HandoffRequested => "HANDOFF_REQUESTED",
            Self::AgentConnected => "AGENT_CONNECTED",
            Self::Released => "RELEASED",
        };
        f.write_str(s)
    }
}

/// Where an event entered the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Origin {
    /// Produced by the local user or UI.
    Local,
    /// Received from the transport.
    Remote,
}

// ─────────────────────────────────────────────────────────────────────────────
// ChannelEvent
// ─────────────────────────────────────────────────────────────────────────────

/// One unit of communication on a channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelEvent {
    /// Protocol meaning.
    pub kind: EventKind,
    /// Author.
    pub role: Role,
    /// Text content. May be empty for control events.
    pub payload: String,
}

impl ChannelEvent {
    /// Build an event.
    pub fn new(kind: EventKind, role: Role, payload: impl Into<String>) -> Self {
        Self {
            kind,
            role,
            payload: payload.into(),
        }
    }

    /// A control event with no text.
    pub fn control(kind: EventKind, role: Role) -> Self {
        Self::new(kind, role, String::new())
    }

    /// A user-authored text message.
    pub fn user_message(text: impl Into<String>) -> Self {
        Self::new(EventKind::UserMessage, Role::User, text)
    }

    /// An agent-authored text message.
    pub fn agent_message(text: impl Into<String>) -> Self {
        Self::new(EventKind::AgentMessage, Role::Admin, text)
    }

    /// A question for the automated responder.
    pub fn ai_query(question: impl Into<String>) -> Self {
        Self::new(EventKind::AiQuery, Role::User, question)
    }

    /// An answer from the automated responder.
    pub fn ai_answer(answer: impl Into<String>) -> Self {
        Self::new(EventKind::AiAnswer, Role::Ai, answer)
    }

    /// Render a notice as a system event.
    pub fn notice(notice: &Notice) -> Self {
        Self::new(EventKind::SystemNotice, Role::System, notice.text())
    }

    /// Identity used for duplicate suppression.
    pub fn dedup_key(&self) -> DedupKey {
        DedupKey {
            kind: self.kind,
            role: self.role,
            payload: self.payload.clone(),
        }
    }
}

/// Identity of an event for duplicate suppression.
///
/// Two events with the same kind, role, and payload share a key. The time
/// bucket is not part of equality; the deduplicator compares timestamps.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DedupKey {
    /// Event kind.
    pub kind: EventKind,
    /// Event role.
    pub role: Role,
    /// Event text.
    pub payload: String,
}

impl DedupKey {
    /// Canonical `{kind}|{role}|{payload}|{bucket}` form, for logging.
    pub fn fingerprint(&self, bucket_secs: u64) -> String {
        format!("{}|{}|{}|{bucket_secs}", self.kind, self.role, self.payload)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Notices
// ─────────────────────────────────────────────────────────────────────────────

/// Messages the coordinator shows to the user on its own behalf.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "notice", rename_all = "camelCase")]
pub enum Notice {
    /// The handoff request went out.
    RequestSent,
    /// The server acknowledged the request; an agent has not yet joined.
    AwaitingAgent,
    /// Handoff needs a signed-in participant.
    LoginRequired,
    /// An agent joined.
    AgentConnected,
    /// The agent ended the session.
    AgentLeft,
    /// The user's session ended from another client.
    UserLeft,
    /// The idle timer forced a release.
    TimedOut,
    /// The automated responder failed.
    OracleUnavailable {
        /// Short failure description.
        detail: String,
    },
    /// The query gate refused an automated query.
    QueryDenied {
        /// Reason given by the gate.
        reason: String,
    },
    /// The transport came back while an agent was attached.
    ConnectionRestored,
}

impl Notice {
    /// User-facing text.
    pub fn text(&self) -> String {
        match self {
            Self::RequestSent => "Your request for an agent has been sent.".into(),
            Self::AwaitingAgent => "Please wait, an agent will be with you shortly.".into(),
            Self::LoginRequired => "Please sign in to talk to an agent.".into(),
            Self::AgentConnected => "An agent has joined the conversation.".into(),
            Self::AgentLeft => "The agent has left the conversation.".into(),
            Self::UserLeft => "The conversation was ended.".into(),
            Self::TimedOut => {
                "The conversation was closed after 10 minutes of inactivity.".into()
            }
            Self::OracleUnavailable { detail } => {
                format!("The assistant is unavailable right now ({detail}).")
            }
            Self::QueryDenied { reason } => format!("Your question was not sent: {reason}"),
            Self::ConnectionRestored => "Connection restored.".into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parse_aliases() {
        assert_eq!(Role::parse("agent"), Some(Role::Admin));
        assert_eq!(Role::parse("ADMIN"), Some(Role::Admin));
        assert_eq!(Role::parse("SYS"), Some(Role::System));
        assert_eq!(Role::parse(" bot "), Some(Role::Bot));
        assert_eq!(Role::parse("robot"), None);
    }

    #[test]
    fn kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&EventKind::HandoffAccepted).unwrap();
        assert_eq!(json, "\"HANDOFF_ACCEPTED\"");
        assert_eq!(EventKind::HandoffAccepted.to_string(), "HANDOFF_ACCEPTED");
    }

    #[test]
    fn default_mode_is_ai() {
        assert_eq!(ChannelMode::default(), ChannelMode::Ai);
    }

    #[test]
    fn dedup_key_ignores_nothing_but_time() {
        let a = ChannelEvent::user_message("hi");
        let b = ChannelEvent::user_message("hi");
        let c = ChannelEvent::agent_message("hi");
        assert_eq!(a.dedup_key(), b.dedup_key());
        assert_ne!(a.dedup_key(), c.dedup_key());
    }

    #[test]
    fn fingerprint_format() {
        let key = ChannelEvent::user_message("hello").dedup_key();
        assert_eq!(key.fingerprint(17), "USER_MESSAGE|USER|hello|17");
    }

    #[test]
    fn notice_event_is_system() {
        let ev = ChannelEvent::notice(&Notice::AgentLeft);
        assert_eq!(ev.kind, EventKind::SystemNotice);
        assert_eq!(ev.role, Role::System);
        assert!(ev.payload.contains("left"));
    }

    #[test]
    fn oracle_notice_includes_detail() {
        let n = Notice::OracleUnavailable {
            detail: "status 503".into(),
        };
        assert!(n.text().contains("status 503"));
    }
}

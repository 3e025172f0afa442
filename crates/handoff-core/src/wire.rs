//! JSON frames exchanged with the support server.
//!
//! Inbound frames arrive on `{topicPrefix}/rooms/{channelId}` and look like
//! `{ "type": ..., "role": ..., "text" | "content": ... }`. Control frames are
//! identified by `type`; everything else is a text message whose `role`
//! decides the event kind.
//!
//! Outbound frames go to one of three destinations under the application
//! prefix; see [`Destination`].

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::WireError;
use crate::events::{ChannelEvent, EventKind, Role};
use crate::ids::{ChannelId, Participant};

// ─────────────────────────────────────────────────────────────────────────────
// Destinations
// ─────────────────────────────────────────────────────────────────────────────

/// Outbound destination for a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Destination {
    /// `support.handoff/{channelId}`
    Handoff,
    /// `support.send/{channelId}`
    Send,
    /// `support.disconnect/{channelId}`
    Disconnect,
}

impl Destination {
    fn segment(self) -> &'static str {
        match self {
            Self::Handoff => "support.handoff",
            Self::Send => "support.send",
            Self::Disconnect => "support.disconnect",
        }
    }

    /// Full destination path, e.g. `/app/support.send/user-1-x`.
    pub fn path(self, app_prefix: &str, channel: &ChannelId) -> String {
        format!(
            "{}/{}/{channel}",
            app_prefix.trim_end_matches('/'),
            self.segment()
        )
    }
}

/// Inbound topic for a channel, e.g. `/topic/rooms/user-1-x`.
pub fn room_topic(topic_prefix: &str, channel: &ChannelId) -> String {
    format!("{}/rooms/{channel}", topic_prefix.trim_end_matches('/'))
}

// ─────────────────────────────────────────────────────────────────────────────
// Inbound
// ─────────────────────────────────────────────────────────────────────────────

/// Raw inbound frame body.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InboundFrame {
    /// Control type, if any.
    #[serde(rename = "type")]
    pub frame_type: Option<String>,
    /// Author role label.
    pub role: Option<String>,
    /// Message text.
    pub text: Option<String>,
    /// Alias of `text` used by some senders.
    pub content: Option<String>,
    /// Name of the user a control frame concerns.
    pub user_name: Option<String>,
}

impl InboundFrame {
    fn body_text(&self) -> Option<&str> {
        self.text
            .as_deref()
            .or(self.content.as_deref())
            .filter(|t| !t.is_empty())
    }

    /// Map the frame to a channel event.
    pub fn into_event(self) -> Result<ChannelEvent, WireError> {
        let text = self.body_text().unwrap_or_default().to_string();
        let control = match self.frame_type.as_deref() {
            Some("HANDOFF") => Some((EventKind::HandoffRequest, Role::User)),
            Some("HANDOFF_REQUESTED") => Some((EventKind::HandoffAcknowledged, Role::System)),
            Some("HANDOFF_ACCEPTED") => Some((EventKind::HandoffAccepted, Role::System)),
            Some("AGENT_DISCONNECTED") => Some((EventKind::AgentDisconnect, Role::Admin)),
            Some("USER_DISCONNECTED") => Some((EventKind::UserDisconnect, Role::User)),
            _ => None,
        };
        if let Some((kind, role)) = control {
            return Ok(ChannelEvent::new(kind, role, text));
        }

        if text.is_empty() {
            return Err(WireError::Empty);
        }
        let role = self
            .role
            .as_deref()
            .and_then(Role::parse)
            .unwrap_or(Role::Bot);
        let kind = match role {
            Role::Admin => EventKind::AgentMessage,
            Role::User => EventKind::UserMessage,
            Role::Bot | Role::Ai => EventKind::AiAnswer,
            Role::System => EventKind::SystemNotice,
        };
        Ok(ChannelEvent::new(kind, role, text))
    }
}

/// Strictly parse an inbound frame body.
pub fn parse_inbound(body: &str) -> Result<ChannelEvent, WireError> {
    let frame: InboundFrame = serde_json::from_str(body)?;
    frame.into_event()
}

/// Leniently decode an inbound frame body.
///
/// Non-JSON bodies are surfaced as a bot message carrying the raw text.
/// JSON frames with nothing to show yield `None`.
pub fn decode_inbound(body: &str) -> Option<ChannelEvent> {
    match parse_inbound(body) {
        Ok(event) => Some(event),
        Err(WireError::Json(e)) => {
            let raw = body.trim();
            debug!(error = %e, "inbound body is not JSON, passing through as text");
            (!raw.is_empty()).then(|| ChannelEvent::new(EventKind::AiAnswer, Role::Bot, raw))
        }
        Err(e) => {
            debug!(error = %e, "dropping inbound frame");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Outbound
// ─────────────────────────────────────────────────────────────────────────────

/// Body of a handoff request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HandoffFrame {
    /// Always `HANDOFF`.
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    /// Account id.
    pub user_id: String,
    /// Display name.
    pub user_name: String,
    /// Nickname.
    pub user_nickname: String,
}

/// Body of a text message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TextFrame {
    /// Always `TEXT`.
    #[serde(rename = "type")]
    pub frame_type: &'static str,
    /// Author role.
    pub role: Role,
    /// Message text.
    pub text: String,
    /// Account id, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Body of a disconnect notification.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectFrame {
    /// Display name.
    pub user_name: String,
    /// Nickname.
    pub user_nickname: String,
}

/// A frame the coordinator sends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum OutboundFrame {
    /// Request a human agent.
    Handoff(HandoffFrame),
    /// Relay a message.
    Text(TextFrame),
    /// End the agent session.
    Disconnect(DisconnectFrame),
}

impl OutboundFrame {
    /// Handoff request on behalf of `participant`.
    pub fn handoff(participant: &Participant) -> Self {
        Self::Handoff(HandoffFrame {
            frame_type: "HANDOFF",
            user_id: participant.user_id.clone(),
            user_name: participant.display_name().to_string(),
            user_nickname: participant.display_nickname().to_string(),
        })
    }

    /// User text message.
    pub fn user_text(text: impl Into<String>, participant: Option<&Participant>) -> Self {
        Self::Text(TextFrame {
            frame_type: "TEXT",
            role: Role::User,
            text: text.into(),
            user_id: participant.map(|p| p.user_id.clone()),
        })
    }

    /// Disconnect notification.
    pub fn disconnect(participant: Option<&Participant>) -> Self {
        let fallback = Participant::new("");
        let p = participant.unwrap_or(&fallback);
        Self::Disconnect(DisconnectFrame {
            user_name: p.display_name().to_string(),
            user_nickname: p.display_nickname().to_string(),
        })
    }

    /// Where this frame is sent.
    pub fn destination(&self) -> Destination {
        match self {
            Self::Handoff(_) => Destination::Handoff,
            Self::Text(_) => Destination::Send,
            Self::Disconnect(_) => Destination::Disconnect,
        }
    }

    /// Serialize to a JSON body.
    pub fn encode(&self) -> Result<String, WireError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::{Value, json};

    fn channel() -> ChannelId {
        ChannelId::for_user("1", "abc")
    }

    #[test]
    fn destination_paths() {
        assert_eq!(
            Destination::Handoff.path("/app", &channel()),
            "/app/support.handoff/user-1-abc"
        );
        assert_eq!(
            Destination::Send.path("/app/", &channel()),
            "/app/support.send/user-1-abc"
        );
        assert_eq!(
            Destination::Disconnect.path("/app", &channel()),
            "/app/support.disconnect/user-1-abc"
        );
    }

    #[test]
    fn room_topic_path() {
        assert_eq!(room_topic("/topic", &channel()), "/topic/rooms/user-1-abc");
    }

    #[test]
    fn control_frames_map_to_kinds() {
        let cases = [
            ("HANDOFF_REQUESTED", EventKind::HandoffAcknowledged),
            ("HANDOFF_ACCEPTED", EventKind::HandoffAccepted),
            ("AGENT_DISCONNECTED", EventKind::AgentDisconnect),
            ("USER_DISCONNECTED", EventKind::UserDisconnect),
        ];
        for (ty, kind) in cases {
            let body = json!({ "type": ty }).to_string();
            assert_eq!(parse_inbound(&body).unwrap().kind, kind, "type {ty}");
        }
    }

    #[test]
    fn accepted_frame_keeps_text() {
        let body = r#"{"type":"HANDOFF_ACCEPTED","role":"SYS","text":"agent kim joined"}"#;
        let ev = parse_inbound(body).unwrap();
        assert_eq!(ev.payload, "agent kim joined");
    }

    #[test]
    fn text_frames_map_by_role() {
        let ev = parse_inbound(r#"{"role":"AGENT","text":"hello"}"#).unwrap();
        assert_eq!(ev.kind, EventKind::AgentMessage);
        assert_eq!(ev.role, Role::Admin);

        let ev = parse_inbound(r#"{"type":"TEXT","role":"USER","content":"hi"}"#).unwrap();
        assert_eq!(ev.kind, EventKind::UserMessage);
        assert_eq!(ev.payload, "hi");

        let ev = parse_inbound(r#"{"text":"welcome"}"#).unwrap();
        assert_eq!(ev.kind, EventKind::AiAnswer);
        assert_eq!(ev.role, Role::Bot);

        let ev = parse_inbound(r#"{"role":"SYSTEM","text":"maintenance"}"#).unwrap();
        assert_eq!(ev.kind, EventKind::SystemNotice);
    }

    #[test]
    fn empty_text_frame_is_rejected() {
        assert_matches!(parse_inbound(r#"{"role":"USER"}"#), Err(WireError::Empty));
        assert_eq!(decode_inbound(r#"{"role":"USER","text":""}"#), None);
    }

    #[test]
    fn non_json_body_passes_through() {
        let ev = decode_inbound("plain words").unwrap();
        assert_eq!(ev.role, Role::Bot);
        assert_eq!(ev.payload, "plain words");
        assert_eq!(decode_inbound("   "), None);
    }

    #[test]
    fn handoff_frame_shape() {
        let p = Participant::from_email("9", "lee@example.com");
        let frame = OutboundFrame::handoff(&p);
        assert_eq!(frame.destination(), Destination::Handoff);
        let v: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(
            v,
            json!({"type": "HANDOFF", "userId": "9", "userName": "lee", "userNickname": "lee"})
        );
    }

    #[test]
    fn text_frame_shape() {
        let p = Participant::new("9");
        let v: Value =
            serde_json::from_str(&OutboundFrame::user_text("yo", Some(&p)).encode().unwrap())
                .unwrap();
        assert_eq!(v, json!({"type": "TEXT", "role": "USER", "text": "yo", "userId": "9"}));

        let v: Value =
            serde_json::from_str(&OutboundFrame::user_text("yo", None).encode().unwrap()).unwrap();
        assert!(v.get("userId").is_none());
    }

    #[test]
    fn disconnect_frame_defaults_names() {
        let frame = OutboundFrame::disconnect(None);
        assert_eq!(frame.destination(), Destination::Disconnect);
        let v: Value = serde_json::from_str(&frame.encode().unwrap()).unwrap();
        assert_eq!(v, json!({"userName": "user", "userNickname": "user"}));
    }
}

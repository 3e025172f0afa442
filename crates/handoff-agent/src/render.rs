//! Terminal rendering of channel updates.

use chrono::{DateTime, TimeZone};
use handoff_core::{ChannelMode, EventKind};
use handoff_runtime::ChannelUpdate;

/// Format one update as a line of output, or `None` if it shows nothing.
pub fn render<Tz: TimeZone>(update: &ChannelUpdate, at: &DateTime<Tz>) -> Option<String>
where
    Tz::Offset: std::fmt::Display,
{
    let stamp = at.format("%H:%M:%S");
    match update {
        ChannelUpdate::ModeChanged { to, .. } if *to == ChannelMode::Released => None,
        ChannelUpdate::ModeChanged { to, .. } => Some(format!("{stamp} -- mode: {to}")),
        ChannelUpdate::Message(event) => {
            let who = match event.kind {
                EventKind::SystemNotice => "*",
                EventKind::AgentMessage => "agent>",
                EventKind::UserMessage => "you>",
                EventKind::AiQuery => "you (ai)>",
                EventKind::AiAnswer => "ai>",
                _ => return None,
            };
            Some(format!("{stamp} {who} {}", event.payload))
        }
        ChannelUpdate::Closed => Some(format!("{stamp} -- conversation closed")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use handoff_core::{ChannelEvent, Notice};

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 14, 3, 9).unwrap()
    }

    #[test]
    fn agent_message() {
        let line = render(&ChannelUpdate::Message(ChannelEvent::agent_message("hi")), &at());
        assert_eq!(line.as_deref(), Some("14:03:09 agent> hi"));
    }

    #[test]
    fn notice() {
        let update = ChannelUpdate::Message(ChannelEvent::notice(&Notice::AgentLeft));
        assert_eq!(
            render(&update, &at()).as_deref(),
            Some("14:03:09 * The agent has left the conversation.")
        );
    }

    #[test]
    fn released_is_hidden() {
        let update = ChannelUpdate::ModeChanged {
            from: ChannelMode::AgentConnected,
            to: ChannelMode::Released,
        };
        assert_eq!(render(&update, &at()), None);

        let update = ChannelUpdate::ModeChanged {
            from: ChannelMode::Released,
            to: ChannelMode::Ai,
        };
        assert_eq!(render(&update, &at()).as_deref(), Some("14:03:09 -- mode: AI"));
    }
}

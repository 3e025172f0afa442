//! STOMP 1.2 frame codec.
//!
//! A frame is `COMMAND\n(header:value\n)*\n(body)\0`. Header names and values
//! are escaped (`\\`, `\n`, `\r`, `:`) on every command except `CONNECT` and
//! `CONNECTED`. Bare end-of-line sequences between frames are heart-beats.

use std::fmt;

use crate::errors::TransportError;

/// STOMP command.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Client handshake.
    Connect,
    /// Server handshake reply.
    Connected,
    /// Client publish.
    Send,
    /// Client subscribe.
    Subscribe,
    /// Client unsubscribe.
    Unsubscribe,
    /// Server delivery.
    Message,
    /// Server receipt.
    Receipt,
    /// Server error.
    Error,
    /// Client goodbye.
    Disconnect,
}

impl Command {
    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "CONNECT",
            Self::Connected => "CONNECTED",
            Self::Send => "SEND",
            Self::Subscribe => "SUBSCRIBE",
            Self::Unsubscribe => "UNSUBSCRIBE",
            Self::Message => "MESSAGE",
            Self::Receipt => "RECEIPT",
            Self::Error => "ERROR",
            Self::Disconnect => "DISCONNECT",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "CONNECT" | "STOMP" => Self::Connect,
            "CONNECTED" => Self::Connected,
            "SEND" => Self::Send,
            "SUBSCRIBE" => Self::Subscribe,
            "UNSUBSCRIBE" => Self::Unsubscribe,
            "MESSAGE" => Self::Message,
            "RECEIPT" => Self::Receipt,
            "ERROR" => Self::Error,
            "DISCONNECT" => Self::Disconnect,
            _ => return None,
        })
    }

    fn escapes_headers(self) -> bool {
        !matches!(self, Self::Connect | Self::Connected)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One STOMP frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    /// Command.
    pub command: Command,
    /// Headers in wire order. The first occurrence of a name wins.
    pub headers: Vec<(String, String)>,
    /// Body.
    pub body: String,
}

impl Frame {
    /// Frame with no headers and no body.
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    /// Append a header.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of header `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Serialize to wire text, including the trailing NUL.
    pub fn encode(&self) -> String {
        let escape = self.command.escapes_headers();
        let mut out = String::with_capacity(self.body.len() + 64);
        out.push_str(self.command.as_str());
        out.push('\n');
        for (k, v) in &self.headers {
            if escape {
                out.push_str(&escape_header(k));
                out.push(':');
                out.push_str(&escape_header(v));
            } else {
                out.push_str(k);
                out.push(':');
                out.push_str(v);
            }
            out.push('\n');
        }
        if !self.body.is_empty() && self.get("content-length").is_none() {
            out.push_str("content-length:");
            out.push_str(&self.body.len().to_string());
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.body);
        out.push('\0');
        out
    }
}

/// Parse every frame in a WebSocket text message.
///
/// Heart-beat newlines yield no frames.
pub fn parse_frames(text: &str) -> Result<Vec<Frame>, TransportError> {
    let mut frames = Vec::new();
    for chunk in text.split('\0') {
        let chunk = chunk.trim_start_matches(['\r', '\n']);
        if chunk.is_empty() {
            continue;
        }
        frames.push(parse_frame(chunk)?);
    }
    Ok(frames)
}

fn parse_frame(chunk: &str) -> Result<Frame, TransportError> {
    let (head, body) = match chunk.find("\n\n") {
        Some(i) => (&chunk[..i], &chunk[i + 2..]),
        None => match chunk.find("\r\n\r\n") {
            Some(i) => (&chunk[..i], &chunk[i + 4..]),
            None => (chunk, ""),
        },
    };

    let mut lines = head.lines();
    let command_line = lines.next().unwrap_or_default().trim_end_matches('\r');
    let command = Command::parse(command_line)
        .ok_or_else(|| TransportError::Protocol(format!("unknown command {command_line:?}")))?;

    let escape = command.escapes_headers();
    let mut headers = Vec::new();
    for line in lines {
        let line = line.trim_end_matches('\r');
        let Some((k, v)) = line.split_once(':') else {
            return Err(TransportError::Protocol(format!("malformed header {line:?}")));
        };
        if escape {
            headers.push((unescape_header(k)?, unescape_header(v)?));
        } else {
            headers.push((k.to_string(), v.to_string()));
        }
    }

    Ok(Frame {
        command,
        headers,
        body: body.to_string(),
    })
}

fn escape_header(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape_header(s: &str) -> Result<String, TransportError> {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            other => {
                return Err(TransportError::Protocol(format!(
                    "invalid header escape \\{}",
                    other.map(String::from).unwrap_or_default()
                )));
            }
        }
    }
    Ok(out)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn encode_send_frame() {
        let f = Frame::new(Command::Send)
            .header("destination", "/app/support.send/guest-1")
            .body("{}");
        assert_eq!(
            f.encode(),
            "SEND\ndestination:/app/support.send/guest-1\ncontent-length:2\n\n{}\0"
        );
    }

    #[test]
    fn connect_headers_not_escaped() {
        let f = Frame::new(Command::Connect).header("host", "a:b");
        assert!(f.encode().contains("host:a:b\n"));
    }

    #[test]
    fn other_headers_escaped() {
        let f = Frame::new(Command::Subscribe).header("id", "a:b\nc");
        assert!(f.encode().contains("id:a\\cb\\nc\n"));
    }

    #[test]
    fn parse_message_frame() {
        let text = "MESSAGE\ndestination:/topic/rooms/x\nsubscription:sub-1\nmessage-id:7\n\n{\"text\":\"hi\"}\0";
        let frames = parse_frames(text).unwrap();
        assert_eq!(frames.len(), 1);
        let f = &frames[0];
        assert_eq!(f.command, Command::Message);
        assert_eq!(f.get("subscription"), Some("sub-1"));
        assert_eq!(f.body, "{\"text\":\"hi\"}");
    }

    #[test]
    fn parse_unescapes_headers() {
        let frames = parse_frames("MESSAGE\nk\\c1:v\\\\2\n\n\0").unwrap();
        assert_eq!(frames[0].get("k:1"), Some("v\\2"));
    }

    #[test]
    fn heartbeats_are_skipped() {
        assert!(parse_frames("\n").unwrap().is_empty());
        let frames = parse_frames("\n\nCONNECTED\nversion:1.2\n\n\0\n").unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].get("version"), Some("1.2"));
    }

    #[test]
    fn crlf_frames_parse() {
        let frames = parse_frames("ERROR\r\nmessage:bad\r\n\r\ndetails\0").unwrap();
        assert_eq!(frames[0].command, Command::Error);
        assert_eq!(frames[0].get("message"), Some("bad"));
        assert_eq!(frames[0].body, "details");
    }

    #[test]
    fn multiple_frames_in_one_message() {
        let frames = parse_frames("RECEIPT\nreceipt-id:1\n\n\0MESSAGE\n\nbody\0").unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[1].body, "body");
    }

    #[test]
    fn unknown_command_rejected() {
        assert_matches!(parse_frames("HELLO\n\n\0"), Err(TransportError::Protocol(_)));
    }

    #[test]
    fn bad_escape_rejected() {
        assert_matches!(parse_frames("MESSAGE\nk:\\t\n\n\0"), Err(TransportError::Protocol(_)));
    }

    #[test]
    fn first_header_wins() {
        let frames = parse_frames("MESSAGE\nk:1\nk:2\n\n\0").unwrap();
        assert_eq!(frames[0].get("k"), Some("1"));
    }
}

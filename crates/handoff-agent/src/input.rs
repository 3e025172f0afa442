//! Interactive input parsing.

/// One line typed by the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Input {
    /// `/handoff`: ask for a human agent.
    Handoff,
    /// `/leave`: end the agent session.
    Leave,
    /// `/ai <question>`: ask the automated responder.
    Ask(String),
    /// `/resume`: report that the user is back.
    Resume,
    /// `/reset`: start the conversation over.
    Reset,
    /// `/quit`: exit.
    Quit,
    /// `/help`: list commands.
    Help,
    /// Plain text for the agent.
    Say(String),
    /// A blank line.
    Empty,
    /// A command that needs an argument it did not get, or an unknown one.
    Invalid(String),
}

/// Help text listing every command.
pub const HELP: &str = "\
commands:
  /handoff       ask for a human agent
  /leave         end the agent session
  /ai <question> ask the assistant
  /resume        mark yourself active again
  /reset         clear the conversation
  /quit          exit
anything else is sent to the agent";

/// Parse one input line.
pub fn parse(line: &str) -> Input {
    let line = line.trim();
    if line.is_empty() {
        return Input::Empty;
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Input::Say(line.to_string());
    };

    let (command, arg) = match rest.split_once(char::is_whitespace) {
        Some((c, a)) => (c, a.trim()),
        None => (rest, ""),
    };
    match command.to_ascii_lowercase().as_str() {
        "handoff" | "agent" => Input::Handoff,
        "leave" => Input::Leave,
        "ai" | "ask" if arg.is_empty() => Input::Invalid("/ai needs a question".into()),
        "ai" | "ask" => Input::Ask(arg.to_string()),
        "resume" => Input::Resume,
        "reset" => Input::Reset,
        "quit" | "exit" => Input::Quit,
        "help" => Input::Help,
        other => Input::Invalid(format!("unknown command /{other}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_said() {
        assert_eq!(parse("  hello there "), Input::Say("hello there".into()));
    }

    #[test]
    fn blank_is_empty() {
        assert_eq!(parse("   "), Input::Empty);
    }

    #[test]
    fn commands() {
        assert_eq!(parse("/handoff"), Input::Handoff);
        assert_eq!(parse("/LEAVE"), Input::Leave);
        assert_eq!(parse("/resume"), Input::Resume);
        assert_eq!(parse("/reset"), Input::Reset);
        assert_eq!(parse("/quit"), Input::Quit);
        assert_eq!(parse("/help"), Input::Help);
    }

    #[test]
    fn ai_question() {
        assert_eq!(
            parse("/ai   what are your hours?"),
            Input::Ask("what are your hours?".into())
        );
        assert!(matches!(parse("/ai"), Input::Invalid(_)));
    }

    #[test]
    fn unknown_command() {
        assert_eq!(parse("/dance"), Input::Invalid("unknown command /dance".into()));
    }
}

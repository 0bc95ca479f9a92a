//! Parsing of typed input lines.

use anyhow::{Result, bail};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    /// Plain text for the current room.
    Say(String),
    Join(String),
    /// Leave the named room, or the current one.
    Leave(Option<String>),
    Typing(bool),
    Read(String),
    Connect,
    Disconnect,
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
/join <room>      join a room and make it current
/leave [room]     leave a room (default: current)
/typing on|off    send a typing signal
/read <id>        mark a message as read
/connect          connect (resets retries)
/disconnect       go offline, keep queued messages
/status           show connection state
/quit             exit";

/// Parse one line. Blank lines yield `None`.
pub fn parse(line: &str) -> Result<Option<Input>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let Some(command) = line.strip_prefix('/') else {
        return Ok(Some(Input::Say(line.to_string())));
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();

    let input = match (name, arg) {
        ("join", Some(room)) => Input::Join(room.to_string()),
        ("join", None) => bail!("usage: /join <room>"),
        ("leave", room) => Input::Leave(room.map(str::to_string)),
        ("typing", Some("on")) => Input::Typing(true),
        ("typing", Some("off")) => Input::Typing(false),
        ("typing", _) => bail!("usage: /typing on|off"),
        ("read", Some(id)) => Input::Read(id.to_string()),
        ("read", None) => bail!("usage: /read <message-id>"),
        ("connect", _) => Input::Connect,
        ("disconnect", _) => Input::Disconnect,
        ("status", _) => Input::Status,
        ("help", _) => Input::Help,
        ("quit" | "exit", _) => Input::Quit,
        (other, _) => bail!("unknown command /{other} (try /help)"),
    };
    Ok(Some(input))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_is_said() {
        assert_eq!(
            parse("  anyone selling potions?  ").unwrap(),
            Some(Input::Say("anyone selling potions?".into()))
        );
        assert_eq!(parse("   ").unwrap(), None);
    }

    #[test]
    fn commands() {
        assert_eq!(parse("/join trade-1").unwrap(), Some(Input::Join("trade-1".into())));
        assert_eq!(parse("/leave").unwrap(), Some(Input::Leave(None)));
        assert_eq!(parse("/leave lobby").unwrap(), Some(Input::Leave(Some("lobby".into()))));
        assert_eq!(parse("/typing on").unwrap(), Some(Input::Typing(true)));
        assert_eq!(parse("/typing off").unwrap(), Some(Input::Typing(false)));
        assert_eq!(parse("/read 01J0ABC").unwrap(), Some(Input::Read("01J0ABC".into())));
        assert_eq!(parse("/status").unwrap(), Some(Input::Status));
        assert_eq!(parse("/quit").unwrap(), Some(Input::Quit));
    }

    #[test]
    fn usage_errors() {
        assert!(parse("/join").is_err());
        assert!(parse("/typing maybe").is_err());
        assert!(parse("/read").is_err());
        let err = parse("/dance").unwrap_err();
        assert!(err.to_string().contains("/dance"));
    }
}

//! Console command parsing. Each line typed by the user maps to one control
//! of the connection panel.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Host(String),
    Port(u16),
    ClientId(String),
    /// An empty topic falls back to the default when connecting
    Topic(String),
    Message(String),
    /// Connect/disconnect toggle
    Connect,
    Disconnect,
    /// Publish the given text, or the message field when absent
    Publish(Option<String>),
    Share,
    Status,
    Help,
    Quit,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command: {0}")]
    UnknownCommand(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    #[error("Invalid port '{0}': expected a number between 1 and 65535")]
    InvalidPort(String),
}

pub const HELP_LINES: &[&str] = &[
    "Available commands:",
    "  host <hostname>      - Set the broker host",
    "  port <port>          - Set the broker websocket port",
    "  client-id <id>       - Set the MQTT client id",
    "  topic [topic]        - Set the topic (blank uses the default)",
    "  message <text>       - Set the message to publish",
    "  connect              - Start or end the connection",
    "  disconnect           - End the connection",
    "  publish [text]       - Publish text (or the message) to the topic",
    "  share                - Publish current location and temperature",
    "  status               - Show connection status",
    "  help                 - Show this help message",
    "  quit                 - Exit",
];

/// Parse one console line. Blank lines yield `Ok(None)`.
pub fn parse_command(input: &str) -> Result<Option<Command>, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(None);
    }

    let (command, rest) = match input.split_once(char::is_whitespace) {
        Some((command, rest)) => (command, rest.trim()),
        None => (input, ""),
    };

    let command = match command.to_lowercase().as_str() {
        "host" => Command::Host(single_arg(rest, "host <hostname>")?),
        "port" => {
            let arg = single_arg(rest, "port <port>")?;
            match arg.parse::<u16>() {
                Ok(port) if port != 0 => Command::Port(port),
                _ => return Err(ParseError::InvalidPort(arg)),
            }
        }
        "client-id" | "clientid" | "id" => {
            Command::ClientId(single_arg(rest, "client-id <id>")?)
        }
        "topic" => Command::Topic(rest.to_string()),
        "message" | "msg" => {
            if rest.is_empty() {
                return Err(ParseError::Usage("message <text>"));
            }
            Command::Message(rest.to_string())
        }
        "connect" | "start" => Command::Connect,
        "disconnect" | "end" => Command::Disconnect,
        "publish" | "pub" => {
            Command::Publish((!rest.is_empty()).then(|| rest.to_string()))
        }
        "share" => Command::Share,
        "status" => Command::Status,
        "help" | "?" => Command::Help,
        "quit" | "exit" => Command::Quit,
        other => return Err(ParseError::UnknownCommand(other.to_string())),
    };

    Ok(Some(command))
}

fn single_arg(rest: &str, usage: &'static str) -> Result<String, ParseError> {
    let mut parts = rest.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(arg), None) => Ok(arg.to_string()),
        _ => Err(ParseError::Usage(usage)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_line() {
        assert_eq!(parse_command(""), Ok(None));
        assert_eq!(parse_command("   \t"), Ok(None));
    }

    #[test]
    fn test_identity_commands() {
        assert_eq!(
            parse_command("host test.mosquitto.org"),
            Ok(Some(Command::Host("test.mosquitto.org".into())))
        );
        assert_eq!(parse_command("PORT 8884"), Ok(Some(Command::Port(8884))));
        assert_eq!(
            parse_command("client-id clientId-7"),
            Ok(Some(Command::ClientId("clientId-7".into())))
        );
        assert_eq!(
            parse_command("host"),
            Err(ParseError::Usage("host <hostname>"))
        );
        assert_eq!(
            parse_command("host a b"),
            Err(ParseError::Usage("host <hostname>"))
        );
    }

    #[test]
    fn test_invalid_port() {
        assert_eq!(
            parse_command("port 0"),
            Err(ParseError::InvalidPort("0".into()))
        );
        assert_eq!(
            parse_command("port 70000"),
            Err(ParseError::InvalidPort("70000".into()))
        );
        assert_eq!(
            parse_command("port abc"),
            Err(ParseError::InvalidPort("abc".into()))
        );
    }

    #[test]
    fn test_message_keeps_inner_whitespace() {
        assert_eq!(
            parse_command("message  hello   world "),
            Ok(Some(Command::Message("hello   world".into())))
        );
        assert_eq!(
            parse_command("publish {\"a\": 1}"),
            Ok(Some(Command::Publish(Some("{\"a\": 1}".into()))))
        );
        assert_eq!(parse_command("publish"), Ok(Some(Command::Publish(None))));
    }

    #[test]
    fn test_topic_may_be_cleared() {
        assert_eq!(parse_command("topic"), Ok(Some(Command::Topic(String::new()))));
        assert_eq!(
            parse_command("topic ENGO551/alex/my_temperature"),
            Ok(Some(Command::Topic("ENGO551/alex/my_temperature".into())))
        );
    }

    #[test]
    fn test_aliases_and_unknown() {
        assert_eq!(parse_command("start"), Ok(Some(Command::Connect)));
        assert_eq!(parse_command("end"), Ok(Some(Command::Disconnect)));
        assert_eq!(parse_command("exit"), Ok(Some(Command::Quit)));
        assert_eq!(
            parse_command("teleport 1 2 3"),
            Err(ParseError::UnknownCommand("teleport".into()))
        );
    }
}

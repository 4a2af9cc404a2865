//! Command parsing and dispatch for the vault port's line protocol (§4.5).

use broker_core::error::BrokerError;

/// A parsed command line, split into up to three whitespace-separated fields as §4.5
/// describes: `command`, first-arg, rest-of-line (the third field is not re-split, so a
/// `PUBLISH` payload may itself contain spaces).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Subscribe { topic: String },
    Unsubscribe { topic: String },
    Publish { topic: String, payload: String },
    Set { key: String, value: String },
    Get { key: String },
    Ping,
    Pong,
}

impl Command {
    /// Parses one already-unframed line (trailing `\r\n`/`\n` already stripped by the
    /// caller's `extract_line`). Returns `None` for empty lines (skipped silently) and
    /// `Err` for anything that doesn't match a recognized command or arity.
    pub fn parse(line: &str) -> Option<Result<Command, BrokerError>> {
        if line.is_empty() {
            return None;
        }

        let mut parts = line.splitn(3, ' ');
        let command = parts.next().unwrap_or("");
        let first_arg = parts.next();
        let rest = parts.next();

        let parsed = match command {
            "SUBSCRIBE" => first_arg
                .map(|topic| Command::Subscribe { topic: topic.to_owned() })
                .ok_or_else(invalid),
            "UNSUBSCRIBE" => first_arg
                .map(|topic| Command::Unsubscribe { topic: topic.to_owned() })
                .ok_or_else(invalid),
            "PUBLISH" => match (first_arg, rest) {
                (Some(topic), Some(payload)) => Ok(Command::Publish {
                    topic: topic.to_owned(),
                    payload: payload.to_owned(),
                }),
                _ => Err(invalid()),
            },
            "SET" => match (first_arg, rest) {
                (Some(key), Some(value)) => Ok(Command::Set {
                    key: key.to_owned(),
                    value: value.to_owned(),
                }),
                _ => Err(invalid()),
            },
            "GET" => first_arg
                .map(|key| Command::Get { key: key.to_owned() })
                .ok_or_else(invalid),
            "PING" => Ok(Command::Ping),
            "PONG" => Ok(Command::Pong),
            _ => Err(invalid()),
        };

        Some(parsed)
    }
}

fn invalid() -> BrokerError {
    BrokerError::Protocol("invalid command".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_each_recognized_command() {
        assert_eq!(
            Command::parse("SUBSCRIBE CMD-GRP-1").unwrap().unwrap(),
            Command::Subscribe { topic: "CMD-GRP-1".to_owned() }
        );
        assert_eq!(
            Command::parse("PUBLISH CMD-GRP-1 reboot now").unwrap().unwrap(),
            Command::Publish {
                topic: "CMD-GRP-1".to_owned(),
                payload: "reboot now".to_owned(),
            }
        );
        assert_eq!(
            Command::parse("SET uptime 12345").unwrap().unwrap(),
            Command::Set {
                key: "uptime".to_owned(),
                value: "12345".to_owned(),
            }
        );
        assert_eq!(Command::parse("GET uptime").unwrap().unwrap(), Command::Get { key: "uptime".to_owned() });
        assert_eq!(Command::parse("PING").unwrap().unwrap(), Command::Ping);
    }

    #[test]
    fn empty_line_is_skipped_not_an_error() {
        assert!(Command::parse("").is_none());
    }

    #[test]
    fn unknown_command_is_invalid() {
        assert!(Command::parse("DANCE now").unwrap().is_err());
    }

    #[test]
    fn insufficient_arity_is_invalid() {
        assert!(Command::parse("PUBLISH only-topic").unwrap().is_err());
        assert!(Command::parse("SET only-key").unwrap().is_err());
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::Deserialize;

/// One inbound line from the host, deserialized from its `command` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Send { pane_id: String, message: String },
    Broadcast { message: String, #[serde(default)] exclude: Vec<String> },
    Interrupt { pane_id: String },
    Restart { pane_id: String },
    Stop,
    GetSessions,
    Ping,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send() {
        let cmd: Command =
            serde_json::from_str(r#"{"command":"send","pane_id":"2","message":"hi"}"#).unwrap();
        match cmd {
            Command::Send { pane_id, message } => {
                assert_eq!(pane_id, "2");
                assert_eq!(message, "hi");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_broadcast_without_exclude() {
        let cmd: Command =
            serde_json::from_str(r#"{"command":"broadcast","message":"status?"}"#).unwrap();
        match cmd {
            Command::Broadcast { message, exclude } => {
                assert_eq!(message, "status?");
                assert!(exclude.is_empty());
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn parses_bare_commands() {
        let cmd: Command = serde_json::from_str(r#"{"command":"stop"}"#).unwrap();
        assert!(matches!(cmd, Command::Stop));
        let cmd: Command = serde_json::from_str(r#"{"command":"ping"}"#).unwrap();
        assert!(matches!(cmd, Command::Ping));
        let cmd: Command = serde_json::from_str(r#"{"command":"get_sessions"}"#).unwrap();
        assert!(matches!(cmd, Command::GetSessions));
    }

    #[test]
    fn rejects_unknown_command() {
        let result: Result<Command, _> = serde_json::from_str(r#"{"command":"nonsense"}"#);
        assert!(result.is_err());
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! The IPC command loop: a dedicated blocking thread feeds stdin lines into
//! the cooperative scheduler, and a `tokio::task::JoinSet` tracks in-flight
//! `send`/`broadcast` tasks so `stop` can drain them with a bound.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use hivemind_protocol::{Command, Event, OutputEvent};
use serde_json::Value;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::task::JoinSet;
use tracing::warn;

use crate::manager::Manager;

const SHUTDOWN_DRAIN_BOUND: Duration = Duration::from_secs(30);

/// One line off the blocking stdin reader thread.
enum InputLine {
    Line(String),
    Eof,
    Error(String),
}

/// Spawns the dedicated OS thread that blocks on stdin reads and bridges
/// each line into the async world via `blocking_send`. A cooperative
/// runtime cannot portably attach to blocking stdin, so this thread is the
/// only thing that ever calls a blocking read.
fn spawn_stdin_reader() -> mpsc::Receiver<InputLine> {
    let (tx, rx) = mpsc::channel(64);
    std::thread::spawn(move || {
        use std::io::BufRead;
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(text) => {
                    if tx.blocking_send(InputLine::Line(text)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    let _ = tx.blocking_send(InputLine::Error(e.to_string()));
                    return;
                }
            }
        }
        let _ = tx.blocking_send(InputLine::Eof);
    });
    rx
}

/// Parses one inbound line into a [`Command`], producing the exact
/// required-field error messages the host contract specifies rather than a
/// generic serde error.
fn parse_command(line: &str) -> Result<Command, String> {
    let value: Value = serde_json::from_str(line).map_err(|e| format!("invalid JSON: {e}"))?;
    let name = value
        .get("command")
        .and_then(Value::as_str)
        .ok_or_else(|| "missing command field".to_string())?;

    match name {
        "send" => {
            let pane_id = value.get("pane_id").and_then(Value::as_str);
            let message = value.get("message").and_then(Value::as_str);
            match (pane_id, message) {
                (Some(pane_id), Some(message)) => {
                    Ok(Command::Send { pane_id: pane_id.to_string(), message: message.to_string() })
                }
                _ => Err("send requires pane_id and message".to_string()),
            }
        }
        "broadcast" => match value.get("message").and_then(Value::as_str) {
            Some(message) => {
                let exclude = value
                    .get("exclude")
                    .and_then(Value::as_array)
                    .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                Ok(Command::Broadcast { message: message.to_string(), exclude })
            }
            None => Err("broadcast requires message".to_string()),
        },
        "interrupt" => value
            .get("pane_id")
            .and_then(Value::as_str)
            .map(|pane_id| Command::Interrupt { pane_id: pane_id.to_string() })
            .ok_or_else(|| "interrupt requires pane_id".to_string()),
        "restart" => value
            .get("pane_id")
            .and_then(Value::as_str)
            .map(|pane_id| Command::Restart { pane_id: pane_id.to_string() })
            .ok_or_else(|| "restart requires pane_id".to_string()),
        "stop" => Ok(Command::Stop),
        "get_sessions" => Ok(Command::GetSessions),
        "ping" => Ok(Command::Ping),
        other => Err(format!("Unknown command: {other}")),
    }
}

/// Runs the dispatcher to completion: starts the manager, emits `ready`,
/// then reads commands from stdin until `stop` or EOF.
pub async fn run_ipc(workspace: PathBuf, out: UnboundedSender<OutputEvent>) -> anyhow::Result<()> {
    let manager = Arc::new(Manager::start(workspace, &out).await);
    let mut stdin_rx = spawn_stdin_reader();
    let mut in_flight: JoinSet<()> = JoinSet::new();

    loop {
        let line = match stdin_rx.recv().await {
            Some(InputLine::Line(line)) => line,
            Some(InputLine::Eof) | None => break,
            Some(InputLine::Error(message)) => {
                let _ = out.send(OutputEvent::manager(Event::Error { message, error_type: "io".to_string() }));
                continue;
            }
        };

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                let _ =
                    out.send(OutputEvent::manager(Event::Error { message, error_type: "protocol".to_string() }));
                continue;
            }
        };

        match command {
            Command::Send { pane_id, message } => {
                let manager = manager.clone();
                let out = out.clone();
                in_flight.spawn(async move { manager.send_message(&pane_id, &message, &out).await });
            }
            Command::Broadcast { message, exclude } => {
                let manager = manager.clone();
                let out = out.clone();
                in_flight.spawn(async move { manager.broadcast(&message, &exclude, &out).await });
            }
            Command::GetSessions => {
                let sessions = manager.get_sessions().await;
                let _ = out.send(OutputEvent::manager(Event::Sessions { sessions }));
            }
            Command::Restart { pane_id } => {
                manager.restart_agent(&pane_id, &out).await;
            }
            Command::Interrupt { pane_id } => {
                manager.interrupt_agent(&pane_id, &out).await;
            }
            Command::Ping => {
                let _ = out.send(OutputEvent::manager(Event::Ready { agents: manager.pane_ids() }));
            }
            Command::Stop => {
                drain_in_flight(&mut in_flight, &out).await;
                manager.stop_all(&out).await;
                break;
            }
        }
    }

    Ok(())
}

/// Awaits every in-flight `send`/`broadcast` task with a 30-second bound.
/// Join errors are logged and surfaced as warnings rather than propagated —
/// one misbehaving turn must not block shutdown of the rest.
async fn drain_in_flight(in_flight: &mut JoinSet<()>, out: &UnboundedSender<OutputEvent>) {
    let drain = async {
        while let Some(result) = in_flight.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "in-flight task join error during shutdown");
                let _ = out.send(OutputEvent::manager(Event::Warning {
                    message: format!("in-flight task failed during shutdown: {e}"),
                }));
            }
        }
    };

    if tokio::time::timeout(SHUTDOWN_DRAIN_BOUND, drain).await.is_err() {
        let pending = in_flight.len();
        let _ = out.send(OutputEvent::manager(Event::Warning {
            message: format!("shutdown drain bound elapsed with {pending} task(s) still outstanding"),
        }));
        in_flight.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_send_with_required_fields() {
        let cmd = parse_command(r#"{"command":"send","pane_id":"2","message":"hi"}"#).unwrap();
        assert!(matches!(cmd, Command::Send { pane_id, message } if pane_id == "2" && message == "hi"));
    }

    #[test]
    fn send_missing_message_reports_exact_error() {
        let err = parse_command(r#"{"command":"send","pane_id":"1"}"#).unwrap_err();
        assert_eq!(err, "send requires pane_id and message");
    }

    #[test]
    fn broadcast_missing_message_reports_exact_error() {
        let err = parse_command(r#"{"command":"broadcast"}"#).unwrap_err();
        assert_eq!(err, "broadcast requires message");
    }

    #[test]
    fn interrupt_missing_pane_id_reports_exact_error() {
        let err = parse_command(r#"{"command":"interrupt"}"#).unwrap_err();
        assert_eq!(err, "interrupt requires pane_id");
    }

    #[test]
    fn unknown_command_reports_exact_error() {
        let err = parse_command(r#"{"command":"frobnicate"}"#).unwrap_err();
        assert_eq!(err, "Unknown command: frobnicate");
    }

    #[test]
    fn bare_commands_parse_without_fields() {
        assert!(matches!(parse_command(r#"{"command":"stop"}"#), Ok(Command::Stop)));
        assert!(matches!(parse_command(r#"{"command":"ping"}"#), Ok(Command::Ping)));
        assert!(matches!(parse_command(r#"{"command":"get_sessions"}"#), Ok(Command::GetSessions)));
    }

    #[test]
    fn broadcast_parses_optional_exclude_list() {
        let cmd = parse_command(r#"{"command":"broadcast","message":"go","exclude":["2","3"]}"#).unwrap();
        match cmd {
            Command::Broadcast { message, exclude } => {
                assert_eq!(message, "go");
                assert_eq!(exclude, vec!["2".to_string(), "3".to_string()]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}

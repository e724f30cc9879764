// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Codex CLI subprocess agent: `codex exec --json`, one process per turn.

use std::path::PathBuf;

use async_trait::async_trait;
use futures::stream::BoxStream;
use hivemind_config::AgentRole;
use hivemind_history::HistoryJournal;
use hivemind_protocol::Event;
use serde_json::Value;

use crate::agent::Agent;
use crate::error::AgentError;
use crate::shared::{consume_preamble, prepare_user_turn, record_assistant_turn};
use crate::subprocess::{drain_stdout, resolve_binary, spawn, InterruptFlag};

pub struct CodexAgent {
    role: AgentRole,
    workspace: PathBuf,
    journal: HistoryJournal,
    thread_id: Option<String>,
    pending_preamble: Option<String>,
    interrupt: InterruptFlag,
}

impl CodexAgent {
    pub fn new(role: AgentRole, workspace: PathBuf) -> Self {
        let journal = HistoryJournal::new(&workspace, role.pane_id.as_str(), &role.role_dir.to_lowercase());
        Self {
            role,
            workspace,
            journal,
            thread_id: None,
            pending_preamble: None,
            interrupt: InterruptFlag::new(),
        }
    }

}

fn build_args(message: &str, thread_id: Option<&str>) -> Vec<String> {
    let mut args = vec!["exec".to_string()];
    match thread_id {
        Some(id) => {
            args.push("resume".to_string());
            args.push(id.to_string());
            args.push("--json".to_string());
        }
        None => {
            args.push("--json".to_string());
        }
    }
    args.push(message.to_string());
    args
}

/// Maps one line of Codex's `--json` event stream to a normalized event.
/// Unrecognized `item` types and top-level message kinds fall through to
/// `Event::Unknown` rather than being dropped, so nothing silently
/// disappears from the host's view.
fn map_event(thread_id: &mut Option<String>, raw: &Value) -> Option<Event> {
    let msg_type = raw.get("type").and_then(Value::as_str)?;
    match msg_type {
        "thread.started" => {
            let id = raw.get("thread_id").and_then(Value::as_str).map(str::to_string);
            if id.is_some() {
                *thread_id = id.clone();
            }
            Some(Event::Status { state: "thread_started".to_string(), detail: id })
        }
        "turn.started" => Some(Event::Status { state: "turn_started".to_string(), detail: None }),
        "turn.completed" => {
            let usage = raw.get("usage").and_then(|u| u.get("cost_usd")).and_then(Value::as_f64);
            Some(Event::Status {
                state: "turn_completed".to_string(),
                detail: usage.map(|c| format!("cost_usd={c}")),
            })
        }
        "turn.failed" => {
            let message = raw
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("codex turn failed")
                .to_string();
            Some(Event::Error { message, error_type: "provider".to_string() })
        }
        "error" => {
            let message =
                raw.get("message").and_then(Value::as_str).unwrap_or("codex error").to_string();
            Some(Event::Error { message, error_type: "provider".to_string() })
        }
        "item.started" => Some(map_item_started(raw.get("item")?).unwrap_or_else(|| Event::Unknown { raw: raw.clone() })),
        "item.completed" => {
            Some(map_item_completed(raw.get("item")?).unwrap_or_else(|| Event::Unknown { raw: raw.clone() }))
        }
        _ => Some(Event::Unknown { raw: raw.clone() }),
    }
}

fn item_type(item: &Value) -> &str {
    item.get("item_type").and_then(Value::as_str).unwrap_or("")
}

/// `item.started` only carries enough detail to announce that a tool is
/// about to run (or that the model is reasoning/planning); the result of
/// that work arrives later on the matching `item.completed` line.
fn map_item_started(item: &Value) -> Option<Event> {
    match item_type(item) {
        "reasoning" => Some(Event::ThinkingDelta { text: "Reasoning...".to_string() }),
        "plan_update" => Some(Event::ThinkingDelta { text: "Updating plan...".to_string() }),
        "command_execution" => Some(Event::ToolUse {
            tool_name: "Bash".to_string(),
            tool_input: serde_json::json!({ "command": item.get("command") }),
        }),
        "file_change" => Some(Event::ToolUse {
            tool_name: "Edit".to_string(),
            tool_input: serde_json::json!({ "file_path": item.get("path") }),
        }),
        "mcp_tool_call" => Some(Event::ToolUse {
            tool_name: item.get("tool_name").and_then(Value::as_str).unwrap_or("mcp_tool").to_string(),
            tool_input: item.get("arguments").cloned().unwrap_or(Value::Null),
        }),
        "web_search" => Some(Event::ToolUse {
            tool_name: "WebSearch".to_string(),
            tool_input: serde_json::json!({ "query": item.get("query") }),
        }),
        _ => None,
    }
}

fn map_item_completed(item: &Value) -> Option<Event> {
    match item_type(item) {
        "reasoning" => {
            let text = item.get("text").and_then(Value::as_str).unwrap_or("").to_string();
            Some(Event::ThinkingDelta { text })
        }
        "agent_message" => {
            let text = item.get("text").and_then(Value::as_str).unwrap_or("").to_string();
            Some(Event::TextDelta { text })
        }
        "command_execution" => {
            let output = item.get("output").and_then(Value::as_str).unwrap_or("").to_string();
            let exit_code = item.get("exit_code").and_then(Value::as_i64).unwrap_or(0);
            Some(Event::ToolResult { tool_name: "Bash".to_string(), output, is_error: exit_code != 0 })
        }
        "file_change" => {
            let path = item.get("path").and_then(Value::as_str).unwrap_or("").to_string();
            Some(Event::ToolResult { tool_name: "Edit".to_string(), output: path, is_error: false })
        }
        _ => None,
    }
}

#[async_trait]
impl Agent for CodexAgent {
    fn role(&self) -> &AgentRole {
        &self.role
    }

    async fn connect(&mut self, resume_id: Option<String>) -> Result<(), AgentError> {
        self.thread_id = resume_id;
        self.pending_preamble = self.journal.build_context_restore(&self.role.role_name);
        Ok(())
    }

    fn send(&mut self, message: &str) -> BoxStream<'_, Event> {
        let clean = prepare_user_turn(&self.journal, message);
        let outbound = consume_preamble(&mut self.pending_preamble, &clean);
        self.interrupt.clear();

        let workspace = self.workspace.clone();
        let journal = self.journal.clone();
        let thread_id_for_retry = self.thread_id.clone();
        let interrupt = self.interrupt.clone();
        let final_thread_id = &mut self.thread_id;

        async_stream::stream! {
            yield Event::Status { state: "thinking".to_string(), detail: None };

            let binary = match resolve_binary("codex") {
                Ok(b) => b,
                Err(e) => {
                    yield Event::Error { message: e.to_string(), error_type: "fatal".to_string() };
                    return;
                }
            };

            let mut attempted_fresh_retry = false;
            let mut current_thread = thread_id_for_retry;
            let mut accumulated = String::new();
            let mut events: Vec<Event> = Vec::new();

            loop {
                let args = build_args(&outbound, current_thread.as_deref());
                let child = match spawn(&binary, &args, &workspace) {
                    Ok(c) => c,
                    Err(e) => {
                        yield Event::Error { message: e.to_string(), error_type: "fatal".to_string() };
                        return;
                    }
                };

                events.clear();
                let drain_result = drain_stdout(child, interrupt.clone(), |line| {
                    match serde_json::from_str::<Value>(line) {
                        Ok(raw) => {
                            if let Some(ev) = map_event(&mut current_thread, &raw) {
                                if let Event::TextDelta { text } = &ev {
                                    accumulated.push_str(text);
                                }
                                events.push(ev);
                            }
                        }
                        Err(_) => {
                            tracing::debug!(line, "codex emitted non-JSON line, skipping");
                        }
                    }
                })
                .await;

                match drain_result {
                    Ok(()) => break,
                    Err(AgentError::SessionExpired(_)) if !attempted_fresh_retry && current_thread.is_some() => {
                        attempted_fresh_retry = true;
                        current_thread = None;
                        yield Event::Status {
                            state: "thread_expired_restarting".to_string(),
                            detail: None,
                        };
                        continue;
                    }
                    Err(e) => {
                        yield Event::Error { message: e.to_string(), error_type: "provider".to_string() };
                        break;
                    }
                }
            }

            for ev in events.drain(..) {
                yield ev;
            }

            record_assistant_turn(&journal, &accumulated);
            *final_thread_id = current_thread.clone();
            yield Event::Result {
                session_id: current_thread,
                is_error: false,
                cost_usd: None,
            };
            yield Event::Status { state: "idle".to_string(), detail: None };
        }
        .boxed()
    }

    async fn interrupt(&mut self) -> bool {
        self.interrupt.set();
        true
    }

    async fn disconnect(&mut self) -> Option<String> {
        self.interrupt.set();
        self.thread_id.clone()
    }

    fn session_id(&self) -> Option<&str> {
        self.thread_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivemind_config::{ModelKind, PaneId, PermissionMode};

    fn test_role() -> AgentRole {
        AgentRole {
            role_name: "Infra".to_string(),
            pane_id: PaneId::new("2").unwrap(),
            model_kind: ModelKind::Codex,
            model: "gpt-5-codex".to_string(),
            role_dir: "infra".to_string(),
            allowed_tools: vec!["Bash".to_string()],
            permission_mode: PermissionMode::BypassPermissions,
        }
    }

    #[test]
    fn maps_thread_started_and_captures_thread_id() {
        let mut thread_id = None;
        let raw: Value = serde_json::from_str(r#"{"type":"thread.started","thread_id":"t-123"}"#).unwrap();
        let event = map_event(&mut thread_id, &raw).unwrap();
        assert!(matches!(event, Event::Status { state, .. } if state == "thread_started"));
        assert_eq!(thread_id.as_deref(), Some("t-123"));
    }

    #[test]
    fn maps_turn_started_and_turn_completed_to_status() {
        let mut thread_id = None;
        let started: Value = serde_json::from_str(r#"{"type":"turn.started"}"#).unwrap();
        assert!(matches!(map_event(&mut thread_id, &started), Some(Event::Status { state, .. }) if state == "turn_started"));

        let completed: Value = serde_json::from_str(r#"{"type":"turn.completed","usage":{"cost_usd":0.02}}"#).unwrap();
        assert!(matches!(map_event(&mut thread_id, &completed), Some(Event::Status { state, .. }) if state == "turn_completed"));
    }

    #[test]
    fn maps_agent_message_to_text_delta() {
        let mut thread_id = None;
        let raw: Value = serde_json::from_str(
            r#"{"type":"item.completed","item":{"item_type":"agent_message","text":"hi"}}"#,
        )
        .unwrap();
        let event = map_event(&mut thread_id, &raw).unwrap();
        assert!(matches!(event, Event::TextDelta { text } if text == "hi"));
    }

    #[test]
    fn maps_command_execution_started_and_completed() {
        let mut thread_id = None;
        let started: Value = serde_json::from_str(
            r#"{"type":"item.started","item":{"item_type":"command_execution","command":"ls"}}"#,
        )
        .unwrap();
        assert!(matches!(map_event(&mut thread_id, &started), Some(Event::ToolUse { tool_name, .. }) if tool_name == "Bash"));

        let completed: Value = serde_json::from_str(
            r#"{"type":"item.completed","item":{"item_type":"command_execution","output":"a.rs\n","exit_code":1}}"#,
        )
        .unwrap();
        assert!(matches!(
            map_event(&mut thread_id, &completed),
            Some(Event::ToolResult { is_error: true, .. })
        ));
    }

    #[test]
    fn maps_reasoning_started_to_placeholder_then_completed_to_text() {
        let mut thread_id = None;
        let started: Value =
            serde_json::from_str(r#"{"type":"item.started","item":{"item_type":"reasoning"}}"#).unwrap();
        assert!(
            matches!(map_event(&mut thread_id, &started), Some(Event::ThinkingDelta { text }) if text == "Reasoning...")
        );

        let completed: Value = serde_json::from_str(
            r#"{"type":"item.completed","item":{"item_type":"reasoning","text":"considering options"}}"#,
        )
        .unwrap();
        assert!(matches!(
            map_event(&mut thread_id, &completed),
            Some(Event::ThinkingDelta { text }) if text == "considering options"
        ));
    }

    #[test]
    fn unrecognized_type_becomes_unknown() {
        let mut thread_id = None;
        let raw: Value = serde_json::from_str(r#"{"type":"something.new"}"#).unwrap();
        assert!(matches!(map_event(&mut thread_id, &raw), Some(Event::Unknown { .. })));
    }

    #[test]
    fn build_args_includes_resume_when_thread_present() {
        let args = build_args("hello", Some("t-1"));
        assert!(args.contains(&"resume".to_string()));
        assert!(args.contains(&"t-1".to_string()));
    }

    #[test]
    fn new_agent_uses_given_role() {
        let dir = tempfile::tempdir().unwrap();
        let agent = CodexAgent::new(test_role(), dir.path().to_path_buf());
        assert_eq!(agent.role().role_name, "Infra");
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Gemini CLI subprocess agent: `gemini --output-format stream-json --yolo`,
//! one process per turn.

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

pub struct GeminiAgent {
    role: AgentRole,
    workspace: PathBuf,
    journal: HistoryJournal,
    session_id: Option<String>,
    pending_preamble: Option<String>,
    interrupt: InterruptFlag,
}

impl GeminiAgent {
    pub fn new(role: AgentRole, workspace: PathBuf) -> Self {
        let journal = HistoryJournal::new(&workspace, role.pane_id.as_str(), &role.role_dir.to_lowercase());
        Self {
            role,
            workspace,
            journal,
            session_id: None,
            pending_preamble: None,
            interrupt: InterruptFlag::new(),
        }
    }
}

fn build_args(message: &str, resume_index: Option<&str>) -> Vec<String> {
    let mut args = vec!["--output-format".to_string(), "stream-json".to_string(), "--yolo".to_string()];
    if let Some(index) = resume_index {
        args.push("--resume".to_string());
        args.push(index.to_string());
    }
    args.push("-p".to_string());
    args.push(message.to_string());
    args
}

/// One line of Gemini's `stream-json` output, mapped per the provider's
/// event schema: `init` carries the session id (captured, no event of its
/// own), `message` carries incremental assistant text (user-role echoes are
/// ignored), `tool_use`/`tool_result` bracket a tool call, and `result`
/// only ever flips the turn's error flag — the actual `Event::Result` is
/// synthesized once by `send` after the subprocess exits, same as Codex.
fn map_event(session_id: &mut Option<String>, has_error: &mut bool, raw: &Value) -> Option<Event> {
    let msg_type = raw.get("type").and_then(Value::as_str)?;
    match msg_type {
        "init" => {
            if let Some(id) = raw.get("session_id").and_then(Value::as_str) {
                *session_id = Some(id.to_string());
            }
            None
        }
        "message" => {
            let role = raw.get("role").and_then(Value::as_str).unwrap_or("assistant");
            if role == "user" {
                return None;
            }
            let content = raw.get("content").and_then(Value::as_str).unwrap_or("").to_string();
            Some(Event::TextDelta { text: content })
        }
        "tool_use" => {
            let name = raw
                .get("name")
                .or_else(|| raw.get("tool"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            let input = raw.get("args").or_else(|| raw.get("input")).cloned().unwrap_or(Value::Null);
            Some(Event::ToolUse { tool_name: name, tool_input: input })
        }
        "tool_result" => {
            let name = raw.get("name").and_then(Value::as_str).unwrap_or("").to_string();
            let output = raw
                .get("result")
                .or_else(|| raw.get("output"))
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            Some(Event::ToolResult { tool_name: name, output, is_error: false })
        }
        "result" => {
            let status = raw.get("status").and_then(Value::as_str).unwrap_or("success");
            if status != "success" {
                *has_error = true;
            }
            None
        }
        "error" => {
            let message = raw
                .get("message")
                .or_else(|| raw.get("content"))
                .and_then(Value::as_str)
                .unwrap_or("gemini turn failed")
                .to_string();
            *has_error = true;
            Some(Event::Error { message, error_type: "provider".to_string() })
        }
        _ => Some(Event::Unknown { raw: raw.clone() }),
    }
}

#[async_trait]
impl Agent for GeminiAgent {
    fn role(&self) -> &AgentRole {
        &self.role
    }

    async fn connect(&mut self, _resume_id: Option<String>) -> Result<(), AgentError> {
        self.pending_preamble = self.journal.build_context_restore(&self.role.role_name);
        Ok(())
    }

    fn send(&mut self, message: &str) -> BoxStream<'_, Event> {
        let clean = prepare_user_turn(&self.journal, message);
        let outbound = consume_preamble(&mut self.pending_preamble, &clean);
        self.interrupt.clear();

        let workspace = self.workspace.clone();
        let journal = self.journal.clone();
        let interrupt = self.interrupt.clone();
        let resume_index = self.session_id.clone();
        let session_id = &mut self.session_id;

        async_stream::stream! {
            yield Event::Status { state: "thinking".to_string(), detail: None };

            let binary = match resolve_binary("gemini") {
                Ok(b) => b,
                Err(e) => {
                    yield Event::Error { message: e.to_string(), error_type: "fatal".to_string() };
                    return;
                }
            };

            let args = build_args(&outbound, resume_index.as_deref());
            let child = match spawn(&binary, &args, &workspace) {
                Ok(c) => c,
                Err(e) => {
                    yield Event::Error { message: e.to_string(), error_type: "fatal".to_string() };
                    return;
                }
            };

            let mut accumulated = String::new();
            let mut events: Vec<Event> = Vec::new();
            let mut has_error = false;
            let mut captured_session = None;
            let drain_result = drain_stdout(child, interrupt, |line| {
                match serde_json::from_str::<Value>(line) {
                    Ok(raw) => {
                        if let Some(ev) = map_event(&mut captured_session, &mut has_error, &raw) {
                            if let Event::TextDelta { text } = &ev {
                                accumulated.push_str(text);
                            }
                            events.push(ev);
                        }
                    }
                    Err(_) => {
                        // Gemini's stream-json output occasionally emits a bare
                        // text fragment outside the JSON envelope; pass it
                        // through as assistant text rather than dropping it.
                        accumulated.push_str(line);
                        events.push(Event::TextDelta { text: line.to_string() });
                    }
                }
            })
            .await;

            if let Err(e) = drain_result {
                has_error = true;
                yield Event::Error { message: e.to_string(), error_type: "provider".to_string() };
            }

            for ev in events.drain(..) {
                yield ev;
            }

            if captured_session.is_some() {
                *session_id = captured_session.clone();
            }
            record_assistant_turn(&journal, &accumulated);
            yield Event::Result { session_id: captured_session, is_error: has_error, cost_usd: None };
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
        self.session_id.clone()
    }

    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_assistant_message_to_text_delta() {
        let mut session_id = None;
        let mut has_error = false;
        let raw: Value = serde_json::from_str(r#"{"type":"message","role":"assistant","content":"hi there"}"#).unwrap();
        let event = map_event(&mut session_id, &mut has_error, &raw).unwrap();
        assert!(matches!(event, Event::TextDelta { text } if text == "hi there"));
    }

    #[test]
    fn ignores_user_role_echo() {
        let mut session_id = None;
        let mut has_error = false;
        let raw: Value = serde_json::from_str(r#"{"type":"message","role":"user","content":"echoed"}"#).unwrap();
        assert!(map_event(&mut session_id, &mut has_error, &raw).is_none());
    }

    #[test]
    fn init_captures_session_id_without_emitting_event() {
        let mut session_id = None;
        let mut has_error = false;
        let raw: Value = serde_json::from_str(r#"{"type":"init","session_id":"sess-9"}"#).unwrap();
        assert!(map_event(&mut session_id, &mut has_error, &raw).is_none());
        assert_eq!(session_id.as_deref(), Some("sess-9"));
    }

    #[test]
    fn maps_tool_use_and_tool_result() {
        let mut session_id = None;
        let mut has_error = false;
        let call: Value =
            serde_json::from_str(r#"{"type":"tool_use","name":"read_file","args":{"path":"a.rs"}}"#).unwrap();
        assert!(matches!(map_event(&mut session_id, &mut has_error, &call), Some(Event::ToolUse { .. })));

        let result: Value =
            serde_json::from_str(r#"{"type":"tool_result","name":"read_file","result":"ok"}"#).unwrap();
        assert!(matches!(
            map_event(&mut session_id, &mut has_error, &result),
            Some(Event::ToolResult { is_error: false, .. })
        ));
    }

    #[test]
    fn non_success_result_sets_error_flag_without_emitting_event() {
        let mut session_id = None;
        let mut has_error = false;
        let raw: Value = serde_json::from_str(r#"{"type":"result","status":"failed"}"#).unwrap();
        assert!(map_event(&mut session_id, &mut has_error, &raw).is_none());
        assert!(has_error);
    }

    #[test]
    fn unrecognized_type_becomes_unknown() {
        let mut session_id = None;
        let mut has_error = false;
        let raw: Value = serde_json::from_str(r#"{"type":"mystery"}"#).unwrap();
        assert!(matches!(map_event(&mut session_id, &mut has_error, &raw), Some(Event::Unknown { .. })));
    }

    #[test]
    fn build_args_includes_prompt_flag() {
        let args = build_args("do the thing", None);
        assert!(args.contains(&"-p".to_string()));
        assert!(args.contains(&"do the thing".to_string()));
        assert!(!args.contains(&"--resume".to_string()));
    }

    #[test]
    fn build_args_includes_resume_when_session_present() {
        let args = build_args("do the thing", Some("sess-1"));
        assert!(args.contains(&"--resume".to_string()));
        assert!(args.contains(&"sess-1".to_string()));
    }
}

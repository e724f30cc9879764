// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One normalized event out of an agent's turn, or a manager-level event
/// about the system as a whole. Agent-scoped variants are emitted by the
/// provider layer without any notion of which pane they belong to; the
/// manager/output writer is what stamps `pane_id` and `role` on, via
/// [`OutputEvent`], so the provider code stays pane-agnostic.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    TextDelta { text: String },
    ThinkingDelta { text: String },
    ToolUse { tool_name: String, tool_input: Value },
    ToolResult { tool_name: String, output: String, is_error: bool },
    Status { state: String, detail: Option<String> },
    Result { session_id: Option<String>, is_error: bool, cost_usd: Option<f64> },
    Error { message: String, error_type: String },
    Unknown { raw: Value },

    Ready { agents: Vec<String> },
    AgentStarted { session_id: Option<String> },
    AgentRestarted {},
    Interrupted {},
    AllStopped { sessions_saved: usize },
    Warning { message: String },
    Sessions { sessions: Value },
    MessageReceived { message: String },
}

/// An [`Event`] tagged with which pane produced it (manager-level events
/// have neither).
#[derive(Debug, Clone, Serialize)]
pub struct OutputEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pane_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(flatten)]
    pub event: Event,
}

impl OutputEvent {
    pub fn for_pane(pane_id: impl Into<String>, role: impl Into<String>, event: Event) -> Self {
        Self { pane_id: Some(pane_id.into()), role: Some(role.into()), event }
    }

    pub fn manager(event: Event) -> Self {
        Self { pane_id: None, role: None, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agent_scoped_event_serializes_with_pane_and_type_tag() {
        let out = OutputEvent::for_pane("3", "Frontend", Event::TextDelta { text: "hi".into() });
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["pane_id"], "3");
        assert_eq!(json["role"], "Frontend");
        assert_eq!(json["type"], "text_delta");
        assert_eq!(json["text"], "hi");
    }

    #[test]
    fn manager_event_has_no_pane_fields() {
        let out = OutputEvent::manager(Event::Ready { agents: vec!["1".into()] });
        let json = serde_json::to_value(&out).unwrap();
        assert!(json.get("pane_id").is_none());
        assert_eq!(json["type"], "ready");
    }
}

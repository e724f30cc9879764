// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Persistent, bidirectional Claude agent backed by `claude-agent-sdk-rust`.
//!
//! Unlike the CLI-subprocess providers, this one holds a single long-lived
//! client connection across turns — started once at manager startup and
//! torn down once at shutdown, not per-message.

use std::path::PathBuf;

use async_trait::async_trait;
use claude_agent_sdk_rust::{
    AssistantMessage, ClaudeAgentOptions, ClaudeSdkClient, ContentBlock, PermissionMode as SdkPermissionMode,
    SdkMessage,
};
use futures::stream::{BoxStream, StreamExt};
use hivemind_config::{AgentRole, PermissionMode};
use hivemind_history::HistoryJournal;
use hivemind_protocol::Event;
use tracing::warn;

use crate::agent::Agent;
use crate::error::AgentError;
use crate::retry::with_backoff;
use crate::shared::{consume_preamble, prepare_user_turn, record_assistant_turn};

const SEND_RETRY_BASE: std::time::Duration = std::time::Duration::from_millis(500);

pub struct ClaudeAgent {
    role: AgentRole,
    workspace: PathBuf,
    journal: HistoryJournal,
    client: Option<ClaudeSdkClient>,
    session_id: Option<String>,
    pending_preamble: Option<String>,
}

impl ClaudeAgent {
    pub fn new(role: AgentRole, workspace: PathBuf) -> Self {
        let journal = HistoryJournal::new(&workspace, role.pane_id.as_str(), &role.role_dir.to_lowercase());
        Self { role, workspace, journal, client: None, session_id: None, pending_preamble: None }
    }

    fn instance_dir(&self) -> PathBuf {
        let dir = self.workspace.join("instances").join(&self.role.role_dir);
        if dir.is_dir() {
            dir
        } else {
            warn!(role = %self.role.role_name, dir = %dir.display(), "instance dir missing, using workspace root");
            self.workspace.clone()
        }
    }

    /// Sets both the structured `model` option and an `ANTHROPIC_MODEL`
    /// environment override naming the same model: the CLI the SDK
    /// shells out to has a known bug where the structured option alone is
    /// sometimes ignored, so the env var is belt-and-suspenders.
    fn build_options(&self) -> ClaudeAgentOptions {
        ClaudeAgentOptions {
            model: Some(self.role.model.clone()),
            env: std::collections::HashMap::from([(
                "ANTHROPIC_MODEL".to_string(),
                self.role.model.clone(),
            )]),
            allowed_tools: self.role.allowed_tools.clone(),
            permission_mode: map_permission_mode(self.role.permission_mode),
            cwd: Some(self.instance_dir()),
            setting_sources: vec!["project".to_string()],
            include_partial_messages: true,
            ..Default::default()
        }
    }
}

fn map_permission_mode(mode: PermissionMode) -> SdkPermissionMode {
    match mode {
        PermissionMode::Default => SdkPermissionMode::Default,
        PermissionMode::AcceptEdits => SdkPermissionMode::AcceptEdits,
        PermissionMode::Plan => SdkPermissionMode::Plan,
        PermissionMode::BypassPermissions => SdkPermissionMode::BypassPermissions,
    }
}

#[async_trait]
impl Agent for ClaudeAgent {
    fn role(&self) -> &AgentRole {
        &self.role
    }

    async fn connect(&mut self, _resume_id: Option<String>) -> Result<(), AgentError> {
        // Server-side resume is never requested (see design notes): context
        // continuity comes from the application-level restore preamble
        // instead, so any previously captured token is intentionally unused.
        let options = self.build_options();
        let mut client = ClaudeSdkClient::new(options);
        client
            .connect()
            .await
            .map_err(|e| AgentError::classify_message(&e.to_string()))?;
        self.pending_preamble = self.journal.build_context_restore(&self.role.role_name);
        self.client = Some(client);
        Ok(())
    }

    fn send(&mut self, message: &str) -> BoxStream<'_, Event> {
        let clean = prepare_user_turn(&self.journal, message);
        let outbound = consume_preamble(&mut self.pending_preamble, &clean);

        let client = match self.client.as_mut() {
            Some(c) => c,
            None => {
                return futures::stream::once(async {
                    Event::Error {
                        message: "not connected".to_string(),
                        error_type: "protocol".to_string(),
                    }
                })
                .boxed()
            }
        };

        let journal = &self.journal;
        let session_id = &mut self.session_id;

        async_stream::stream! {
            yield Event::Status { state: "thinking".to_string(), detail: None };

            let query_result = with_backoff(
                SEND_RETRY_BASE,
                |e: &claude_agent_sdk_rust::Error| e.to_string().to_ascii_lowercase().contains("timeout"),
                || client.query(outbound.clone()),
            )
            .await;

            if let Err(e) = query_result {
                yield Event::Error { message: e.to_string(), error_type: "transient".to_string() };
                return;
            }

            let mut accumulated = String::new();
            let mut messages = client.receive_response();
            while let Some(msg) = messages.next().await {
                match msg {
                    Ok(SdkMessage::Assistant(AssistantMessage { content, .. })) => {
                        for block in content {
                            match block {
                                ContentBlock::Text(t) => {
                                    accumulated.push_str(&t.text);
                                    yield Event::TextDelta { text: t.text };
                                }
                                ContentBlock::Thinking(t) => {
                                    yield Event::ThinkingDelta { text: t.thinking };
                                }
                                ContentBlock::ToolUse(t) => {
                                    yield Event::ToolUse { tool_name: t.name, tool_input: t.input };
                                }
                                ContentBlock::ToolResult(t) => {
                                    yield Event::ToolResult {
                                        tool_name: t.tool_use_id,
                                        output: t.content,
                                        is_error: t.is_error.unwrap_or(false),
                                    };
                                }
                            }
                        }
                    }
                    Ok(SdkMessage::System(sys)) => {
                        if let Some(id) = sys.session_id {
                            *session_id = Some(id);
                        }
                    }
                    Ok(SdkMessage::Result(result)) => {
                        if let Some(id) = result.session_id.clone() {
                            *session_id = Some(id);
                        }
                        yield Event::Result {
                            session_id: result.session_id,
                            is_error: result.is_error,
                            cost_usd: result.total_cost_usd,
                        };
                        break;
                    }
                    Ok(other) => {
                        yield Event::Unknown { raw: serde_json::to_value(&other).unwrap_or_default() };
                    }
                    Err(e) => {
                        yield Event::Error { message: e.to_string(), error_type: "provider".to_string() };
                        break;
                    }
                }
            }

            record_assistant_turn(journal, &accumulated);
            yield Event::Status { state: "idle".to_string(), detail: None };
        }
        .boxed()
    }

    async fn interrupt(&mut self) -> bool {
        match self.client.as_mut() {
            Some(c) => c.interrupt().await.is_ok(),
            None => false,
        }
    }

    async fn disconnect(&mut self) -> Option<String> {
        if let Some(mut client) = self.client.take() {
            let _ = tokio::time::timeout(std::time::Duration::from_secs(2), client.disconnect()).await;
        }
        self.session_id.clone()
    }

    fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }
}

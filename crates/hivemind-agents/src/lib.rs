// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Provider-agnostic agent contract plus the three concrete backends.

mod agent;
mod claude;
mod codex;
mod error;
mod gemini;
mod retry;
mod shared;
mod subprocess;

pub use agent::Agent;
pub use claude::ClaudeAgent;
pub use codex::CodexAgent;
pub use error::AgentError;
pub use gemini::GeminiAgent;

use std::path::PathBuf;

use hivemind_config::{AgentRole, ModelKind};

/// Constructs the right provider backend for a role, boxed behind the
/// shared [`Agent`] trait object so the manager never needs to know which
/// concrete type backs a given pane.
pub fn build_agent(role: AgentRole, workspace: PathBuf) -> Box<dyn Agent> {
    match role.model_kind {
        ModelKind::Claude => Box::new(ClaudeAgent::new(role, workspace)),
        ModelKind::Codex => Box::new(CodexAgent::new(role, workspace)),
        ModelKind::Gemini => Box::new(GeminiAgent::new(role, workspace)),
    }
}

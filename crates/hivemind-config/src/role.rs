// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies one of the six fixed panes. Valid values are the strings `"1"`
/// through `"6"`; the newtype exists because this value is both an internal
/// pane key and a JSON object key on the wire, so a bare `u8` would force
/// string conversions at every boundary instead of just the parse site.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaneId(String);

impl PaneId {
    pub fn new(s: impl Into<String>) -> Option<Self> {
        let s = s.into();
        match s.as_str() {
            "1" | "2" | "3" | "4" | "5" | "6" => Some(Self(s)),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PaneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which provider backs a pane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Claude,
    Codex,
    Gemini,
}

/// Mirrors the Claude Agent SDK's permission modes. The manager always
/// constructs agents with `BypassPermissions` (see `RoleTable::canonical`);
/// the other variants exist so the type isn't a lie about what the SDK
/// supports, and so a settings override could in principle select one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    Plan,
    BypassPermissions,
}

/// Static description of one pane: which role plays there, which provider
/// drives it, where its working directory lives, and what it's allowed to do.
#[derive(Debug, Clone)]
pub struct AgentRole {
    pub role_name: String,
    pub pane_id: PaneId,
    pub model_kind: ModelKind,
    /// Model identifier passed to the provider. Only consulted by
    /// `ClaudeAgent` (both as the SDK's structured `model` option and as
    /// the `ANTHROPIC_MODEL` environment override — see `claude.rs`); the
    /// CLI-subprocess providers pick their own default model and ignore it.
    pub model: String,
    pub role_dir: String,
    pub allowed_tools: Vec<String>,
    pub permission_mode: PermissionMode,
}

const DEFAULT_TOOLS: &[&str] = &["Read", "Write", "Edit", "Bash", "Glob", "Grep"];
const REVIEWER_TOOLS: &[&str] = &["Read", "Bash", "Glob", "Grep"];

const CLAUDE_MODEL: &str = "claude-sonnet-4-5";
const CODEX_MODEL: &str = "gpt-5-codex";
const GEMINI_MODEL: &str = "gemini-2.5-pro";

/// The fixed, ordered set of six panes this system always manages.
pub struct RoleTable;

impl RoleTable {
    /// Builds the six canonical roles in pane order 1-6. This set is fixed
    /// by design: panes are neither created nor destroyed at runtime, only
    /// restarted in place.
    pub fn canonical() -> [AgentRole; 6] {
        [
            role("1", "Architect", ModelKind::Claude, "architect", DEFAULT_TOOLS),
            role("2", "Infra", ModelKind::Codex, "infra", DEFAULT_TOOLS),
            role("3", "Frontend", ModelKind::Claude, "frontend", DEFAULT_TOOLS),
            role("4", "Backend", ModelKind::Gemini, "backend", DEFAULT_TOOLS),
            role("5", "Analyst", ModelKind::Claude, "analyst", DEFAULT_TOOLS),
            role("6", "Reviewer", ModelKind::Claude, "reviewer", REVIEWER_TOOLS),
        ]
    }
}

/// The default model identifier for a provider kind, used both when
/// building the canonical table and when a settings override switches a
/// pane's `model_kind` after the fact.
pub fn default_model_for(kind: ModelKind) -> &'static str {
    match kind {
        ModelKind::Claude => CLAUDE_MODEL,
        ModelKind::Codex => CODEX_MODEL,
        ModelKind::Gemini => GEMINI_MODEL,
    }
}

fn role(pane: &str, name: &str, kind: ModelKind, dir: &str, tools: &[&str]) -> AgentRole {
    let model = default_model_for(kind);
    AgentRole {
        role_name: name.to_string(),
        pane_id: PaneId::new(pane).expect("canonical pane ids are always valid"),
        model_kind: kind,
        model: model.to_string(),
        role_dir: dir.to_string(),
        allowed_tools: tools.iter().map(|t| t.to_string()).collect(),
        permission_mode: PermissionMode::BypassPermissions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pane_id_rejects_out_of_range() {
        assert!(PaneId::new("0").is_none());
        assert!(PaneId::new("7").is_none());
        assert!(PaneId::new("architect").is_none());
    }

    #[test]
    fn pane_id_accepts_one_through_six() {
        for n in 1..=6 {
            assert!(PaneId::new(n.to_string()).is_some());
        }
    }

    #[test]
    fn canonical_roles_are_six_in_pane_order() {
        let roles = RoleTable::canonical();
        assert_eq!(roles.len(), 6);
        for (i, r) in roles.iter().enumerate() {
            assert_eq!(r.pane_id.as_str(), (i + 1).to_string());
        }
        assert_eq!(roles[0].role_name, "Architect");
        assert_eq!(roles[5].role_name, "Reviewer");
    }

    #[test]
    fn reviewer_has_no_write_or_edit() {
        let roles = RoleTable::canonical();
        let reviewer = &roles[5];
        assert!(!reviewer.allowed_tools.contains(&"Write".to_string()));
        assert!(!reviewer.allowed_tools.contains(&"Edit".to_string()));
        assert!(reviewer.allowed_tools.contains(&"Bash".to_string()));
    }

    #[test]
    fn every_role_uses_bypass_permissions() {
        for r in RoleTable::canonical() {
            assert_eq!(r.permission_mode, PermissionMode::BypassPermissions);
        }
    }
}

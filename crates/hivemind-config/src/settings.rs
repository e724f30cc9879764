// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::collections::HashMap;
use std::path::Path;

use serde::Deserialize;
use tracing::warn;

use crate::role::ModelKind;

/// Overrides read from `<workspace>/ui/settings.json`, the same file the
/// desktop shell itself writes. Absence or a parse failure is never fatal —
/// the manager falls back to the canonical role table.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Settings {
    #[serde(default, rename = "paneCommands")]
    pub pane_commands: HashMap<String, String>,
}

impl Settings {
    /// Loads settings from `<workspace>/ui/settings.json`. Returns the
    /// default (empty) settings if the file is missing or malformed; a
    /// warning is logged in the malformed case so the operator can notice.
    pub fn load(workspace: &Path) -> Settings {
        let path = workspace.join("ui").join("settings.json");
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(_) => return Settings::default(),
        };
        match serde_json::from_str(&text) {
            Ok(s) => s,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed settings.json, using defaults");
                Settings::default()
            }
        }
    }

    /// Resolves a pane's `model_kind` override from its configured command
    /// prefix, if `ui/settings.json` set one for this pane. `codex`/`gemini`
    /// prefixes select those providers; any other prefix selects Claude.
    pub fn model_kind_override(&self, pane_id: &str) -> Option<ModelKind> {
        let command = self.pane_commands.get(pane_id)?;
        let first_word = command.split_whitespace().next().unwrap_or("");
        Some(match first_word {
            "codex" => ModelKind::Codex,
            "gemini" => ModelKind::Gemini,
            _ => ModelKind::Claude,
        })
    }
}

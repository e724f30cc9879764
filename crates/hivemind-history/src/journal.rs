// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Per-pane, append-only conversation journal.
//!
//! Each pane's history lives at `<workspace>/history/<pane_id>-<role>.jsonl`,
//! one JSON object per line. Appending never rewrites prior lines, so a
//! crash mid-write loses at most the partial last line, never history
//! already committed to disk.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

const MAX_ENTRY_CHARS: usize = 2000;
const CONTEXT_RESTORE_TAIL: usize = 20;
const CONTEXT_RESTORE_BULLET_CHARS: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HistoryRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub role: HistoryRole,
    pub content: String,
}

/// Bound to one `(pane_id, role_slug)` journal file under a workspace root.
#[derive(Clone)]
pub struct HistoryJournal {
    path: PathBuf,
}

impl HistoryJournal {
    pub fn new(workspace: &Path, pane_id: &str, role_slug: &str) -> Self {
        let path = workspace.join("history").join(format!("{pane_id}-{role_slug}.jsonl"));
        Self { path }
    }

    /// Appends one entry, truncating content to [`MAX_ENTRY_CHARS`] code
    /// points. History is advisory, so any IO failure here is logged and
    /// swallowed rather than propagated — a lost history line must never
    /// abort a turn already in flight.
    pub fn append(&self, role: HistoryRole, content: &str) {
        let content: String = content.chars().take(MAX_ENTRY_CHARS).collect();
        let entry = HistoryEntry { timestamp: Utc::now(), role, content };

        let Some(parent) = self.path.parent() else { return };
        if let Err(e) = fs::create_dir_all(parent) {
            warn!(path = %parent.display(), error = %e, "could not create history directory");
            return;
        }

        let Ok(line) = serde_json::to_string(&entry) else { return };
        let file = OpenOptions::new().create(true).append(true).open(&self.path);
        match file {
            Ok(mut f) => {
                if let Err(e) = writeln!(f, "{line}") {
                    warn!(path = %self.path.display(), error = %e, "could not append history entry");
                }
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "could not open history journal");
            }
        }
    }

    /// Loads the most recent `n` entries, oldest first. Returns an empty
    /// vector if the file is missing, unreadable, or contains no parseable
    /// lines — never an error, since a missing journal is the normal state
    /// for a brand-new pane.
    pub fn load_tail(&self, n: usize) -> Vec<HistoryEntry> {
        let Ok(text) = fs::read_to_string(&self.path) else { return Vec::new() };
        let mut entries: Vec<HistoryEntry> = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect();
        if entries.len() > n {
            entries = entries.split_off(entries.len() - n);
        }
        entries
    }

    /// Builds the one-shot context-restore preamble injected before the
    /// first message sent after a reconnect, summarizing the journal's
    /// recent tail so the provider's fresh session has some continuity with
    /// what came before. Each bullet's content is truncated to
    /// [`CONTEXT_RESTORE_BULLET_CHARS`] code points; the per-entry cap
    /// applied at append time keeps full history legible on disk, but the
    /// preamble itself stays short since it rides along with every prompt
    /// until the next reconnect.
    pub fn build_context_restore(&self, role_name: &str) -> Option<String> {
        let tail = self.load_tail(CONTEXT_RESTORE_TAIL);
        let last = tail.last()?;
        let mut preamble = format!(
            "HIVEMIND CONTEXT RESTORE - {role_name}\nLast entry: {}\n\n",
            last.timestamp.to_rfc3339()
        );
        for entry in &tail {
            let label = match entry.role {
                HistoryRole::User => "User",
                HistoryRole::Assistant => "Assistant",
            };
            let truncated: String = entry.content.chars().take(CONTEXT_RESTORE_BULLET_CHARS).collect();
            preamble.push_str(&format!("- {label}: {truncated}\n"));
        }
        preamble.push_str("\n(end of restored context)\n");
        Some(preamble)
    }
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cross-restart session token persistence.
//!
//! `session-state.json` is a single JSON object the host may also read or
//! write other top-level keys in; this store only ever touches its own
//! `sdk_sessions` key, preserving everything else on save.

use std::collections::HashMap;
use std::path::Path;

use serde_json::{json, Value};
use tracing::warn;

pub type SessionMap = HashMap<String, String>;

pub struct SessionStore;

impl SessionStore {
    /// Loads the `sdk_sessions` map from `path`. A missing file, unparsable
    /// JSON, or a JSON value that isn't an object of strings all yield an
    /// empty map plus a warning — never an error, since a fresh workspace
    /// has no session file at all.
    pub fn load(path: &Path) -> SessionMap {
        let text = match std::fs::read_to_string(path) {
            Ok(t) => t,
            Err(_) => return SessionMap::new(),
        };
        let root: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed session-state.json, starting fresh");
                return SessionMap::new();
            }
        };
        root.get("sdk_sessions")
            .and_then(Value::as_object)
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Read-modify-write: loads whatever top-level JSON object is already at
    /// `path` (or starts a fresh one), replaces only the `sdk_sessions` key,
    /// and writes the result back. Unrelated top-level keys the host may
    /// have written round-trip untouched.
    pub fn save(path: &Path, sessions: &SessionMap) -> anyhow::Result<()> {
        let mut root: Value = std::fs::read_to_string(path)
            .ok()
            .and_then(|t| serde_json::from_str(&t).ok())
            .unwrap_or_else(|| json!({}));

        if !root.is_object() {
            root = json!({});
        }
        root["sdk_sessions"] = json!(sessions);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(&root)?;
        std::fs::write(path, text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session-state.json");
        assert!(SessionStore::load(&path).is_empty());
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session-state.json");
        let mut sessions = SessionMap::new();
        sessions.insert("1".into(), "sess-abc".into());
        SessionStore::save(&path, &sessions).unwrap();
        let loaded = SessionStore::load(&path);
        assert_eq!(loaded.get("1").unwrap(), "sess-abc");
    }

    #[test]
    fn save_preserves_unrelated_top_level_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session-state.json");
        fs::write(&path, r#"{"workspace_name": "demo", "sdk_sessions": {"1": "old"}}"#).unwrap();

        let mut sessions = SessionMap::new();
        sessions.insert("1".into(), "new-token".into());
        SessionStore::save(&path, &sessions).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let root: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(root["workspace_name"], "demo");
        assert_eq!(root["sdk_sessions"]["1"], "new-token");
    }

    #[test]
    fn malformed_file_yields_empty_map_not_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session-state.json");
        fs::write(&path, "not json at all").unwrap();
        assert!(SessionStore::load(&path).is_empty());
    }
}

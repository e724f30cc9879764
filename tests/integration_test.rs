// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Cross-crate integration tests: session persistence, settings-driven
//! model-kind overrides, and sanitizer/history behavior wired together the
//! way the manager actually uses them, rather than in isolated unit tests.

use std::fs;

use hivemind_config::{ModelKind, RoleTable, Settings};
use hivemind_history::{HistoryJournal, HistoryRole, SessionStore};
use hivemind_protocol::sanitize::{sanitize_text, strip_role_markers};

#[test]
fn session_store_round_trips_through_a_real_workspace_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("session-state.json");

    fs::write(&path, r#"{"other_top_level_key": 42, "sdk_sessions": {}}"#).unwrap();

    let mut sessions = SessionStore::load(&path);
    sessions.insert("1".to_string(), "tok-architect".to_string());
    sessions.insert("2".to_string(), "tok-infra".to_string());
    SessionStore::save(&path, &sessions).unwrap();

    let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(raw["other_top_level_key"], 42);

    let reloaded = SessionStore::load(&path);
    assert_eq!(reloaded.get("1").unwrap(), "tok-architect");
    assert_eq!(reloaded.get("2").unwrap(), "tok-infra");
}

#[test]
fn settings_override_changes_canonical_role_model_kind() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("ui")).unwrap();
    fs::write(
        dir.path().join("ui").join("settings.json"),
        r#"{"paneCommands": {"1": "gemini --yolo"}}"#,
    )
    .unwrap();

    let settings = Settings::load(dir.path());
    let mut roles = RoleTable::canonical();
    for role in &mut roles {
        if let Some(kind) = settings.model_kind_override(role.pane_id.as_str()) {
            role.model_kind = kind;
        }
    }

    assert_eq!(roles[0].model_kind, ModelKind::Gemini);
    assert_eq!(roles[1].model_kind, ModelKind::Codex);
}

#[test]
fn history_journal_strips_role_markers_before_append_and_restore_draws_on_the_tail() {
    let dir = tempfile::tempdir().unwrap();
    let journal = HistoryJournal::new(dir.path(), "3", "frontend");

    let raw = "Human: hello\n\nAssistant:";
    let clean = strip_role_markers(&sanitize_text(raw));
    assert_eq!(clean, "hello");

    journal.append(HistoryRole::User, &clean);
    journal.append(HistoryRole::Assistant, "hi there");

    let preamble = journal.build_context_restore("Frontend");
    assert!(preamble.is_some());
    let preamble = preamble.unwrap();
    assert!(preamble.contains("hello"));
    assert!(preamble.contains("hi there"));
}

#[test]
fn model_kind_override_defaults_to_claude_for_unrecognized_command_prefix() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("ui")).unwrap();
    fs::write(
        dir.path().join("ui").join("settings.json"),
        r#"{"paneCommands": {"5": "some-custom-wrapper.sh"}}"#,
    )
    .unwrap();

    let settings = Settings::load(dir.path());
    assert_eq!(settings.model_kind_override("5"), Some(ModelKind::Claude));
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Behavior shared by all three provider backends but not worth putting on
//! the [`crate::Agent`] trait itself, since there is no common base type to
//! hang it from — each implementation calls these directly.

use hivemind_history::{HistoryJournal, HistoryRole};
use hivemind_protocol::sanitize::{sanitize_text, strip_role_markers};

/// Sanitizes an outbound/inbound message and records it to history with
/// role markers stripped, so a provider's own `Human:`/`Assistant:` labels
/// echoed back into a prompt never get re-saved and re-injected on the next
/// reconnect. If stripping markers leaves nothing (the message was a bare
/// marker), no history entry is written at all. Returns the sanitized
/// (but un-stripped) text for the caller to actually transmit — stripping
/// only governs what lands in history, not what the provider receives.
pub fn prepare_user_turn(journal: &HistoryJournal, message: &str) -> String {
    let clean = sanitize_text(message);
    let for_history = strip_role_markers(&clean);
    if !for_history.trim().is_empty() {
        journal.append(HistoryRole::User, &for_history);
    }
    clean
}

/// Cleans accumulated assistant text (role-marker stripped) and, if
/// non-empty, appends it to history. Returns the cleaned text.
pub fn record_assistant_turn(journal: &HistoryJournal, raw: &str) -> String {
    let clean = strip_role_markers(&sanitize_text(raw));
    if !clean.trim().is_empty() {
        journal.append(HistoryRole::Assistant, &clean);
    }
    clean
}

/// Pops the pending context-restore preamble (if any) and prepends it to
/// the message being sent, separated by a horizontal rule so the provider
/// can visually distinguish restored context from the live turn. The slot
/// is consumed unconditionally by this call — at most one message per
/// reconnect ever carries the preamble.
pub fn consume_preamble(pending: &mut Option<String>, message: &str) -> String {
    match pending.take() {
        Some(preamble) => format!("{preamble}\n\n---\n\n{message}"),
        None => message.to_string(),
    }
}

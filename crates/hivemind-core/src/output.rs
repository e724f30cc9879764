// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Single-writer stdout event sink.
//!
//! The dispatcher and every spawned per-command task send onto one
//! `UnboundedSender<OutputEvent>`; this function is the only place that ever
//! touches stdout, so line integrity holds without an explicit mutex (see
//! the manager's own doc comment on this split).

use hivemind_protocol::OutputEvent;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::mpsc::UnboundedReceiver;

/// Drains `rx` until the channel closes, writing one JSON line per event.
pub async fn run_output_writer(mut rx: UnboundedReceiver<OutputEvent>) {
    let mut stdout = tokio::io::stdout();
    while let Some(event) = rx.recv().await {
        write_line(&mut stdout, &event).await;
    }
}

async fn write_line(stdout: &mut Stdout, event: &OutputEvent) {
    let line = serde_json::to_string(event).unwrap_or_else(|e| {
        serde_json::json!({
            "type": "error",
            "message": format!("failed to serialize event: {e}"),
            "error_type": "encoding",
        })
        .to_string()
    });
    if stdout.write_all(line.as_bytes()).await.is_err() {
        return;
    }
    if stdout.write_all(b"\n").await.is_err() {
        return;
    }
    let _ = stdout.flush().await;
}

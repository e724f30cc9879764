// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//! Shared plumbing for the two per-turn CLI-subprocess providers (Codex,
//! Gemini): resolving the binary, spawning with piped stdio, and draining
//! stdout line-by-line with a cooperative interrupt flag.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Notify;

use crate::error::AgentError;

/// How long a terminated subprocess gets to exit cleanly before it is force-killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Resolves `program` to an absolute path via `PATH` search. Some platforms
/// refuse to spawn certain executable kinds by bare name, so every
/// CLI-subprocess agent resolves its binary up front rather than at spawn
/// time.
pub fn resolve_binary(program: &str) -> Result<PathBuf, AgentError> {
    which::which(program).map_err(|_| AgentError::MissingBinary(program.to_string()))
}

/// Cooperative interrupt signal shared between a running subprocess task and
/// `Agent::interrupt`. `set` both flips the flag and wakes anyone blocked in
/// `drain_stdout`, so an interrupt preempts a stalled read instead of waiting
/// for the next line to arrive.
#[derive(Clone, Default)]
pub struct InterruptFlag {
    flag: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl InterruptFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.flag.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn clear(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolves once `set` is called. Racing this against a blocking read is
    /// what lets an interrupt preempt it promptly.
    async fn notified(&self) {
        self.notify.notified().await;
    }
}

/// Spawns `binary args...` with piped stdout/stderr, forced UTF-8 output
/// environment, and the given working directory.
pub fn spawn(binary: &PathBuf, args: &[String], cwd: &std::path::Path) -> std::io::Result<Child> {
    Command::new(binary)
        .args(args)
        .current_dir(cwd)
        .env("PYTHONIOENCODING", "utf-8")
        .env("LANG", "en_US.UTF-8")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
}

/// Reads NDJSON lines from `child`'s stdout, calling `on_line` for each
/// parsed, non-empty line, stopping early if `interrupt` becomes set. On
/// normal EOF, waits for exit and returns stderr text if the exit was
/// non-zero.
pub async fn drain_stdout(
    mut child: Child,
    interrupt: InterruptFlag,
    mut on_line: impl FnMut(&str),
) -> Result<(), AgentError> {
    let stdout = child.stdout.take().expect("piped stdout");
    let mut lines = BufReader::new(stdout).lines();

    loop {
        if interrupt.is_set() {
            terminate(&mut child).await;
            return Ok(());
        }
        tokio::select! {
            biased;
            _ = interrupt.notified() => {
                terminate(&mut child).await;
                return Ok(());
            }
            next = lines.next_line() => {
                match next {
                    Ok(Some(line)) => {
                        if !line.trim().is_empty() {
                            on_line(&line);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => return Err(AgentError::Transient(e.to_string())),
                }
            }
        }
    }

    let status = child.wait().await.map_err(|e| AgentError::Transient(e.to_string()))?;
    if !status.success() {
        let mut stderr_text = String::new();
        if let Some(mut stderr) = child.stderr.take() {
            use tokio::io::AsyncReadExt;
            let _ = stderr.read_to_string(&mut stderr_text).await;
        }
        return Err(AgentError::classify_message(&stderr_text));
    }
    Ok(())
}

/// Sends a terminate signal, gives the process `TERMINATE_GRACE` to exit on
/// its own, then force-kills it. On Unix this is a real `SIGTERM` followed by
/// `SIGKILL`; on other platforms `Child::kill` is already a hard kill so the
/// grace wait is skipped.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        if let Some(pid) = child.id() {
            unsafe {
                libc::kill(pid as i32, libc::SIGTERM);
            }
            if tokio::time::timeout(TERMINATE_GRACE, child.wait()).await.is_ok() {
                return;
            }
        }
    }
    let _ = child.kill().await;
}

// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
mod cli;
mod warning_filter;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::unbounded_channel;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use cli::Cli;
use hivemind_core::{run_ipc, run_output_writer, Manager};
use hivemind_protocol::Event;
use warning_filter::WarningFilterWriter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    #[cfg(windows)]
    force_utf8_console();

    let cli = Cli::parse();
    init_logging();

    std::fs::create_dir_all(&cli.workspace)
        .with_context(|| format!("creating workspace directory {}", cli.workspace.display()))?;

    if cli.ipc {
        run_ipc_mode(cli.workspace).await
    } else {
        run_repl(cli.workspace).await
    }
}

/// IPC mode: the output writer owns stdout exclusively, and the dispatcher
/// owns stdin via its dedicated blocking reader thread.
async fn run_ipc_mode(workspace: PathBuf) -> anyhow::Result<()> {
    let (out_tx, out_rx) = unbounded_channel();
    let writer = tokio::spawn(run_output_writer(out_rx));
    run_ipc(workspace, out_tx).await?;
    writer.await.context("output writer task panicked")?;
    Ok(())
}

/// Interactive REPL: `send <pane> <msg>`, `broadcast <msg>`, `sessions`,
/// `quit`. Prints human-readable summaries rather than raw event JSON.
async fn run_repl(workspace: PathBuf) -> anyhow::Result<()> {
    let (out_tx, mut out_rx) = unbounded_channel();
    let manager = Manager::start(workspace, &out_tx).await;

    let printer = tokio::spawn(async move {
        while let Some(out) = out_rx.recv().await {
            print_human(&out);
        }
    });

    println!("hivemind ready. Commands: send <pane> <msg> | broadcast <msg> | sessions | quit");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await.context("reading from stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut parts = line.splitn(3, ' ');
        let cmd = parts.next().unwrap_or("");
        match cmd {
            "send" => {
                let pane = parts.next().unwrap_or("");
                let message = parts.next().unwrap_or("");
                if pane.is_empty() || message.is_empty() {
                    println!("usage: send <pane> <message>");
                    continue;
                }
                manager.send_message(pane, message, &out_tx).await;
            }
            "broadcast" => {
                let rest: String = [parts.next().unwrap_or(""), parts.next().unwrap_or("")]
                    .iter()
                    .filter(|s| !s.is_empty())
                    .cloned()
                    .collect::<Vec<_>>()
                    .join(" ");
                if rest.is_empty() {
                    println!("usage: broadcast <message>");
                    continue;
                }
                manager.broadcast(&rest, &[], &out_tx).await;
            }
            "sessions" => {
                let sessions = manager.get_sessions().await;
                println!("{}", serde_json::to_string_pretty(&sessions).unwrap_or_default());
            }
            "quit" | "exit" => break,
            other => println!("unknown command: {other}"),
        }
    }

    manager.stop_all(&out_tx).await;
    drop(out_tx);
    printer.await.context("output printer task panicked")?;
    Ok(())
}

fn print_human(out: &hivemind_protocol::OutputEvent) {
    let prefix = match (&out.pane_id, &out.role) {
        (Some(pane), Some(role)) => format!("[{pane}:{role}] "),
        _ => String::new(),
    };
    match &out.event {
        Event::TextDelta { text } => print!("{text}"),
        Event::ThinkingDelta { .. } => {}
        Event::ToolUse { tool_name, .. } => println!("\n{prefix}→ {tool_name}"),
        Event::ToolResult { tool_name, is_error, .. } => {
            let marker = if *is_error { "failed" } else { "ok" };
            println!("{prefix}← {tool_name} ({marker})");
        }
        Event::Status { state, detail } => {
            if let Some(detail) = detail {
                println!("{prefix}status: {state} ({detail})");
            }
        }
        Event::Result { .. } => println!(),
        Event::Error { message, .. } => println!("{prefix}error: {message}"),
        Event::Unknown { .. } => {}
        Event::Ready { agents } => println!("ready: panes {agents:?}"),
        Event::AgentStarted { .. } => println!("{prefix}started"),
        Event::AgentRestarted {} => println!("{prefix}restarted"),
        Event::Interrupted {} => println!("{prefix}interrupted"),
        Event::AllStopped { sessions_saved } => println!("stopped, {sessions_saved} session(s) saved"),
        Event::Warning { message } => println!("{prefix}warning: {message}"),
        Event::Sessions { sessions } => println!("{sessions}"),
        Event::MessageReceived { .. } => {}
    }
}

/// Suppresses nothing by default: tracing goes to stderr since stdout is
/// reserved for the IPC event channel. Set `HIVEMIND_LOG_FILE` to redirect
/// to a file instead (useful when stderr is also being watched by a host).
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    if let Ok(log_path) = std::env::var("HIVEMIND_LOG_FILE") {
        if let Ok(file) = std::fs::OpenOptions::new().create(true).append(true).open(&log_path) {
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(false).with_ansi(false).with_writer(WarningFilterWriter::new(file)))
                .with(filter)
                .try_init();
            return;
        }
    }

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(WarningFilterWriter::new(std::io::stderr())))
        .with(filter)
        .try_init();
}

/// Forces UTF-8 on stdout/stderr on Windows, where the default console code
/// page can mangle non-ASCII agent output. Mirrors the original Python
/// source's `sys.stdout.reconfigure(encoding="utf-8")` startup step.
#[cfg(windows)]
fn force_utf8_console() {
    extern "system" {
        fn SetConsoleOutputCP(wCodePageID: u32) -> i32;
        fn SetConsoleCP(wCodePageID: u32) -> i32;
    }
    const CP_UTF8: u32 = 65001;
    unsafe {
        SetConsoleOutputCP(CP_UTF8);
        SetConsoleCP(CP_UTF8);
    }
}

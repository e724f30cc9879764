// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::Parser;

/// Multi-provider coding-agent orchestrator: six fixed panes, one process.
#[derive(Parser, Debug)]
#[command(name = "hivemind", version, about)]
pub struct Cli {
    /// Root directory for history, session state, and per-role instance dirs.
    #[arg(long, default_value = ".")]
    pub workspace: PathBuf,

    /// Run the line-delimited JSON command loop against stdin/stdout instead
    /// of the interactive REPL.
    #[arg(long)]
    pub ipc: bool,
}

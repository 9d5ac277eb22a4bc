// Copyright (c) 2026 Warden Contributors
//
// SPDX-License-Identifier: Apache-2.0
use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

#[derive(Parser, Debug)]
#[command(
    name = "warden",
    about = "Per-workspace runtime for long-lived conversational agents",
    version,
    long_about = None,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the workspace's `agent.yaml`. Defaults to `./agent.yaml`.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Workspace directory: where `.warden/` state and `memory/` archives
    /// live. Defaults to the current directory.
    #[arg(long, short = 'w', global = true)]
    pub workspace: Option<PathBuf>,

    /// Increase verbosity (-v = debug, -vv = trace).
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the workspace: bring up the channel, the schedulers, the main
    /// lane workers, and the periodic cleanup task, then block until
    /// interrupted.
    Run,
    /// Print the effective merged configuration (global layers + workspace
    /// `agent.yaml`) and exit.
    ShowConfig,
    /// Generate a shell completion script.
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

impl Cli {
    pub fn workspace_dir(&self) -> PathBuf {
        self.workspace.clone().unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(|| self.workspace_dir().join("agent.yaml"))
    }
}

pub fn print_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "warden", &mut std::io::stdout());
}

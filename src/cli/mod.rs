//! CLI surface.
//!
//! A minimal launch invocation: start the interactive core against a
//! repository, with no non-interactive subcommands. The interactive UI
//! attaches separately and is out of this binary's scope; its only job is to
//! wire the core up and hand it off.

use std::path::PathBuf;

use clap::Parser;

/// Launch the kasmos orchestrator core against a repository.
#[derive(Parser, Debug)]
#[command(name = "kasmos")]
#[command(about = "Interactive terminal orchestrator for multi-agent coding sessions", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Root of the git repository to orchestrate against. Defaults to the
    /// current directory.
    #[arg(long)]
    pub repo_root: Option<PathBuf>,

    /// Project identifier used to namespace plans/topics/instances.
    /// Defaults to the repository directory's name.
    #[arg(long)]
    pub project: Option<String>,

    /// Override the resolved per-user config directory.
    #[arg(long)]
    pub config_dir: Option<PathBuf>,
}

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::commands::{branches, commit, kill, project, resume, run, sessions, watch};

#[derive(Parser)]
#[command(name = "fjord")]
#[command(about = "Run coding agents side by side, each in its own git worktree")]
#[command(version)]
pub struct Cli {
    /// Custom config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Register, list or remove projects
    #[command(subcommand)]
    Project(project::Command),

    /// Start a new agent session and attach to it
    Run(run::Args),

    /// List the sessions found in a project
    Sessions(sessions::Args),

    /// Re-attach an agent to a dormant session
    Resume(resume::Args),

    /// Stop a session and remove its worktree
    Kill(kill::Args),

    /// List branches available for new sessions
    Branches(branches::Args),

    /// Stream file changes and conflicts of a session's worktree
    Watch(watch::Args),

    /// Commit a session's changes with an agent-written message
    Commit(commit::Args),
}

impl Commands {
    /// Commands that hand the terminal to an agent log to a file instead
    /// of stderr.
    pub fn is_interactive(&self) -> bool {
        matches!(self, Commands::Run(_) | Commands::Resume(_))
    }
}

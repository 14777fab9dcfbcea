use thiserror::Error;

use crate::git::CommandError;
use crate::process::PoolError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Project not found: {0}")]
    ProjectNotFound(String),

    #[error("Runtime not found: {0}")]
    RuntimeNotFound(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Pull request #{0} not found or has no head branch")]
    PullRequestNotFound(u64),

    #[error("Not a pull request reference: {0}")]
    InvalidPullRequest(String),

    #[error("Project {0} already has a session running in its own directory")]
    ProjectRootInUse(String),

    #[error("Working tree at {0} has uncommitted changes; commit or stash them first")]
    DirtyWorkingTree(String),

    #[error("Runtime {0} has no print mode configured")]
    PrintModeUnsupported(String),

    #[error("Session {0} has no running process; resume it first")]
    SessionBusy(String),

    #[error(transparent)]
    Command(#[from] CommandError),

    #[error(transparent)]
    Process(#[from] PoolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Metadata(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_error_converts_transparently() {
        let err: OrchestratorError = CommandError::Failed {
            program: "git".to_string(),
            args: "status".to_string(),
            code: Some(128),
            stderr: "not a git repository".to_string(),
        }
        .into();
        assert!(
            err.to_string().contains("not a git repository"),
            "OrchestratorError::Command: stderr should be part of the message"
        );
    }

    #[test]
    fn conflict_messages_are_actionable() {
        let err = OrchestratorError::DirtyWorkingTree("/repo".to_string());
        assert!(err.to_string().contains("commit or stash"));
    }
}

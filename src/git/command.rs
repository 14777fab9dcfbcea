use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to launch {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} {args} exited with {code:?}: {stderr}")]
    Failed {
        program: String,
        args: String,
        code: Option<i32>,
        stderr: String,
    },
}

impl CommandError {
    pub fn stderr(&self) -> Option<&str> {
        match self {
            CommandError::Failed { stderr, .. } => Some(stderr),
            CommandError::Spawn { .. } => None,
        }
    }
}

/// Single choke-point for every external command the orchestrator runs.
///
/// Resolves to the command's standard output, or rejects with the stderr
/// text when the process exits non-zero.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<String, CommandError>;
}

#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner;

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, program: &str, args: &[&str], cwd: &Path) -> Result<String, CommandError> {
        tracing::debug!("exec {} {} (cwd: {})", program, args.join(" "), cwd.display());

        let output = Command::new(program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: program.to_string(),
                source,
            })?;

        if !output.status.success() {
            return Err(CommandError::Failed {
                program: program.to_string(),
                args: args.join(" "),
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Thin wrapper that names the two binaries the core talks to.
#[derive(Clone)]
pub struct GitClient {
    runner: Arc<dyn CommandRunner>,
    gh_binary: String,
}

impl GitClient {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            runner,
            gh_binary: "gh".to_string(),
        }
    }

    pub fn system() -> Self {
        Self::new(Arc::new(SystemCommandRunner))
    }

    pub fn runner(&self) -> Arc<dyn CommandRunner> {
        Arc::clone(&self.runner)
    }

    pub async fn git(&self, cwd: &Path, args: &[&str]) -> Result<String, CommandError> {
        self.runner.run("git", args, cwd).await
    }

    pub async fn gh(&self, cwd: &Path, args: &[&str]) -> Result<String, CommandError> {
        self.runner.run(&self.gh_binary, args, cwd).await
    }
}

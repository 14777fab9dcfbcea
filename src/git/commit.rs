use anyhow::{Context, Result};
use minijinja::Environment;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use super::command::GitClient;
use crate::config::RuntimeConfig;
use crate::utils::truncate_str;

const MAX_DIFF_CHARS: usize = 20_000;

pub fn render_commit_prompt(template: &str, stat: &str, diff: &str) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("commit", template)
        .context("Failed to add commit prompt template")?;
    let template = env
        .get_template("commit")
        .context("Failed to get commit prompt template")?;

    template
        .render(minijinja::context! {
            stat => stat,
            diff => truncate_str(diff, MAX_DIFF_CHARS),
        })
        .context("Failed to render commit prompt")
}

/// Removes a surrounding code fence some agents wrap their answer in.
pub fn clean_commit_message(raw: &str) -> String {
    let trimmed = raw.trim();
    let unfenced = trimmed
        .strip_prefix("```")
        .and_then(|rest| rest.strip_suffix("```"))
        .map(|inner| inner.split_once('\n').map(|(_, body)| body).unwrap_or(inner))
        .unwrap_or(trimmed);
    unfenced.trim().to_string()
}

/// Asks an agent runtime for a commit message describing a worktree's
/// changes, then commits them.
pub struct CommitMessageGenerator {
    git: GitClient,
    template: String,
    timeout: Duration,
}

impl CommitMessageGenerator {
    pub fn new(git: GitClient, template: String, timeout: Duration) -> Self {
        Self {
            git,
            template,
            timeout,
        }
    }

    /// Stages everything and renders the prompt. `None` when there is
    /// nothing to commit.
    pub async fn prepare_prompt(&self, worktree: &Path) -> Result<Option<String>> {
        self.git.git(worktree, &["add", "-A"]).await?;
        let stat = self.git.git(worktree, &["diff", "--cached", "--stat"]).await?;
        if stat.trim().is_empty() {
            return Ok(None);
        }
        let diff = self.git.git(worktree, &["diff", "--cached"]).await?;
        render_commit_prompt(&self.template, stat.trim_end(), &diff).map(Some)
    }

    pub async fn generate(&self, worktree: &Path, runtime: &RuntimeConfig) -> Result<Option<String>> {
        if runtime.oneshot_args.is_empty() {
            anyhow::bail!("Runtime {} cannot answer one-shot prompts", runtime.id);
        }
        let Some(prompt) = self.prepare_prompt(worktree).await? else {
            return Ok(None);
        };

        let mut args = runtime.args.clone();
        args.extend(runtime.oneshot_args.iter().cloned());
        args.push(prompt);

        tracing::info!("Generating commit message with {}", runtime.id);
        let child = Command::new(&runtime.binary)
            .args(&args)
            .envs(&runtime.env)
            .current_dir(worktree)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = tokio::time::timeout(self.timeout, child)
            .await
            .with_context(|| {
                format!("{} did not answer within {:?}", runtime.binary, self.timeout)
            })?
            .with_context(|| format!("Failed to launch {}", runtime.binary))?;

        if !output.status.success() {
            anyhow::bail!(
                "{} exited with {:?}: {}",
                runtime.binary,
                output.status.code(),
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let message = clean_commit_message(&String::from_utf8_lossy(&output.stdout));
        if message.is_empty() {
            anyhow::bail!("{} returned an empty commit message", runtime.binary);
        }
        Ok(Some(message))
    }

    pub async fn commit_all(&self, worktree: &Path, message: &str) -> Result<()> {
        self.git.git(worktree, &["add", "-A"]).await?;
        self.git
            .git(worktree, &["commit", "-m", message])
            .await
            .context("git commit failed")?;
        Ok(())
    }
}

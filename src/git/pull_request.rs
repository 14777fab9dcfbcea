use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

use super::branches::BranchResolver;
use crate::error::{OrchestratorError, Result};

fn pull_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/pull/(\d+)").expect("valid pull url regex"))
}

/// Accepts `123`, `#123`, or any URL containing `/pull/<n>`.
pub fn parse_pr_reference(reference: &str) -> Result<u64> {
    let trimmed = reference.trim();
    let digits = trimmed.strip_prefix('#').unwrap_or(trimmed);
    if let Ok(number) = digits.parse::<u64>() {
        return Ok(number);
    }

    pull_url_regex()
        .captures(trimmed)
        .and_then(|caps| caps[1].parse::<u64>().ok())
        .ok_or_else(|| OrchestratorError::InvalidPullRequest(reference.to_string()))
}

impl BranchResolver {
    /// Looks up the PR's head branch with the hosting CLI and fetches it.
    pub async fn resolve_pr_branch(&self, repo: &Path, reference: &str) -> Result<String> {
        let number = parse_pr_reference(reference)?;
        let number_arg = number.to_string();

        let out = self
            .git()
            .gh(
                repo,
                &[
                    "pr",
                    "view",
                    &number_arg,
                    "--json",
                    "headRefName",
                    "--jq",
                    ".headRefName",
                ],
            )
            .await?;

        let branch = out.trim().to_string();
        if branch.is_empty() {
            return Err(OrchestratorError::PullRequestNotFound(number));
        }

        self.git().git(repo, &["fetch", "origin", &branch]).await?;
        tracing::info!("Resolved PR #{} to branch {}", number, branch);
        Ok(branch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::command::testing::ScriptedRunner;
    use crate::git::GitClient;
    use std::sync::Arc;

    #[test]
    fn parse_pr_reference_accepts_number_hash_and_url() {
        assert_eq!(parse_pr_reference("42").unwrap(), 42);
        assert_eq!(parse_pr_reference(" #7 ").unwrap(), 7);
        assert_eq!(
            parse_pr_reference("https://github.com/acme/app/pull/1234/files").unwrap(),
            1234
        );
    }

    #[test]
    fn parse_pr_reference_rejects_other_text() {
        assert!(matches!(
            parse_pr_reference("feature/login"),
            Err(OrchestratorError::InvalidPullRequest(_))
        ));
    }

    #[tokio::test]
    async fn resolve_pr_branch_fetches_head_branch() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("gh pr view 12", Ok("feature/pr-branch\n"));
        let resolver = BranchResolver::new(GitClient::new(runner.clone()));

        let branch = resolver
            .resolve_pr_branch(Path::new("/repo"), "https://github.com/a/b/pull/12")
            .await
            .unwrap();

        assert_eq!(branch, "feature/pr-branch");
        assert!(
            runner
                .calls()
                .contains(&"git fetch origin feature/pr-branch".to_string()),
            "resolve_pr_branch: should fetch the head branch from origin"
        );
    }

    #[tokio::test]
    async fn resolve_pr_branch_empty_output_is_not_found() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("gh pr view", Ok("\n"));
        let resolver = BranchResolver::new(GitClient::new(runner));

        let err = resolver
            .resolve_pr_branch(Path::new("/repo"), "#9")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::PullRequestNotFound(9)));
    }

    #[tokio::test]
    async fn resolve_pr_branch_propagates_cli_failure() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("gh pr view", Err("no pull requests found"));
        let resolver = BranchResolver::new(GitClient::new(runner));

        let err = resolver
            .resolve_pr_branch(Path::new("/repo"), "3")
            .await
            .unwrap_err();
        assert!(matches!(err, OrchestratorError::Command(_)));
    }
}

pub mod branches;
pub mod command;
pub mod commit;
pub mod naming;
pub mod pull_request;
pub mod status;
pub mod worktree;

pub use branches::{BranchInfo, BranchLocation, BranchResolver};
pub use command::{CommandError, CommandRunner, GitClient, SystemCommandRunner};
pub use naming::{slugify, BranchNamer};
pub use status::{parse_porcelain, ChangeKind, FileChange, StatusReport};
pub use worktree::{Worktree, WorktreeEntry, WorktreeManager};

#[cfg(test)]
pub(crate) mod test_repo {
    use std::path::{Path, PathBuf};
    use std::process::Command;

    pub fn git(dir: &Path, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(["-c", "user.name=fjord", "-c", "user.email=fjord@example.com"])
            .args(args)
            .current_dir(dir)
            .output()
            .unwrap();
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).to_string()
    }

    /// Repository on `main` with one commit, canonicalised path.
    pub fn init(dir: &Path) -> PathBuf {
        let repo = dir.canonicalize().unwrap();
        git(&repo, &["init", "-q", "-b", "main"]);
        std::fs::write(repo.join("README.md"), "# test\n").unwrap();
        git(&repo, &["add", "."]);
        git(&repo, &["commit", "-q", "-m", "init"]);
        repo
    }

    pub fn branch_exists(repo: &Path, branch: &str) -> bool {
        Command::new("git")
            .args(["rev-parse", "--verify", "--quiet", &format!("refs/heads/{branch}")])
            .current_dir(repo)
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

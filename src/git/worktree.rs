use std::path::{Path, PathBuf};

use super::branches::BranchResolver;
use super::command::GitClient;
use super::naming::{branch_dir_name, BranchNamer};
use crate::error::Result;

const FJORD_DIR: &str = ".fjord";

fn path_to_str(path: &Path) -> Result<&str> {
    path.to_str().ok_or_else(|| {
        anyhow::anyhow!("Path contains non-UTF8 characters: {:?}", path).into()
    })
}

fn same_path(a: &Path, b: &Path) -> bool {
    let a = a.canonicalize().unwrap_or_else(|_| a.to_path_buf());
    let b = b.canonicalize().unwrap_or_else(|_| b.to_path_buf());
    a == b
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Worktree {
    pub branch: String,
    pub path: PathBuf,
}

/// One block of `git worktree list --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorktreeEntry {
    pub path: PathBuf,
    pub branch: Option<String>,
    pub primary: bool,
}

pub fn parse_worktree_list(text: &str) -> Vec<WorktreeEntry> {
    let mut entries: Vec<WorktreeEntry> = Vec::new();

    for line in text.lines() {
        if let Some(path) = line.strip_prefix("worktree ") {
            entries.push(WorktreeEntry {
                path: PathBuf::from(path),
                branch: None,
                primary: entries.is_empty(),
            });
        } else if let Some(branch) = line.strip_prefix("branch ") {
            if let Some(entry) = entries.last_mut() {
                let name = branch.strip_prefix("refs/heads/").unwrap_or(branch);
                entry.branch = Some(name.to_string());
            }
        }
    }

    entries
}

#[derive(Clone)]
pub struct WorktreeManager {
    git: GitClient,
    branches: BranchResolver,
    namer: BranchNamer,
}

impl WorktreeManager {
    pub fn new(git: GitClient, namer: BranchNamer) -> Self {
        Self {
            branches: BranchResolver::new(git.clone()),
            git,
            namer,
        }
    }

    pub fn worktree_dir(repo: &Path) -> PathBuf {
        repo.join(FJORD_DIR).join("worktrees")
    }

    pub fn worktree_path(repo: &Path, branch: &str) -> PathBuf {
        Self::worktree_dir(repo).join(branch_dir_name(branch))
    }

    /// Cuts a new branch from `base` and checks it out into its own
    /// directory. Generates a branch name when none is supplied.
    pub async fn create_worktree(
        &self,
        repo: &Path,
        base: &str,
        namespace: &str,
        branch: Option<&str>,
        task_description: Option<&str>,
    ) -> Result<Worktree> {
        let branch = match branch {
            Some(name) => name.to_string(),
            None => {
                let existing = self.branches.local_branches(repo).await?;
                match task_description.filter(|t| !t.trim().is_empty()) {
                    Some(task) => self.namer.generate_for_task(namespace, task, &existing),
                    None => self.namer.generate(namespace, &existing),
                }
            }
        };

        let path = self.prepare_dir(repo, &branch).await?;
        let path_str = path_to_str(&path)?;

        if let Err(e) = self
            .git
            .git(repo, &["worktree", "add", "-b", &branch, path_str, base])
            .await
        {
            tokio::fs::remove_dir(&path).await.ok();
            return Err(e.into());
        }

        tracing::info!("Created worktree {} for branch {}", path.display(), branch);
        Ok(Worktree { branch, path })
    }

    /// Checks out an existing branch (local, or a unique remote-tracking
    /// ref) into a fresh working copy.
    pub async fn add_worktree_for_branch(&self, repo: &Path, branch: &str) -> Result<Worktree> {
        let path = self.prepare_dir(repo, branch).await?;
        let path_str = path_to_str(&path)?;

        if let Err(e) = self
            .git
            .git(repo, &["worktree", "add", path_str, branch])
            .await
        {
            tokio::fs::remove_dir(&path).await.ok();
            return Err(e.into());
        }

        tracing::info!("Created worktree {} for existing branch {}", path.display(), branch);
        Ok(Worktree {
            branch: branch.to_string(),
            path,
        })
    }

    /// Force-removes the working copy, then deletes its branch if it is
    /// one of ours. Branch deletion failures are swallowed.
    pub async fn remove_worktree(&self, repo: &Path, path: &Path, namespace: &str) -> Result<()> {
        let branch = self
            .list_worktrees(repo, namespace)
            .await?
            .into_iter()
            .find(|wt| same_path(&wt.path, path))
            .map(|wt| wt.branch);

        let path_str = path_to_str(path)?;
        self.git
            .git(repo, &["worktree", "remove", "--force", path_str])
            .await?;

        if let Some(branch) = branch {
            if let Err(e) = self.git.git(repo, &["branch", "-D", &branch]).await {
                tracing::warn!("Failed to delete branch {}: {}", branch, e);
            }
        }

        Ok(())
    }

    /// Secondary working copies whose branch lives under `<namespace>/`.
    /// The primary checkout is never listed, whatever it has checked out.
    pub async fn list_worktrees(&self, repo: &Path, namespace: &str) -> Result<Vec<Worktree>> {
        let prefix = format!("{namespace}/");
        Ok(self
            .list_all_worktrees(repo)
            .await?
            .into_iter()
            .filter(|entry| !entry.primary)
            .filter_map(|entry| match entry.branch {
                Some(branch) if branch.starts_with(&prefix) => Some(Worktree {
                    branch,
                    path: entry.path,
                }),
                _ => None,
            })
            .collect())
    }

    pub async fn list_all_worktrees(&self, repo: &Path) -> Result<Vec<WorktreeEntry>> {
        let text = self
            .git
            .git(repo, &["worktree", "list", "--porcelain"])
            .await?;
        Ok(parse_worktree_list(&text))
    }

    async fn prepare_dir(&self, repo: &Path, branch: &str) -> Result<PathBuf> {
        self.ensure_excluded(repo).await;
        let path = Self::worktree_path(repo, branch);
        tokio::fs::create_dir_all(&path).await?;
        Ok(path)
    }

    /// Adds `/.fjord/` to the repository's `info/exclude`. Best effort.
    async fn ensure_excluded(&self, repo: &Path) {
        let common_dir = match self
            .git
            .git(repo, &["rev-parse", "--path-format=absolute", "--git-common-dir"])
            .await
        {
            Ok(out) => PathBuf::from(out.trim()),
            Err(e) => {
                tracing::warn!("Could not locate git dir for {}: {}", repo.display(), e);
                return;
            }
        };

        let exclude = common_dir.join("info").join("exclude");
        let entry = format!("/{FJORD_DIR}/");
        let current = tokio::fs::read_to_string(&exclude).await.unwrap_or_default();
        if current.lines().any(|l| l.trim() == entry) {
            return;
        }

        let mut updated = current;
        if !updated.is_empty() && !updated.ends_with('\n') {
            updated.push('\n');
        }
        updated.push_str(&entry);
        updated.push('\n');

        if let Some(parent) = exclude.parent() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
        if let Err(e) = tokio::fs::write(&exclude, updated).await {
            tracing::warn!("Failed to update {}: {}", exclude.display(), e);
        }
    }
}

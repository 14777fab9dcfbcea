use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use super::command::{CommandError, GitClient};
use super::worktree::parse_worktree_list;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BranchLocation {
    Local,
    Remote,
    Both,
}

impl BranchLocation {
    fn merge(self, other: BranchLocation) -> BranchLocation {
        if self == other {
            self
        } else {
            BranchLocation::Both
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BranchInfo {
    pub name: String,
    pub location: BranchLocation,
}

/// Maps a full ref name to its display name and location. `None` for refs
/// that are never offered (`HEAD` pointers, tags, notes).
fn classify_ref(refname: &str) -> Option<(String, BranchLocation)> {
    let (name, location) = if let Some(local) = refname.strip_prefix("refs/heads/") {
        (local, BranchLocation::Local)
    } else if let Some(remote) = refname.strip_prefix("refs/remotes/") {
        (remote.strip_prefix("origin/").unwrap_or(remote), BranchLocation::Remote)
    } else {
        return None;
    };

    if name.is_empty() || name == "HEAD" || name.ends_with("/HEAD") {
        return None;
    }
    Some((name.to_string(), location))
}

/// Builds the suggestible branch list from `for-each-ref` output, dropping
/// anything in `checked_out`.
pub fn collect_branches(refs_output: &str, checked_out: &HashSet<String>) -> Vec<BranchInfo> {
    let mut seen: BTreeMap<String, BranchLocation> = BTreeMap::new();

    for line in refs_output.lines() {
        let Some((name, location)) = classify_ref(line.trim()) else {
            continue;
        };
        if checked_out.contains(&name) {
            continue;
        }
        seen.entry(name)
            .and_modify(|existing| *existing = existing.merge(location))
            .or_insert(location);
    }

    seen.into_iter()
        .map(|(name, location)| BranchInfo { name, location })
        .collect()
}

/// Branch lookups and checkouts against a project's primary directory.
#[derive(Clone)]
pub struct BranchResolver {
    git: GitClient,
}

impl BranchResolver {
    pub fn new(git: GitClient) -> Self {
        Self { git }
    }

    pub fn git(&self) -> &GitClient {
        &self.git
    }

    /// Branches a user may pick for a new session. Offline repositories
    /// fall back to local refs; a failed ref listing yields an empty list.
    pub async fn list_branches(&self, repo: &Path) -> Vec<BranchInfo> {
        if let Err(e) = self.git.git(repo, &["fetch", "--all", "--prune"]).await {
            tracing::warn!("Branch listing: fetch failed, using local refs: {}", e);
        }

        let checked_out: HashSet<String> =
            match self.git.git(repo, &["worktree", "list", "--porcelain"]).await {
                Ok(text) => parse_worktree_list(&text)
                    .into_iter()
                    .filter(|entry| !entry.primary)
                    .filter_map(|entry| entry.branch)
                    .collect(),
                Err(e) => {
                    tracing::warn!("Branch listing: worktree list failed: {}", e);
                    HashSet::new()
                }
            };

        match self
            .git
            .git(
                repo,
                &["for-each-ref", "--format=%(refname)", "refs/heads", "refs/remotes"],
            )
            .await
        {
            Ok(refs) => collect_branches(&refs, &checked_out),
            Err(e) => {
                tracing::warn!("Branch listing: for-each-ref failed: {}", e);
                Vec::new()
            }
        }
    }

    pub async fn local_branches(&self, repo: &Path) -> Result<HashSet<String>, CommandError> {
        let out = self
            .git
            .git(repo, &["for-each-ref", "--format=%(refname:short)", "refs/heads"])
            .await?;
        Ok(out
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    pub async fn current_branch(&self, repo: &Path) -> Result<String, CommandError> {
        let out = self
            .git
            .git(repo, &["rev-parse", "--abbrev-ref", "HEAD"])
            .await?;
        Ok(out.trim().to_string())
    }

    /// True when tracked files have no changes. Untracked files are ignored.
    pub async fn is_clean(&self, repo: &Path) -> Result<bool, CommandError> {
        let out = self
            .git
            .git(repo, &["status", "--porcelain", "--untracked-files=no"])
            .await?;
        Ok(out.trim().is_empty())
    }

    pub async fn checkout_branch(&self, repo: &Path, branch: &str) -> Result<(), CommandError> {
        self.git.git(repo, &["checkout", branch]).await?;
        Ok(())
    }

    pub async fn checkout_new_branch(
        &self,
        repo: &Path,
        branch: &str,
        base: &str,
    ) -> Result<(), CommandError> {
        self.git.git(repo, &["checkout", "-b", branch, base]).await?;
        Ok(())
    }

    /// Most recently committed local branch under `<namespace>/`.
    pub async fn newest_namespace_branch(&self, repo: &Path, namespace: &str) -> Option<String> {
        let pattern = format!("refs/heads/{namespace}/");
        match self
            .git
            .git(
                repo,
                &[
                    "for-each-ref",
                    "--sort=-committerdate",
                    "--format=%(refname:short)",
                    &pattern,
                ],
            )
            .await
        {
            Ok(out) => out
                .lines()
                .map(str::trim)
                .find(|l| !l.is_empty())
                .map(str::to_string),
            Err(e) => {
                tracing::debug!("newest_namespace_branch: {}", e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::command::testing::ScriptedRunner;
    use std::sync::Arc;

    #[test]
    fn collect_branches_strips_origin_and_merges_locations() {
        let refs = "refs/heads/main\nrefs/heads/feature\nrefs/remotes/origin/HEAD\nrefs/remotes/origin/main\nrefs/remotes/origin/remote-only\n";
        let branches = collect_branches(refs, &HashSet::new());
        assert_eq!(
            branches,
            vec![
                BranchInfo { name: "feature".into(), location: BranchLocation::Local },
                BranchInfo { name: "main".into(), location: BranchLocation::Both },
                BranchInfo { name: "remote-only".into(), location: BranchLocation::Remote },
            ],
            "collect_branches: should dedupe by name, drop HEAD and sort"
        );
    }

    #[test]
    fn collect_branches_drops_checked_out_names() {
        let refs = "refs/heads/main\nrefs/heads/proj/oslo\nrefs/remotes/origin/proj/oslo\n";
        let checked_out = HashSet::from(["proj/oslo".to_string()]);
        let names: Vec<String> = collect_branches(refs, &checked_out)
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["main"]);
    }

    #[test]
    fn classify_ref_ignores_tags() {
        assert_eq!(classify_ref("refs/tags/v1.0"), None);
        assert_eq!(
            classify_ref("refs/remotes/upstream/dev"),
            Some(("upstream/dev".to_string(), BranchLocation::Remote))
        );
    }

    #[tokio::test]
    async fn list_branches_keeps_primary_checkout_but_drops_secondary_worktrees() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("git fetch", Err("no remote"));
        runner.respond(
            "git worktree list",
            Ok("worktree /repo\nHEAD 1\nbranch refs/heads/main\n\nworktree /repo/.fjord/worktrees/proj-oslo\nHEAD 2\nbranch refs/heads/proj/oslo\n"),
        );
        runner.respond(
            "git for-each-ref",
            Ok("refs/heads/main\nrefs/heads/proj/oslo\nrefs/heads/proj/bergen\n"),
        );
        let resolver = BranchResolver::new(GitClient::new(runner));

        let names: Vec<String> = resolver
            .list_branches(Path::new("/repo"))
            .await
            .into_iter()
            .map(|b| b.name)
            .collect();

        assert_eq!(
            names,
            vec!["main", "proj/bergen"],
            "list_branches: main checkout stays, secondary worktree branch is hidden"
        );
    }

    #[tokio::test]
    async fn list_branches_returns_empty_when_refs_fail() {
        let runner = Arc::new(ScriptedRunner::new());
        runner.respond("git for-each-ref", Err("fatal: not a git repository"));
        let resolver = BranchResolver::new(GitClient::new(runner));
        assert!(resolver.list_branches(Path::new("/nowhere")).await.is_empty());
    }

    #[tokio::test]
    async fn is_clean_and_checkout_against_real_repo() {
        let tmp = tempfile::tempdir().unwrap();
        let repo = crate::git::test_repo::init(tmp.path());
        let resolver = BranchResolver::new(GitClient::system());

        assert!(resolver.is_clean(&repo).await.unwrap());
        std::fs::write(repo.join("untracked.txt"), "x").unwrap();
        assert!(
            resolver.is_clean(&repo).await.unwrap(),
            "is_clean: untracked files should not make the tree dirty"
        );
        std::fs::write(repo.join("README.md"), "changed").unwrap();
        assert!(!resolver.is_clean(&repo).await.unwrap());
        crate::git::test_repo::git(&repo, &["checkout", "--", "README.md"]);

        resolver
            .checkout_new_branch(&repo, "proj/oslo", "main")
            .await
            .unwrap();
        assert_eq!(resolver.current_branch(&repo).await.unwrap(), "proj/oslo");
        resolver.checkout_branch(&repo, "main").await.unwrap();
        assert_eq!(resolver.current_branch(&repo).await.unwrap(), "main");

        let locals = resolver.local_branches(&repo).await.unwrap();
        assert!(locals.contains("main") && locals.contains("proj/oslo"));
        assert_eq!(
            resolver.newest_namespace_branch(&repo, "proj").await,
            Some("proj/oslo".to_string())
        );
        assert_eq!(resolver.newest_namespace_branch(&repo, "other").await, None);
    }
}

//! `WorkspaceManager` (C3): git-worktree-based isolated working copies.
//!
//! Grounded directly in `services/worktree_service.rs`: the same `git
//! worktree add`/`remove` and `git show-ref --verify --quiet` subcommands,
//! adapted to the `.kasmos/worktrees/instance-<id>` path convention with a
//! configurable branch prefix rather than per-task branch naming.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{instrument, warn};

use crate::domain::errors::{KasmosError, KasmosResult};
use crate::domain::ports::workspace::WorkspaceManager as WorkspaceManagerPort;

/// Git-worktree-backed `WorkspaceManager`.
pub struct GitWorkspaceManager {
    /// Root of the host repository this manager operates against.
    repo_root: PathBuf,
    /// Directory worktrees are created under, conventionally
    /// `<repo_root>/.kasmos/worktrees`.
    worktrees_dir: PathBuf,
}

impl GitWorkspaceManager {
    /// Construct a manager rooted at `repo_root`, using
    /// `<repo_root>/.kasmos/worktrees` for isolated checkouts.
    #[must_use]
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        let repo_root = repo_root.into();
        let worktrees_dir = repo_root.join(".kasmos").join("worktrees");
        Self { repo_root, worktrees_dir }
    }

    fn worktree_path_for(&self, branch: &str) -> PathBuf {
        self.worktrees_dir.join(sanitize_for_path(branch))
    }

    async fn run_git(&self, args: &[&str]) -> KasmosResult<std::process::Output> {
        Command::new("git")
            .current_dir(&self.repo_root)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|err| {
                if err.kind() == std::io::ErrorKind::NotFound {
                    KasmosError::BackendMissing("git binary not found".to_string())
                } else {
                    KasmosError::internal(err)
                }
            })
    }

    async fn branch_exists(&self, branch: &str) -> KasmosResult<bool> {
        let output = self.run_git(&["show-ref", "--verify", "--quiet", &format!("refs/heads/{branch}")]).await?;
        Ok(output.status.success())
    }

    async fn is_valid_worktree(&self, path: &Path) -> bool {
        if !path.is_dir() {
            return false;
        }
        Command::new("git")
            .current_dir(path)
            .args(["rev-parse", "--git-dir"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|status| status.success())
            .unwrap_or(false)
    }
}

fn sanitize_for_path(branch: &str) -> String {
    branch.replace('/', "-")
}

#[async_trait]
impl WorkspaceManagerPort for GitWorkspaceManager {
    #[instrument(skip(self))]
    async fn allocate(&self, branch: &str, base_commit: &str) -> KasmosResult<String> {
        let worktree_path = self.worktree_path_for(branch);

        if self.is_valid_worktree(&worktree_path).await {
            return Ok(worktree_path.display().to_string());
        }

        if let Some(parent) = worktree_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let path_str = worktree_path.display().to_string();
        let output = if self.branch_exists(branch).await? {
            self.run_git(&["worktree", "add", &path_str, branch]).await?
        } else {
            self.run_git(&["worktree", "add", "-b", branch, &path_str, base_commit]).await?
        };

        if !output.status.success() {
            return Err(KasmosError::Internal(format!(
                "git worktree add failed for branch {branch}: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(path_str)
    }

    #[instrument(skip(self))]
    async fn release(&self, workspace_path: &str) -> KasmosResult<()> {
        let output = self.run_git(&["worktree", "remove", workspace_path]).await?;
        if output.status.success() {
            return Ok(());
        }

        warn!(workspace_path, stderr = %String::from_utf8_lossy(&output.stderr), "worktree remove failed, retrying with --force");
        let forced = self.run_git(&["worktree", "remove", "--force", workspace_path]).await?;
        if forced.status.success() {
            return Ok(());
        }

        Err(KasmosError::Internal(format!(
            "git worktree remove --force failed for {workspace_path}: {}",
            String::from_utf8_lossy(&forced.stderr)
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitizes_slashes_in_branch_names_for_path_use() {
        assert_eq!(sanitize_for_path("ada/2026-02-21-alpha"), "ada-2026-02-21-alpha");
    }

    #[test]
    fn worktree_path_is_stable_for_the_same_branch() {
        let mgr = GitWorkspaceManager::new("/tmp/repo");
        let a = mgr.worktree_path_for("ada/alpha");
        let b = mgr.worktree_path_for("ada/alpha");
        assert_eq!(a, b);
    }
}

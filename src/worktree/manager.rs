//! WorktreeManager provisions and tears down per-run git worktrees.

use crate::error::{Result, RunnerError};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Manages the worktrees of in-flight runs.
///
/// Every run executes in `{base_path}/{run_id}`, a worktree of the
/// workspace repository checked out on the job's branch. Retries reuse the
/// run id, so a leftover directory from a crashed attempt is cleared before
/// provisioning.
///
/// A relative base path is resolved against the current directory once, at
/// construction: git runs inside the repository, so a relative path would
/// otherwise land under the repository instead.
#[derive(Debug, Clone)]
pub struct WorktreeManager {
    /// Directory holding all run worktrees
    base_path: PathBuf,
}

impl WorktreeManager {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        let base_path = base_path.into();
        Self {
            base_path: std::path::absolute(&base_path).unwrap_or(base_path),
        }
    }

    /// Get the worktree path for a run.
    pub fn path(&self, run_id: &str) -> PathBuf {
        self.base_path.join(run_id)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Check out `branch` of `repo` into a fresh worktree for `run_id`.
    ///
    /// Checks out the existing branch if there is one, otherwise creates
    /// `branch` from `base_branch`.
    pub async fn provision(&self, repo: &Path, run_id: &str, branch: &str, base_branch: &str) -> Result<PathBuf> {
        let worktree_path = self.path(run_id);

        tokio::fs::create_dir_all(&self.base_path)
            .await
            .map_err(|e| RunnerError::Worktree(format!("Failed to create base path: {}", e)))?;

        if worktree_path.exists() {
            log::warn!("Removing stale worktree {}", worktree_path.display());
            self.teardown(repo, &worktree_path).await?;
        }

        let existing = git(repo, |cmd| {
            cmd.args(["worktree", "add"]).arg(&worktree_path).arg(branch);
        })
        .await?;
        if existing.success {
            return Ok(worktree_path);
        }

        let created = git(repo, |cmd| {
            cmd.args(["worktree", "add", "-b", branch])
                .arg(&worktree_path)
                .arg(base_branch);
        })
        .await?;
        if !created.success {
            return Err(RunnerError::Worktree(format!(
                "Failed to create worktree for {} on {}: {} / {}",
                run_id,
                branch,
                existing.stderr.trim(),
                created.stderr.trim()
            )));
        }

        Ok(worktree_path)
    }

    /// Force-remove a run's worktree. Uncommitted changes are discarded.
    ///
    /// If git refuses, the directory is deleted directly and the repository's
    /// worktree list pruned, so no directory is left behind either way.
    pub async fn teardown(&self, repo: &Path, worktree_path: &Path) -> Result<()> {
        let removed = git(repo, |cmd| {
            cmd.args(["worktree", "remove"]).arg(worktree_path).arg("--force");
        })
        .await;

        match removed {
            Ok(out) if out.success => return Ok(()),
            Ok(out) => log::warn!(
                "git worktree remove {} failed: {}",
                worktree_path.display(),
                out.stderr.trim()
            ),
            Err(e) => log::warn!("git worktree remove {} failed: {}", worktree_path.display(), e),
        }

        if worktree_path.exists() {
            tokio::fs::remove_dir_all(worktree_path).await.map_err(|e| {
                RunnerError::Worktree(format!("Failed to remove worktree {}: {}", worktree_path.display(), e))
            })?;
        }
        git(repo, |cmd| {
            cmd.args(["worktree", "prune"]);
        })
        .await?;
        Ok(())
    }
}

struct GitOutput {
    success: bool,
    stderr: String,
}

async fn git(repo: &Path, build: impl FnOnce(&mut Command)) -> Result<GitOutput> {
    let mut cmd = Command::new("git");
    cmd.current_dir(repo);
    build(&mut cmd);

    let output = cmd
        .output()
        .await
        .map_err(|e| RunnerError::Worktree(format!("Failed to execute git: {}", e)))?;

    Ok(GitOutput {
        success: output.status.success(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{git as git_sync, setup_test_repo};

    #[test]
    fn test_path() {
        let manager = WorktreeManager::new("/tmp/artifacts/worktrees");
        assert_eq!(
            manager.path("run-123"),
            PathBuf::from("/tmp/artifacts/worktrees/run-123")
        );
    }

    #[tokio::test]
    async fn test_relative_base_path_resolves_against_cwd() {
        let (_temp, repo_path) = setup_test_repo();
        let scratch = tempfile::Builder::new().prefix("worktrees-rel").tempdir_in(".").unwrap();
        let relative = PathBuf::from(scratch.path().file_name().unwrap()).join("worktrees");
        let manager = WorktreeManager::new(&relative);
        assert!(manager.base_path().is_absolute());

        let path = manager.provision(&repo_path, "run-1", "b1", "main").await.unwrap();
        assert!(path.is_absolute());
        assert!(path.join("README.md").exists());
        assert_eq!(path, std::env::current_dir().unwrap().join(&relative).join("run-1"));
        assert!(!repo_path.join(&relative).exists());

        let out = crate::executor::process::shell("cat README.md", &path).await.unwrap();
        assert!(out.success());

        manager.teardown(&repo_path, &path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_provision_existing_branch() {
        let (temp, repo_path) = setup_test_repo();
        git_sync(&repo_path, &["branch", "feature"]);
        let manager = WorktreeManager::new(temp.path().join("worktrees"));

        let path = manager.provision(&repo_path, "run-1", "feature", "main").await.unwrap();
        assert_eq!(path, temp.path().join("worktrees").join("run-1"));
        assert!(path.join("README.md").exists());

        let head = git_sync(&path, &["rev-parse", "--abbrev-ref", "HEAD"]);
        assert_eq!(head.trim(), "feature");
    }

    #[tokio::test]
    async fn test_provision_creates_branch_from_base() {
        let (temp, repo_path) = setup_test_repo();
        let manager = WorktreeManager::new(temp.path().join("worktrees"));

        let path = manager.provision(&repo_path, "run-1", "bb/new", "main").await.unwrap();

        let head = git_sync(&path, &["rev-parse", "--abbrev-ref", "HEAD"]);
        assert_eq!(head.trim(), "bb/new");
        let branches = git_sync(&repo_path, &["branch", "--list", "bb/new"]);
        assert!(!branches.trim().is_empty());
    }

    #[tokio::test]
    async fn test_provision_missing_base_fails() {
        let (temp, repo_path) = setup_test_repo();
        let manager = WorktreeManager::new(temp.path().join("worktrees"));

        let result = manager.provision(&repo_path, "run-1", "bb/new", "no-such-base").await;
        assert!(matches!(result, Err(RunnerError::Worktree(_))));
    }

    #[tokio::test]
    async fn test_provision_not_a_repo_fails() {
        let temp = tempfile::TempDir::new().unwrap();
        let manager = WorktreeManager::new(temp.path().join("worktrees"));

        let result = manager.provision(temp.path(), "run-1", "b", "main").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_teardown_removes_dirty_worktree() {
        let (temp, repo_path) = setup_test_repo();
        let manager = WorktreeManager::new(temp.path().join("worktrees"));

        let path = manager.provision(&repo_path, "run-1", "bb/new", "main").await.unwrap();
        std::fs::write(path.join("scratch.txt"), "dirty").unwrap();

        manager.teardown(&repo_path, &path).await.unwrap();
        assert!(!path.exists());

        let list = git_sync(&repo_path, &["worktree", "list", "--porcelain"]);
        assert!(!list.contains("run-1"));
    }

    #[tokio::test]
    async fn test_teardown_of_unregistered_directory() {
        let (temp, repo_path) = setup_test_repo();
        let manager = WorktreeManager::new(temp.path().join("worktrees"));
        let stray = manager.path("run-1");
        std::fs::create_dir_all(stray.join("sub")).unwrap();

        manager.teardown(&repo_path, &stray).await.unwrap();
        assert!(!stray.exists());
    }

    #[tokio::test]
    async fn test_provision_replaces_stale_worktree() {
        let (temp, repo_path) = setup_test_repo();
        let manager = WorktreeManager::new(temp.path().join("worktrees"));

        let first = manager.provision(&repo_path, "run-1", "bb/new", "main").await.unwrap();
        std::fs::write(first.join("leftover.txt"), "from a crashed attempt").unwrap();

        let second = manager.provision(&repo_path, "run-1", "bb/new", "main").await.unwrap();
        assert_eq!(first, second);
        assert!(!second.join("leftover.txt").exists());
        assert!(second.join("README.md").exists());
    }
}

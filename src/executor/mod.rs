//! Mode execution.
//!
//! An executor turns a decoded [`JobPayload`] and a provisioned worktree into
//! an [`ExecOutcome`]. Step failures are classified into the outcome, never
//! returned as errors; the finisher alone decides what happens next.
//!
//! - VERIFY: run commands with `sh -c`, stop at the first non-zero exit
//! - CODE_CHANGE: `git apply` a unified diff, no commit
//! - SUBMIT: `git add -A`, `git commit`, `git push <remote> <branch>`

mod artifacts;
mod code_change;
pub mod process;
mod submit;
mod verify;

pub use artifacts::ArtifactWriter;

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use crate::domain::{ExecOutcome, JobPayload, ModeAction};

/// Runs one job's mode inside its worktree.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, run_id: &str, payload: &JobPayload, worktree: &Path) -> ExecOutcome;
}

/// The executor for the three built-in modes.
#[derive(Debug, Clone)]
pub struct ModeExecutor {
    artifacts_root: PathBuf,
}

impl ModeExecutor {
    pub fn new(artifacts_root: impl Into<PathBuf>) -> Self {
        Self {
            artifacts_root: artifacts_root.into(),
        }
    }
}

#[async_trait]
impl Executor for ModeExecutor {
    async fn execute(&self, run_id: &str, payload: &JobPayload, worktree: &Path) -> ExecOutcome {
        let artifacts = ArtifactWriter::new(&self.artifacts_root, run_id);
        log::debug!("Executing {} for {} in {}", payload.mode(), run_id, worktree.display());

        match &payload.action {
            ModeAction::Verify(spec) => verify::run(spec, worktree, &artifacts).await,
            ModeAction::CodeChange(spec) => code_change::run(spec, worktree, &artifacts).await,
            ModeAction::Submit(spec) => submit::run(spec, &payload.branch, worktree).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ArtifactKind, ErrorKind, RunStatus};
    use crate::testing::setup_test_repo;

    #[tokio::test]
    async fn test_dispatches_on_payload_mode() {
        let (temp, repo) = setup_test_repo();
        let executor = ModeExecutor::new(temp.path().join("artifacts"));

        let verify = JobPayload::decode(
            "VERIFY",
            r#"{"workspace":{"repo_path":"/r"},"branch":"b1","verify":{"commands":["echo ok"]}}"#,
        )
        .unwrap();
        let outcome = executor.execute("run-1", &verify, &repo).await;
        assert_eq!(outcome.status, RunStatus::Succeeded);
        assert!(outcome.artifact_kinds().contains(&ArtifactKind::Report));
        assert!(temp.path().join("artifacts/run-1/log.txt").exists());

        let code_change = JobPayload::decode(
            "CODE_CHANGE",
            r#"{"workspace":{"repo_path":"/r"},"branch":"b1","code_change":{"patch":"garbage"}}"#,
        )
        .unwrap();
        let outcome = executor.execute("run-2", &code_change, &repo).await;
        assert_eq!(outcome.error_kind, ErrorKind::CodeFailed);
    }
}

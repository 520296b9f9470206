//! JobRunner: the pipeline one claimed job goes through.
//!
//! decode -> provision -> execute -> finish -> report -> teardown.
//! Every failure before or during execution becomes an [`ExecOutcome`], so
//! the finisher sees every claimed job exactly once. The worktree is torn
//! down last, on every path that provisioned one.

use std::any::Any;
use std::path::PathBuf;
use std::sync::Arc;

use crate::domain::{ExecOutcome, Job, JobPayload};
use crate::executor::Executor;
use crate::reconciler::Finisher;
use crate::scheduler::LeaseKeeper;
use crate::store::{FinishRecord, JobStore};
use crate::worktree::WorktreeManager;

/// A worktree awaiting teardown.
struct Provisioned {
    repo: PathBuf,
    worktree: PathBuf,
}

/// Runs claimed jobs to completion.
pub struct JobRunner {
    store: Arc<JobStore>,
    worktrees: WorktreeManager,
    executor: Arc<dyn Executor>,
    finisher: Finisher,
    lease_keeper: Option<LeaseKeeper>,
}

impl JobRunner {
    pub fn new(store: Arc<JobStore>, worktrees: WorktreeManager, executor: Arc<dyn Executor>, finisher: Finisher) -> Self {
        Self {
            store,
            worktrees,
            executor,
            finisher,
            lease_keeper: None,
        }
    }

    /// Renew the job's lease while it executes.
    pub fn with_lease_keeper(mut self, keeper: LeaseKeeper) -> Self {
        self.lease_keeper = Some(keeper);
        self
    }

    /// Execute a claimed job and record its outcome.
    ///
    /// Returns `None` only when the outcome could not be persisted; the job
    /// then becomes claimable again once its lease expires.
    pub async fn run(&self, job: Job) -> Option<FinishRecord> {
        let lease = self.lease_keeper.as_ref().map(|keeper| keeper.keep(&job.id));
        let (outcome, provisioned) = self.execute(&job).await;
        drop(lease);

        let record = self.finish(&job, &outcome).await;

        if let Some(Provisioned { repo, worktree }) = provisioned
            && let Err(e) = self.worktrees.teardown(&repo, &worktree).await
        {
            tracing::warn!(run_id = %job.run_id, error = %e, "Worktree teardown failed");
        }
        record
    }

    async fn finish(&self, job: &Job, outcome: &ExecOutcome) -> Option<FinishRecord> {
        let finished = match self.finisher.finish(job, outcome) {
            Ok(finished) => finished,
            Err(e) => {
                tracing::error!(job_id = %job.id, run_id = %job.run_id, error = %e, "Failed to record outcome");
                return None;
            }
        };

        if let Err(e) = finished.report.await {
            log::warn!("Report task for {} did not complete: {}", job.run_id, e);
        }
        Some(finished.record)
    }

    async fn execute(&self, job: &Job) -> (ExecOutcome, Option<Provisioned>) {
        let payload = match JobPayload::decode(&job.mode, &job.payload_json) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("Job {} has an invalid payload: {}", job.id, e);
                return (ExecOutcome::infra(e.to_string()), None);
            }
        };

        let repo = payload.workspace.repo_path.clone();
        let worktree = match self
            .worktrees
            .provision(&repo, &job.run_id, &payload.branch, &payload.workspace.base_branch)
            .await
        {
            Ok(path) => path,
            Err(e) => return (ExecOutcome::infra(format!("git worktree add: {}", e)), None),
        };

        if let Err(e) = self
            .store
            .record_worktree(&job.run_id, &worktree.to_string_lossy(), &payload.branch)
        {
            log::warn!("Failed to record worktree for {}: {}", job.run_id, e);
        }

        let outcome = self.execute_isolated(&job.run_id, payload, worktree.clone()).await;
        (outcome, Some(Provisioned { repo, worktree }))
    }

    /// Run the executor on its own task so a panic cannot skip teardown.
    async fn execute_isolated(&self, run_id: &str, payload: JobPayload, worktree: PathBuf) -> ExecOutcome {
        let executor = self.executor.clone();
        let task_run_id = run_id.to_string();
        let task = tokio::spawn(async move { executor.execute(&task_run_id, &payload, &worktree).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) if e.is_panic() => {
                let message = panic_message(e.into_panic());
                tracing::error!(run_id = %run_id, panic = %message, "Executor panicked");
                ExecOutcome::infra(format!("executor panicked: {}", message))
            }
            Err(e) => ExecOutcome::infra(format!("executor task failed: {}", e)),
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Worker: the claim loop and its bounded execution pool.
//!
//! The loop acquires an execution slot, claims a job, and hands it to the
//! [`JobRunner`] on its own task. With every slot busy the loop waits for one
//! to free up instead of claiming work it cannot start.

use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Semaphore, watch};

use crate::domain::Job;
use crate::error::{Result, RunnerError};
use crate::runner::JobRunner;
use crate::store::JobStore;

/// Configuration for the Worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub worker_id: String,
    /// Jobs executing at once in this process
    pub max_concurrency: usize,
    pub lease: Duration,
    /// Sleep when no job is claimable
    pub poll_interval: Duration,
    /// Sleep after a failed claim transaction
    pub claim_error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            worker_id: "runner-1".to_string(),
            max_concurrency: 1,
            lease: Duration::from_secs(600),
            poll_interval: Duration::from_secs(2),
            claim_error_backoff: Duration::from_secs(5),
        }
    }
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub claimed: u64,
    pub claim_errors: u64,
}

/// Worker polls the job store and dispatches claimed jobs.
pub struct Worker {
    config: WorkerConfig,
    store: Arc<JobStore>,
    runner: Arc<JobRunner>,
    slots: Arc<Semaphore>,
    last_heartbeat: Option<Instant>,
}

impl Worker {
    pub fn new(config: WorkerConfig, store: Arc<JobStore>, runner: Arc<JobRunner>) -> Self {
        let slots = Arc::new(Semaphore::new(config.max_concurrency.max(1)));
        Self {
            config,
            store,
            runner,
            slots,
            last_heartbeat: None,
        }
    }

    /// Run the claim loop until `shutdown` flips to true, then drain.
    ///
    /// In-flight executions are never cancelled; this returns once the last
    /// of them has finished.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> Result<WorkerStats> {
        let mut stats = WorkerStats::default();
        tracing::info!(
            worker = %self.config.worker_id,
            max_concurrency = self.config.max_concurrency,
            lease_secs = self.config.lease.as_secs(),
            "Worker started"
        );

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            self.heartbeat();

            let permit = tokio::select! {
                permit = self.slots.clone().acquire_owned() => permit
                    .map_err(|_| RunnerError::InvalidState("execution pool closed".to_string()))?,
                _ = shutdown.changed() => break,
            };

            match self.store.claim(&self.config.worker_id, self.config.lease) {
                Ok(Some(job)) => {
                    stats.claimed += 1;
                    log_claim(&job, &self.config.worker_id);
                    let runner = self.runner.clone();
                    tokio::spawn(async move {
                        runner.run(job).await;
                        drop(permit);
                    });
                }
                Ok(None) => {
                    drop(permit);
                    if pause(self.config.poll_interval, &mut shutdown).await {
                        break;
                    }
                }
                Err(e) => {
                    drop(permit);
                    stats.claim_errors += 1;
                    log::error!("Claim failed: {}", e);
                    if pause(self.config.claim_error_backoff, &mut shutdown).await {
                        break;
                    }
                }
            }
        }

        tracing::info!(worker = %self.config.worker_id, "Stopped claiming, draining in-flight jobs");
        self.drain().await?;
        tracing::info!(worker = %self.config.worker_id, claimed = stats.claimed, "Worker stopped");
        Ok(stats)
    }

    /// Claim at most one job and run it to completion.
    ///
    /// Returns the run id of the executed job, if there was one.
    pub async fn run_once(&mut self) -> Result<Option<String>> {
        self.heartbeat();
        let Some(job) = self.store.claim(&self.config.worker_id, self.config.lease)? else {
            return Ok(None);
        };
        log_claim(&job, &self.config.worker_id);
        let run_id = job.run_id.clone();
        self.runner.run(job).await;
        Ok(Some(run_id))
    }

    /// Wait until every execution slot is free again.
    async fn drain(&self) -> Result<()> {
        let all = u32::try_from(self.config.max_concurrency.max(1))
            .map_err(|_| RunnerError::Config("max_concurrency out of range".to_string()))?;
        let _all = self
            .slots
            .acquire_many(all)
            .await
            .map_err(|_| RunnerError::InvalidState("execution pool closed".to_string()))?;
        Ok(())
    }

    /// Upsert the runner heartbeat, at most once per poll interval.
    fn heartbeat(&mut self) {
        if self
            .last_heartbeat
            .is_some_and(|at| at.elapsed() < self.config.poll_interval)
        {
            return;
        }
        match self.store.heartbeat(&self.config.worker_id, Utc::now()) {
            Ok(()) => self.last_heartbeat = Some(Instant::now()),
            Err(e) => log::warn!("Heartbeat failed: {}", e),
        }
    }
}

fn log_claim(job: &Job, worker_id: &str) {
    tracing::info!(
        job_id = %job.id,
        run_id = %job.run_id,
        mode = %job.mode,
        attempt = job.attempts,
        max_attempts = job.max_attempts,
        worker = %worker_id,
        "Claimed job"
    );
}

/// Sleep for `duration`; true if shutdown was requested meanwhile.
async fn pause(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ExecOutcome, JobPayload, JobStatus, Mode};
    use crate::executor::Executor;
    use crate::reconciler::{Finisher, OutcomeReport, Reporter};
    use crate::scheduler::BackoffPolicy;
    use crate::store::NewJob;
    use crate::testing::setup_test_repo;
    use crate::worktree::WorktreeManager;
    use async_trait::async_trait;
    use std::path::{Path, PathBuf};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    struct NullReporter;

    #[async_trait]
    impl Reporter for NullReporter {
        async fn report(&self, _report: &OutcomeReport) -> Result<()> {
            Ok(())
        }
    }

    /// Tracks how many executions overlap.
    #[derive(Default)]
    struct SlowExecutor {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Executor for SlowExecutor {
        async fn execute(&self, _run_id: &str, _payload: &JobPayload, _worktree: &Path) -> ExecOutcome {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(150)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            ExecOutcome::succeeded("ok", Vec::new())
        }
    }

    struct Fixture {
        _temp: TempDir,
        repo: PathBuf,
        artifacts: PathBuf,
        db: PathBuf,
        store: Arc<JobStore>,
    }

    impl Fixture {
        fn new() -> Self {
            let (temp, repo) = setup_test_repo();
            let artifacts = temp.path().join("artifacts");
            let db = temp.path().join("runner.db");
            let store = Arc::new(JobStore::open(&db).unwrap());
            Self {
                _temp: temp,
                repo,
                artifacts,
                db,
                store,
            }
        }

        /// Rename the jobs table from a second connection.
        fn rename_jobs(&self, from: &str, to: &str) {
            let conn = rusqlite::Connection::open(&self.db).unwrap();
            conn.execute_batch(&format!("ALTER TABLE {} RENAME TO {}", from, to))
                .unwrap();
        }

        fn enqueue(&self, n: usize) {
            for i in 0..n {
                let payload = serde_json::json!({
                    "workspace": {"repo_path": self.repo},
                    "branch": format!("b{}", i),
                    "verify": {"commands": ["true"]},
                });
                self.store
                    .enqueue(&NewJob::new("task-1", "ws-1", Mode::Verify, payload.to_string()))
                    .unwrap();
            }
        }

        fn worker(&self, max_concurrency: usize, executor: Arc<dyn Executor>) -> Worker {
            let config = WorkerConfig {
                worker_id: "w1".to_string(),
                max_concurrency,
                poll_interval: Duration::from_millis(20),
                claim_error_backoff: Duration::from_millis(20),
                ..Default::default()
            };
            let finisher = Finisher::new(self.store.clone(), BackoffPolicy::default(), Arc::new(NullReporter), "w1");
            let runner = JobRunner::new(
                self.store.clone(),
                WorktreeManager::new(self.artifacts.join("worktrees")),
                executor,
                finisher,
            );
            Worker::new(config, self.store.clone(), Arc::new(runner))
        }

        fn count_raw(&self, table: &str) -> usize {
            let conn = rusqlite::Connection::open(&self.db).unwrap();
            conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get::<_, i64>(0))
                .unwrap() as usize
        }

        fn count(&self, status: JobStatus) -> usize {
            self.store.list_jobs(Some(status)).unwrap().len()
        }
    }

    async fn wait_for(mut done: impl FnMut() -> bool) {
        for _ in 0..200 {
            if done() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let fixture = Fixture::new();
        fixture.enqueue(5);
        let executor = Arc::new(SlowExecutor::default());
        let mut worker = fixture.worker(2, executor.clone());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });

        wait_for(|| fixture.count(JobStatus::Succeeded) == 5).await;
        tx.send(true).unwrap();
        let stats = handle.await.unwrap().unwrap();

        assert_eq!(stats.claimed, 5);
        let peak = executor.peak.load(Ordering::SeqCst);
        assert!((1..=2).contains(&peak), "peak concurrency {}", peak);
    }

    #[tokio::test]
    async fn test_shutdown_drains_in_flight_jobs() {
        let fixture = Fixture::new();
        fixture.enqueue(1);
        let executor = Arc::new(SlowExecutor::default());
        let mut worker = fixture.worker(1, executor.clone());

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });

        wait_for(|| executor.running.load(Ordering::SeqCst) == 1).await;
        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();

        // run() returned only after the job finished.
        assert_eq!(fixture.count(JobStatus::Succeeded), 1);
        assert_eq!(fixture.count(JobStatus::Running), 0);
    }

    #[tokio::test]
    async fn test_idle_worker_stops_on_shutdown_and_heartbeats() {
        let fixture = Fixture::new();
        let mut worker = fixture.worker(1, Arc::new(SlowExecutor::default()));

        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });
        wait_for(|| fixture.store.last_heartbeat("w1").unwrap().is_some()).await;

        tx.send(true).unwrap();
        let stats = handle.await.unwrap().unwrap();
        assert_eq!(stats.claimed, 0);
    }

    #[tokio::test]
    async fn test_claim_errors_back_off_and_recover() {
        let fixture = Fixture::new();
        fixture.enqueue(1);
        fixture.rename_jobs("jobs", "jobs_parked");

        let mut worker = fixture.worker(1, Arc::new(SlowExecutor::default()));
        worker.config.claim_error_backoff = Duration::from_millis(100);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { worker.run(rx).await });

        // Every claim fails while the table is missing.
        tokio::time::sleep(Duration::from_millis(350)).await;
        assert_eq!(fixture.count_raw("jobs_parked"), 1);
        fixture.rename_jobs("jobs_parked", "jobs");

        wait_for(|| fixture.count(JobStatus::Succeeded) == 1).await;
        tx.send(true).unwrap();
        let stats = handle.await.unwrap().unwrap();

        assert_eq!(stats.claimed, 1);
        // 350ms at a 100ms backoff allows at most four failed claims.
        assert!(
            (1..=5).contains(&stats.claim_errors),
            "claim errors {}",
            stats.claim_errors
        );
    }

    #[tokio::test]
    async fn test_run_once() {
        let fixture = Fixture::new();
        fixture.enqueue(2);
        let mut worker = fixture.worker(1, Arc::new(SlowExecutor::default()));

        let first = worker.run_once().await.unwrap();
        assert!(first.is_some());
        assert_eq!(fixture.count(JobStatus::Succeeded), 1);
        assert_eq!(fixture.count(JobStatus::Queued), 1);

        worker.run_once().await.unwrap().unwrap();
        assert!(worker.run_once().await.unwrap().is_none());
    }
}

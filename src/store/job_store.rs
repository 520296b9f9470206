//! JobStore implementation over SQLite.
//!
//! The store is the only synchronization point between workers. Claim and
//! finish each run in a single `BEGIN IMMEDIATE` transaction, so the
//! select-then-update of a claim is indivisible across processes sharing the
//! database file, and no other claimer ever observes a half-written finish.

use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::domain::{Artifact, Disposition, ExecOutcome, Job, JobStatus, Mode, Run, Task, Workspace};
use crate::error::{Result, RunnerError};
use crate::id::{generate_artifact_id, generate_job_id, generate_run_id, generate_task_id, generate_workspace_id};
use crate::store::schema::init_schema;
use crate::store::timestamp;

/// How long a connection waits on a locked database before giving up.
const BUSY_TIMEOUT: Duration = Duration::from_secs(10);

const JOB_COLUMNS: &str = "id, run_id, task_id, workspace_id, mode, payload_json, status, priority, \
     available_at, attempts, max_attempts, locked_by, locked_until, last_error, created_at";

const RUN_COLUMNS: &str = "id, task_id, mode, status, worktree_path, branch_name, error_kind, \
     error_message, started_at, finished_at, created_at";

const ARTIFACT_COLUMNS: &str = "id, run_id, type, uri, created_at";

/// Claim predicate. `?1` is the current time.
///
/// Queued jobs must be due and unleased; running jobs qualify once their
/// lease has lapsed (the owning worker stopped renewing or died).
const CLAIMABLE: &str = "(status = 'queued' AND available_at <= ?1 \
       AND (locked_until IS NULL OR locked_until < ?1)) \
     OR (status = 'running' AND locked_until IS NOT NULL AND locked_until < ?1)";

/// Serving order: highest priority first, then oldest.
const SERVE_ORDER: &str = "priority DESC, created_at ASC, rowid ASC";

/// Parameters for a new Run+Job pair.
#[derive(Debug, Clone)]
pub struct NewJob {
    pub task_id: String,
    pub workspace_id: String,
    /// Normally a [`Mode`] spelling; kept as text because other writers share the table
    pub mode: String,
    pub payload_json: String,
    pub priority: i64,
    pub max_attempts: u32,
    /// Defaults to the enqueue time
    pub available_at: Option<DateTime<Utc>>,
}

impl NewJob {
    pub fn new(task_id: impl Into<String>, workspace_id: impl Into<String>, mode: Mode, payload_json: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            workspace_id: workspace_id.into(),
            mode: mode.as_str().to_string(),
            payload_json: payload_json.into(),
            priority: 0,
            max_attempts: 3,
            available_at: None,
        }
    }

    pub fn with_priority(mut self, priority: i64) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_available_at(mut self, available_at: DateTime<Utc>) -> Self {
        self.available_at = Some(available_at);
        self
    }
}

/// Ids of a freshly enqueued pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enqueued {
    pub run_id: String,
    pub job_id: String,
}

/// What the finish transaction wrote.
#[derive(Debug, Clone)]
pub struct FinishRecord {
    pub disposition: Disposition,
    /// Attempt counter as re-read inside the transaction
    pub attempts: u32,
    pub max_attempts: u32,
    /// `locked_by` no longer named the finishing worker
    pub lease_lost: bool,
    pub artifacts: Vec<Artifact>,
}

/// JobStore holds the SQLite connection shared by the claimer and finisher.
pub struct JobStore {
    db: Mutex<Connection>,
}

impl JobStore {
    /// Open or create the store at `path`, creating parent directories.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }

        let db = Connection::open(path)?;
        db.busy_timeout(BUSY_TIMEOUT)?;
        // WAL lets readers proceed while a claimer holds the write lock.
        let _mode: String = db.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        init_schema(&db)?;

        Ok(Self { db: Mutex::new(db) })
    }

    /// Open a private in-memory store.
    pub fn open_in_memory() -> Result<Self> {
        let db = Connection::open_in_memory()?;
        init_schema(&db)?;
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db
            .lock()
            .map_err(|_| RunnerError::InvalidState("job store lock poisoned".to_string()))
    }

    /// Register a workspace.
    pub fn create_workspace(&self, name: &str, repo_path: &str, default_branch: &str) -> Result<Workspace> {
        let now = timestamp::format(Utc::now());
        let workspace = Workspace {
            id: generate_workspace_id(),
            name: name.to_string(),
            repo_path: repo_path.to_string(),
            default_branch: default_branch.to_string(),
        };
        self.conn()?.execute(
            "INSERT INTO workspaces (id, name, repo_path, default_branch, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![workspace.id, workspace.name, workspace.repo_path, workspace.default_branch, now],
        )?;
        Ok(workspace)
    }

    /// Register a task in its initial `plan` state.
    pub fn create_task(&self, workspace_id: &str, title: &str, description: &str) -> Result<Task> {
        let now = timestamp::format(Utc::now());
        let task = Task {
            id: generate_task_id(),
            workspace_id: workspace_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            status: "plan".to_string(),
            plan_round: 0,
            fix_round: 0,
            submit_state: "not_submitted".to_string(),
        };
        self.conn()?.execute(
            "INSERT INTO tasks (id, workspace_id, title, description, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![task.id, task.workspace_id, task.title, task.description, now],
        )?;
        Ok(task)
    }

    /// Create a queued run and its job in one transaction.
    pub fn enqueue(&self, new_job: &NewJob) -> Result<Enqueued> {
        self.enqueue_at(new_job, Utc::now())
    }

    pub fn enqueue_at(&self, new_job: &NewJob, now: DateTime<Utc>) -> Result<Enqueued> {
        let ids = Enqueued {
            run_id: generate_run_id(),
            job_id: generate_job_id(),
        };
        let now_s = timestamp::format(now);
        let available_s = timestamp::format(new_job.available_at.unwrap_or(now));

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        tx.execute(
            "INSERT INTO runs (id, task_id, mode, status, created_at, updated_at) \
             VALUES (?1, ?2, ?3, 'queued', ?4, ?4)",
            params![ids.run_id, new_job.task_id, new_job.mode, now_s],
        )?;
        tx.execute(
            "INSERT INTO jobs (id, run_id, task_id, workspace_id, mode, payload_json, status, priority, \
             available_at, max_attempts, created_at, updated_at) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'queued', ?7, ?8, ?9, ?10, ?10)",
            params![
                ids.job_id,
                ids.run_id,
                new_job.task_id,
                new_job.workspace_id,
                new_job.mode,
                new_job.payload_json,
                new_job.priority,
                available_s,
                new_job.max_attempts,
                now_s,
            ],
        )?;
        tx.commit()?;

        Ok(ids)
    }

    /// Claim the next eligible job for `worker_id`, leasing it for `lease`.
    ///
    /// Returns `Ok(None)` only when no job is eligible; store failures are
    /// errors and leave nothing claimed.
    pub fn claim(&self, worker_id: &str, lease: Duration) -> Result<Option<Job>> {
        self.claim_at(worker_id, lease, Utc::now())
    }

    pub fn claim_at(&self, worker_id: &str, lease: Duration, now: DateTime<Utc>) -> Result<Option<Job>> {
        let locked_until = now + to_chrono(lease)?;
        let now_s = timestamp::format(now);
        let until_s = timestamp::format(locked_until);

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidate = tx
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE {CLAIMABLE} ORDER BY {SERVE_ORDER} LIMIT 1"),
                params![now_s],
                row_to_job,
            )
            .optional()?;

        // Dropping the transaction rolls it back; nothing was written.
        let Some(mut job) = candidate else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE jobs SET status = 'running', locked_by = ?1, locked_until = ?2, \
             attempts = attempts + 1, updated_at = ?3 WHERE id = ?4",
            params![worker_id, until_s, now_s, job.id],
        )?;
        tx.execute(
            "UPDATE runs SET status = 'running', started_at = ?1, updated_at = ?1 WHERE id = ?2",
            params![now_s, job.run_id],
        )?;
        tx.commit()?;

        job.status = JobStatus::Running;
        job.locked_by = Some(worker_id.to_string());
        job.locked_until = Some(locked_until);
        job.attempts += 1;
        Ok(Some(job))
    }

    /// Extend the lease of a job this worker still owns.
    ///
    /// Returns false when the job is no longer running under `worker_id`.
    pub fn renew_lease(&self, job_id: &str, worker_id: &str, lease: Duration, now: DateTime<Utc>) -> Result<bool> {
        let until_s = timestamp::format(now + to_chrono(lease)?);
        let changed = self.conn()?.execute(
            "UPDATE jobs SET locked_until = ?1, updated_at = ?2 \
             WHERE id = ?3 AND locked_by = ?4 AND status = 'running'",
            params![until_s, timestamp::format(now), job_id, worker_id],
        )?;
        Ok(changed == 1)
    }

    /// Record where a run's worktree lives once it has been provisioned.
    pub fn record_worktree(&self, run_id: &str, worktree_path: &str, branch_name: &str) -> Result<()> {
        self.conn()?.execute(
            "UPDATE runs SET worktree_path = ?1, branch_name = ?2, updated_at = ?3 WHERE id = ?4",
            params![worktree_path, branch_name, timestamp::format(Utc::now()), run_id],
        )?;
        Ok(())
    }

    /// Persist an execution outcome and settle the job, atomically.
    ///
    /// Artifacts are inserted, the run is finalized, the job's attempt
    /// counters are re-read and `decide(attempts, max_attempts)` picks the
    /// job's disposition, all inside one transaction.
    pub fn finish_at<F>(
        &self,
        job: &Job,
        worker_id: &str,
        outcome: &ExecOutcome,
        now: DateTime<Utc>,
        decide: F,
    ) -> Result<FinishRecord>
    where
        F: FnOnce(u32, u32) -> Disposition,
    {
        let now_s = timestamp::format(now);

        let mut conn = self.conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let mut artifacts = Vec::with_capacity(outcome.artifacts.len());
        for artifact_ref in &outcome.artifacts {
            let artifact = Artifact {
                id: generate_artifact_id(),
                run_id: job.run_id.clone(),
                artifact_type: artifact_ref.kind.as_str().to_string(),
                uri: artifact_ref.uri.clone(),
                created_at: now,
            };
            tx.execute(
                "INSERT INTO artifacts (id, run_id, type, uri, created_at) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![artifact.id, artifact.run_id, artifact.artifact_type, artifact.uri, now_s],
            )?;
            artifacts.push(artifact);
        }

        tx.execute(
            "UPDATE runs SET status = ?1, error_kind = ?2, error_message = ?3, finished_at = ?4, updated_at = ?4 \
             WHERE id = ?5",
            params![
                outcome.status.as_str(),
                outcome.error_kind.as_str(),
                outcome.summary,
                now_s,
                job.run_id
            ],
        )?;

        let (attempts, max_attempts, locked_by): (u32, u32, Option<String>) = tx
            .query_row(
                "SELECT attempts, max_attempts, locked_by FROM jobs WHERE id = ?1",
                params![job.id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?
            .ok_or_else(|| RunnerError::JobNotFound(job.id.clone()))?;

        let disposition = decide(attempts, max_attempts);
        let last_error = (!outcome.is_success()).then_some(outcome.summary.as_str());

        match disposition {
            Disposition::Requeue { available_at } => {
                tx.execute(
                    "UPDATE jobs SET status = 'queued', locked_until = NULL, last_error = ?1, \
                     available_at = ?2, updated_at = ?3 WHERE id = ?4",
                    params![last_error, timestamp::format(available_at), now_s, job.id],
                )?;
            }
            Disposition::Terminal(status) => {
                tx.execute(
                    "UPDATE jobs SET status = ?1, locked_until = NULL, \
                     last_error = COALESCE(?2, last_error), updated_at = ?3 WHERE id = ?4",
                    params![status.as_str(), last_error, now_s, job.id],
                )?;
            }
        }
        tx.commit()?;

        Ok(FinishRecord {
            disposition,
            attempts,
            max_attempts,
            lease_lost: locked_by.as_deref() != Some(worker_id),
            artifacts,
        })
    }

    /// Upsert this runner's heartbeat.
    pub fn heartbeat(&self, runner_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.conn()?.execute(
            "INSERT INTO runners (id, last_heartbeat) VALUES (?1, ?2) \
             ON CONFLICT(id) DO UPDATE SET last_heartbeat = excluded.last_heartbeat",
            params![runner_id, timestamp::format(now)],
        )?;
        Ok(())
    }

    pub fn last_heartbeat(&self, runner_id: &str) -> Result<Option<DateTime<Utc>>> {
        let raw: Option<Option<String>> = self
            .conn()?
            .query_row(
                "SELECT last_heartbeat FROM runners WHERE id = ?1",
                params![runner_id],
                |row| row.get(0),
            )
            .optional()?;
        match raw.flatten() {
            Some(s) => timestamp::parse(&s)
                .map(Some)
                .map_err(|e| RunnerError::InvalidState(format!("bad heartbeat timestamp {}: {}", s, e))),
            None => Ok(None),
        }
    }

    pub fn get_job(&self, job_id: &str) -> Result<Option<Job>> {
        let conn = self.conn()?;
        let job = conn
            .query_row(
                &format!("SELECT {JOB_COLUMNS} FROM jobs WHERE id = ?1"),
                params![job_id],
                row_to_job,
            )
            .optional()?;
        Ok(job)
    }

    pub fn get_run(&self, run_id: &str) -> Result<Option<Run>> {
        let conn = self.conn()?;
        let run = conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM runs WHERE id = ?1"),
                params![run_id],
                row_to_run,
            )
            .optional()?;
        Ok(run)
    }

    pub fn jobs_for_run(&self, run_id: &str) -> Result<Vec<Job>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {JOB_COLUMNS} FROM jobs WHERE run_id = ?1 ORDER BY created_at ASC"
        ))?;
        let jobs = stmt
            .query_map(params![run_id], row_to_job)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(jobs)
    }

    pub fn artifacts_for_run(&self, run_id: &str) -> Result<Vec<Artifact>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {ARTIFACT_COLUMNS} FROM artifacts WHERE run_id = ?1 ORDER BY created_at ASC, rowid ASC"
        ))?;
        let artifacts = stmt
            .query_map(params![run_id], row_to_artifact)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(artifacts)
    }

    /// Jobs in the order the claimer serves them, optionally filtered by status.
    pub fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
        let conn = self.conn()?;
        let jobs = match status {
            Some(status) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {JOB_COLUMNS} FROM jobs WHERE status = ?1 ORDER BY {SERVE_ORDER}"
                ))?;
                stmt.query_map(params![status.as_str()], row_to_job)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!("SELECT {JOB_COLUMNS} FROM jobs ORDER BY {SERVE_ORDER}"))?;
                stmt.query_map([], row_to_job)?
                    .collect::<rusqlite::Result<Vec<_>>>()?
            }
        };
        Ok(jobs)
    }
}

fn to_chrono(duration: Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(duration)
        .map_err(|e| RunnerError::InvalidState(format!("lease duration out of range: {}", e)))
}

fn conversion_error(idx: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, message.into())
}

fn parse_col<T>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    let raw: String = row.get(idx)?;
    raw.parse::<T>().map_err(|e| conversion_error(idx, e.to_string()))
}

fn ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    timestamp::parse(&raw).map_err(|e| conversion_error(idx, format!("{}: {}", raw, e)))
}

fn opt_ts_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(s) if !s.is_empty() => timestamp::parse(&s)
            .map(Some)
            .map_err(|e| conversion_error(idx, format!("{}: {}", s, e))),
        _ => Ok(None),
    }
}

fn row_to_job(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        run_id: row.get(1)?,
        task_id: row.get(2)?,
        workspace_id: row.get(3)?,
        mode: row.get(4)?,
        payload_json: row.get(5)?,
        status: parse_col(row, 6)?,
        priority: row.get(7)?,
        available_at: ts_col(row, 8)?,
        attempts: row.get(9)?,
        max_attempts: row.get(10)?,
        locked_by: row.get(11)?,
        locked_until: opt_ts_col(row, 12)?,
        last_error: row.get(13)?,
        created_at: ts_col(row, 14)?,
    })
}

fn row_to_run(row: &Row<'_>) -> rusqlite::Result<Run> {
    Ok(Run {
        id: row.get(0)?,
        task_id: row.get(1)?,
        mode: row.get(2)?,
        status: parse_col(row, 3)?,
        worktree_path: row.get(4)?,
        branch_name: row.get(5)?,
        error_kind: parse_col(row, 6)?,
        error_message: row.get(7)?,
        started_at: opt_ts_col(row, 8)?,
        finished_at: opt_ts_col(row, 9)?,
        created_at: ts_col(row, 10)?,
    })
}

fn row_to_artifact(row: &Row<'_>) -> rusqlite::Result<Artifact> {
    Ok(Artifact {
        id: row.get(0)?,
        run_id: row.get(1)?,
        artifact_type: row.get(2)?,
        uri: row.get(3)?,
        created_at: ts_col(row, 4)?,
    })
}

//! Finisher: persist an outcome, settle the job, fire the report.

use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::report::{OutcomeReport, Reporter};
use crate::domain::{Disposition, ExecOutcome, Job};
use crate::error::Result;
use crate::scheduler::BackoffPolicy;
use crate::store::{FinishRecord, JobStore};

/// A recorded finish and its in-flight report delivery.
#[derive(Debug)]
pub struct Finished {
    pub record: FinishRecord,
    /// Resolves when delivery succeeded or was given up on
    pub report: JoinHandle<()>,
}

/// Finisher is the single place that decides retry versus terminal.
pub struct Finisher {
    store: Arc<JobStore>,
    backoff: BackoffPolicy,
    reporter: Arc<dyn Reporter>,
    worker_id: String,
}

impl Finisher {
    pub fn new(store: Arc<JobStore>, backoff: BackoffPolicy, reporter: Arc<dyn Reporter>, worker_id: impl Into<String>) -> Self {
        Self {
            store,
            backoff,
            reporter,
            worker_id: worker_id.into(),
        }
    }

    /// Record `outcome` for `job` and start reporting it.
    ///
    /// Must be called from within a tokio runtime. The report is only sent
    /// once the outcome is durable.
    pub fn finish(&self, job: &Job, outcome: &ExecOutcome) -> Result<Finished> {
        let now = Utc::now();
        let backoff = self.backoff;
        let record = self.store.finish_at(job, &self.worker_id, outcome, now, |attempts, max_attempts| {
            backoff.decide(outcome, attempts, max_attempts, now)
        })?;

        if record.lease_lost {
            tracing::warn!(
                job_id = %job.id,
                worker = %self.worker_id,
                "Lease was taken over by another worker; recording outcome anyway"
            );
        }

        match record.disposition {
            Disposition::Requeue { available_at } => tracing::info!(
                job_id = %job.id,
                run_id = %job.run_id,
                attempts = record.attempts,
                max_attempts = record.max_attempts,
                available_at = %available_at,
                error_kind = %outcome.error_kind,
                "Job requeued"
            ),
            Disposition::Terminal(status) => tracing::info!(
                job_id = %job.id,
                run_id = %job.run_id,
                attempts = record.attempts,
                status = %status,
                error_kind = %outcome.error_kind,
                "Job finished"
            ),
        }

        let report = OutcomeReport::new(&job.run_id, outcome);
        let reporter = self.reporter.clone();
        let handle = tokio::spawn(async move { deliver(reporter.as_ref(), &report).await });

        Ok(Finished { record, report: handle })
    }
}

async fn deliver(reporter: &dyn Reporter, report: &OutcomeReport) {
    match reporter.report(report).await {
        Ok(()) => tracing::debug!(run_id = %report.run_id, "Outcome reported"),
        Err(e) => tracing::warn!(run_id = %report.run_id, error = %e, "Outcome report failed"),
    }
}

//! Periodic lease renewal for executing jobs.

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::store::JobStore;

/// Renews leases of jobs this worker is executing.
///
/// A renewal fires every third of the lease, so two consecutive misses still
/// leave the lease valid. Renewal stops on its own once the job is no longer
/// running under this worker.
#[derive(Clone)]
pub struct LeaseKeeper {
    store: Arc<JobStore>,
    worker_id: String,
    lease: Duration,
}

impl LeaseKeeper {
    pub fn new(store: Arc<JobStore>, worker_id: impl Into<String>, lease: Duration) -> Self {
        Self {
            store,
            worker_id: worker_id.into(),
            lease,
        }
    }

    pub fn interval(&self) -> Duration {
        (self.lease / 3).max(Duration::from_millis(10))
    }

    /// Start renewing `job_id`'s lease until the returned guard is dropped.
    pub fn keep(&self, job_id: &str) -> LeaseGuard {
        let keeper = self.clone();
        let job_id = job_id.to_string();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(keeper.interval());
            // The first tick completes immediately; the claim just set the lease.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match keeper
                    .store
                    .renew_lease(&job_id, &keeper.worker_id, keeper.lease, Utc::now())
                {
                    Ok(true) => tracing::debug!(job_id = %job_id, "Lease renewed"),
                    Ok(false) => {
                        tracing::warn!(job_id = %job_id, worker = %keeper.worker_id, "Lease no longer held, stopping renewal");
                        break;
                    }
                    Err(e) => tracing::warn!(job_id = %job_id, error = %e, "Lease renewal failed"),
                }
            }
        });

        LeaseGuard { handle }
    }
}

/// Stops renewal when dropped.
#[derive(Debug)]
pub struct LeaseGuard {
    handle: JoinHandle<()>,
}

impl LeaseGuard {
    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

//! Linear retry backoff.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::domain::{Disposition, ExecOutcome, JobStatus};
use crate::store::timestamp;

/// Retry policy: a job failing on attempt `k` waits `base * k`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    base: Duration,
}

impl BackoffPolicy {
    pub fn new(base: Duration) -> Self {
        Self { base }
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    /// Delay after the `attempts`-th failed attempt.
    pub fn delay(&self, attempts: u32) -> Duration {
        self.base.saturating_mul(attempts)
    }

    /// Saturates at [`timestamp::latest`] so the job stays parked.
    pub fn next_available_at(&self, attempts: u32, now: DateTime<Utc>) -> DateTime<Utc> {
        chrono::Duration::from_std(self.delay(attempts))
            .ok()
            .and_then(|delay| now.checked_add_signed(delay))
            .map_or_else(timestamp::latest, |at| at.min(timestamp::latest()))
    }

    /// Requeue a failure while attempts remain; otherwise settle on the outcome.
    pub fn decide(&self, outcome: &ExecOutcome, attempts: u32, max_attempts: u32, now: DateTime<Utc>) -> Disposition {
        if outcome.is_success() {
            return Disposition::Terminal(JobStatus::Succeeded);
        }
        if attempts < max_attempts {
            Disposition::Requeue {
                available_at: self.next_available_at(attempts, now),
            }
        } else {
            Disposition::Terminal(JobStatus::Failed)
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

//! Reconciliation of execution outcomes.
//!
//! The [`Finisher`] writes an outcome to the job store in one transaction,
//! applies the retry policy, and hands the outcome to a [`Reporter`] for
//! best-effort delivery to the control plane.

mod finisher;
mod report;

pub use finisher::{Finished, Finisher};
pub use report::{HttpReporter, OutcomeReport, REPORT_PATH, Reporter};

//! bb-runner - leases queued jobs from SQLite and runs them in git worktrees
//!
//! A worker claims jobs under a time-bounded lease, provisions a worktree on
//! the job's branch, runs the mode's executor (VERIFY, CODE_CHANGE or SUBMIT),
//! persists the outcome with linear retry backoff, and reports the result to
//! the control plane.

pub mod domain;
pub mod error;
pub mod executor;
pub mod id;
pub mod reconciler;
pub mod runner;
pub mod scheduler;
pub mod store;
pub mod worktree;

#[cfg(test)]
mod testing;

pub use error::{Result, RunnerError};

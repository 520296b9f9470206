//! Scheduling: claiming work, bounding concurrency, timing retries.
//!
//! This module provides:
//! - **Worker**: the poll loop that claims jobs and dispatches them onto a
//!   bounded pool of execution slots.
//! - **BackoffPolicy**: linear retry delay (`base * attempts`) and the
//!   retry-or-terminal decision.
//! - **LeaseKeeper**: renews a running job's lease so long executions are not
//!   reclaimed by another worker.
//!
//! The claim itself is a single store transaction (see
//! [`JobStore::claim`](crate::store::JobStore::claim)); nothing here holds
//! state another process could race with.

mod backoff;
mod lease;
mod worker;

pub use backoff::BackoffPolicy;
pub use lease::{LeaseGuard, LeaseKeeper};
pub use worker::{Worker, WorkerConfig, WorkerStats};

//! Job store for bb-runner.
//!
//! SQLite holds the durable state shared with the control plane: runners,
//! workspaces, tasks, runs, jobs and artifacts. The store file is the only
//! coordination point between workers, so every state transition a worker
//! makes goes through [`JobStore`].
//!
//! # Example
//!
//! ```ignore
//! use bb_runner::domain::Mode;
//! use bb_runner::store::{JobStore, NewJob};
//! use std::time::Duration;
//!
//! let store = JobStore::open(Path::new("data/bullboard.db"))?;
//! store.enqueue(&NewJob::new(task_id, workspace_id, Mode::Verify, payload))?;
//!
//! if let Some(job) = store.claim("runner-1", Duration::from_secs(600))? {
//!     // execute, then finish
//! }
//! ```

mod job_store;
pub mod schema;
pub mod timestamp;

pub use job_store::{Enqueued, FinishRecord, JobStore, NewJob};

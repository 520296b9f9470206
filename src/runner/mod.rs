//! Job runner module.
//!
//! Glues the worktree manager, executor and finisher into the per-job
//! pipeline the worker dispatches claimed jobs to.

mod job_runner;

pub use job_runner::JobRunner;

//! Git worktree management for run isolation.
//!
//! Each run gets its own worktree on the job's branch, so concurrent runs
//! against the same repository never share a working directory.

mod manager;

pub use manager::WorktreeManager;

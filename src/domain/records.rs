//! Persisted entities of the job store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{ErrorKind, JobStatus, RunStatus};

/// A repository registered with the control plane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub repo_path: String,
    pub default_branch: String,
}

/// A unit of user-facing work; runs hang off it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    pub id: String,
    pub workspace_id: String,
    pub title: String,
    pub description: String,
    /// Domain-defined (`plan`, `in_progress`, ...)
    pub status: String,
    pub plan_round: u32,
    pub fix_round: u32,
    pub submit_state: String,
}

/// One execution attempt-set of a task in a given mode.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    pub id: String,
    pub task_id: String,
    /// Stored verbatim so rows with an unrecognised mode stay readable
    pub mode: String,
    pub status: RunStatus,
    pub worktree_path: Option<String>,
    pub branch_name: Option<String>,
    pub error_kind: ErrorKind,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// A schedulable unit of work, paired 1:1 with a [`Run`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Job {
    pub id: String,
    pub run_id: String,
    pub task_id: String,
    pub workspace_id: String,
    pub mode: String,
    pub payload_json: String,
    pub status: JobStatus,
    pub priority: i64,
    pub available_at: DateTime<Utc>,
    pub attempts: u32,
    pub max_attempts: u32,
    pub locked_by: Option<String>,
    pub locked_until: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// An immutable output file recorded against a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Artifact {
    pub id: String,
    pub run_id: String,
    /// `log`, `report`, `diff`, ...
    pub artifact_type: String,
    /// Location relative to the artifact root
    pub uri: String,
    pub created_at: DateTime<Utc>,
}

//! Domain types for bb-runner
//!
//! This module contains all core domain types:
//! - Status enums persisted as TEXT: Mode, JobStatus, RunStatus, ErrorKind, ArtifactKind
//! - Records: Workspace, Task, Run, Job, Artifact
//! - JobPayload: the typed, mode-tagged payload decoded once per claim
//! - ExecOutcome: what an execution hands to the finisher

pub mod outcome;
pub mod payload;
pub mod records;
pub mod status;

pub use outcome::{ArtifactRef, Disposition, ExecOutcome};
pub use payload::{
    CodeChangeSpec, DEFAULT_BASE_BRANCH, DEFAULT_COMMIT_MESSAGE, DEFAULT_REMOTE, JobPayload, ModeAction,
    PayloadError, SubmitSpec, VerifySpec, WorkspaceTarget,
};
pub use records::{Artifact, Job, Run, Task, Workspace};
pub use status::{ArtifactKind, ErrorKind, JobStatus, Mode, RunStatus};

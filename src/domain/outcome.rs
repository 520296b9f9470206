//! Execution outcome types.
//!
//! This module defines what a mode execution hands back to the finisher.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{ArtifactKind, ErrorKind, JobStatus, RunStatus};

/// An artifact produced by an execution, before it is recorded in the store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRef {
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    /// Path relative to the artifact root, e.g. `run-.../log.txt`
    pub uri: String,
}

impl ArtifactRef {
    pub fn new(kind: ArtifactKind, uri: impl Into<String>) -> Self {
        Self { kind, uri: uri.into() }
    }
}

/// Result of one execution: status, triage classification, summary and outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecOutcome {
    /// Always `Succeeded` or `Failed`
    pub status: RunStatus,
    pub error_kind: ErrorKind,
    pub summary: String,
    pub artifacts: Vec<ArtifactRef>,
}

impl ExecOutcome {
    pub fn succeeded(summary: impl Into<String>, artifacts: Vec<ArtifactRef>) -> Self {
        Self {
            status: RunStatus::Succeeded,
            error_kind: ErrorKind::None,
            summary: summary.into(),
            artifacts,
        }
    }

    pub fn failed(error_kind: ErrorKind, summary: impl Into<String>, artifacts: Vec<ArtifactRef>) -> Self {
        Self {
            status: RunStatus::Failed,
            error_kind,
            summary: summary.into(),
            artifacts,
        }
    }

    /// Infrastructure failure with no artifacts.
    pub fn infra(summary: impl Into<String>) -> Self {
        Self::failed(ErrorKind::InfraFailed, summary, Vec::new())
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Artifact kinds in production order.
    pub fn artifact_kinds(&self) -> Vec<ArtifactKind> {
        self.artifacts.iter().map(|a| a.kind).collect()
    }
}

/// What happens to a job once its execution has been recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Back to `queued`, eligible again at `available_at`
    Requeue { available_at: DateTime<Utc> },
    /// Final status, mirroring the run's outcome
    Terminal(JobStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeded() {
        let outcome = ExecOutcome::succeeded("ok", vec![ArtifactRef::new(ArtifactKind::Log, "r/log.txt")]);
        assert!(outcome.is_success());
        assert_eq!(outcome.error_kind, ErrorKind::None);
        assert_eq!(outcome.artifact_kinds(), vec![ArtifactKind::Log]);
    }

    #[test]
    fn test_infra() {
        let outcome = ExecOutcome::infra("no commands");
        assert!(!outcome.is_success());
        assert_eq!(outcome.status, RunStatus::Failed);
        assert_eq!(outcome.error_kind, ErrorKind::InfraFailed);
        assert!(outcome.artifacts.is_empty());
    }

    #[test]
    fn test_artifact_ref_serializes_type_key() {
        let json = serde_json::to_value(ArtifactRef::new(ArtifactKind::Diff, "r/diff.txt")).unwrap();
        assert_eq!(json, serde_json::json!({"type": "diff", "uri": "r/diff.txt"}));
    }
}

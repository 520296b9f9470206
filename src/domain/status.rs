//! Enumerations persisted as TEXT columns in the job store.
//!
//! Every enum round-trips through `as_str()` / `FromStr` using the exact
//! spelling stored in SQLite and sent in the outcome callback.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Operation kind a job performs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Mode {
    /// Run an ordered list of shell checks
    #[serde(rename = "VERIFY")]
    Verify,
    /// Apply a unified diff
    #[serde(rename = "CODE_CHANGE")]
    CodeChange,
    /// Stage, commit and push the run branch
    #[serde(rename = "SUBMIT")]
    Submit,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Verify => "VERIFY",
            Mode::CodeChange => "CODE_CHANGE",
            Mode::Submit => "SUBMIT",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "VERIFY" => Ok(Mode::Verify),
            "CODE_CHANGE" => Ok(Mode::CodeChange),
            "SUBMIT" => Ok(Mode::Submit),
            other => Err(format!("unknown mode: {}", other)),
        }
    }
}

/// Lifecycle of a job row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
        }
    }

    /// Terminal statuses are never claimed again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "running" => Ok(JobStatus::Running),
            "succeeded" => Ok(JobStatus::Succeeded),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// Lifecycle of a run row. Shares spelling with [`JobStatus`] but evolves
/// independently: a retried job goes back to `queued` while its run keeps the
/// outcome of the last attempt.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            other => Err(format!("unknown run status: {}", other)),
        }
    }
}

/// Triage classification of a finished execution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Succeeded
    None,
    /// Malformed payload, provisioning, git plumbing, commit or push failure
    InfraFailed,
    /// A verification command exited non-zero
    TestFailed,
    /// The supplied patch did not apply
    CodeFailed,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::None => "none",
            ErrorKind::InfraFailed => "infra_failed",
            ErrorKind::TestFailed => "test_failed",
            ErrorKind::CodeFailed => "code_failed",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ErrorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(ErrorKind::None),
            "infra_failed" => Ok(ErrorKind::InfraFailed),
            "test_failed" => Ok(ErrorKind::TestFailed),
            "code_failed" => Ok(ErrorKind::CodeFailed),
            other => Err(format!("unknown error kind: {}", other)),
        }
    }
}

/// Kind of file an execution leaves behind.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Log,
    Report,
    Diff,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Log => "log",
            ArtifactKind::Report => "report",
            ArtifactKind::Diff => "diff",
        }
    }

    /// File name used inside the run's artifact directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Log => "log.txt",
            ArtifactKind::Report => "report.json",
            ArtifactKind::Diff => "diff.txt",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parse() {
        assert_eq!("VERIFY".parse::<Mode>(), Ok(Mode::Verify));
        assert_eq!("CODE_CHANGE".parse::<Mode>(), Ok(Mode::CodeChange));
        assert_eq!("SUBMIT".parse::<Mode>(), Ok(Mode::Submit));
        assert!("verify".parse::<Mode>().is_err());
        assert!("DEPLOY".parse::<Mode>().unwrap_err().contains("DEPLOY"));
    }

    #[test]
    fn test_mode_serde_matches_column_spelling() {
        let json = serde_json::to_string(&Mode::CodeChange).unwrap();
        assert_eq!(json, "\"CODE_CHANGE\"");
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Queued.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Succeeded.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
    }

    #[test]
    fn test_error_kind_serde() {
        assert_eq!(serde_json::to_string(&ErrorKind::InfraFailed).unwrap(), "\"infra_failed\"");
        assert_eq!(serde_json::to_string(&ErrorKind::None).unwrap(), "\"none\"");
        assert_eq!("code_failed".parse::<ErrorKind>(), Ok(ErrorKind::CodeFailed));
    }

    #[test]
    fn test_artifact_file_names() {
        assert_eq!(ArtifactKind::Log.file_name(), "log.txt");
        assert_eq!(ArtifactKind::Report.file_name(), "report.json");
        assert_eq!(ArtifactKind::Diff.file_name(), "diff.txt");
    }
}

//! Typed job payloads.
//!
//! Payloads are stored as opaque JSON next to the job's `mode` column and
//! decoded exactly once, at the boundary, into [`JobPayload`]. Anything that
//! cannot be decoded becomes a [`PayloadError`], which the runner classifies
//! as `infra_failed` before touching git.

use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

use super::status::Mode;

/// Default base branch when the payload omits one.
pub const DEFAULT_BASE_BRANCH: &str = "main";

/// Default remote for SUBMIT.
pub const DEFAULT_REMOTE: &str = "origin";

/// Default commit message for SUBMIT.
pub const DEFAULT_COMMIT_MESSAGE: &str = "BullBoard: submit";

/// Reasons a payload fails to decode.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("invalid payload json: {0}")]
    InvalidJson(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("unknown mode: {0}")]
    UnknownMode(String),
}

/// Repository the job operates on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceTarget {
    pub repo_path: PathBuf,
    pub base_branch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifySpec {
    /// Shell command lines, run in order with `sh -c`
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeChangeSpec {
    /// Unified diff text
    pub patch: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitSpec {
    pub commit_message: String,
    pub remote: String,
}

/// Mode-specific part of a payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModeAction {
    Verify(VerifySpec),
    CodeChange(CodeChangeSpec),
    Submit(SubmitSpec),
}

impl ModeAction {
    pub fn mode(&self) -> Mode {
        match self {
            ModeAction::Verify(_) => Mode::Verify,
            ModeAction::CodeChange(_) => Mode::CodeChange,
            ModeAction::Submit(_) => Mode::Submit,
        }
    }
}

/// A fully decoded job payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobPayload {
    pub workspace: WorkspaceTarget,
    /// Branch the run's worktree checks out (created from the base branch if absent)
    pub branch: String,
    pub action: ModeAction,
}

#[derive(Debug, Default, Deserialize)]
struct RawPayload {
    #[serde(default)]
    workspace: Option<RawWorkspace>,
    #[serde(default)]
    branch: Option<String>,
    #[serde(default)]
    verify: Option<RawVerify>,
    #[serde(default)]
    code_change: Option<RawCodeChange>,
    #[serde(default)]
    submit: Option<RawSubmit>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWorkspace {
    #[serde(default)]
    repo_path: Option<String>,
    #[serde(default)]
    base_branch: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawVerify {
    #[serde(default)]
    commands: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawCodeChange {
    #[serde(default)]
    patch: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSubmit {
    #[serde(default)]
    commit_message: Option<String>,
    #[serde(default)]
    remote: Option<String>,
}

/// Treat empty strings the same as absent ones.
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl JobPayload {
    /// Decode the stored `mode` column and `payload_json` text.
    ///
    /// Empty VERIFY command lists and empty CODE_CHANGE patches decode
    /// successfully; the executor reports them as `infra_failed`.
    pub fn decode(mode: &str, payload_json: &str) -> Result<Self, PayloadError> {
        let mode: Mode = mode
            .parse()
            .map_err(|_| PayloadError::UnknownMode(mode.to_string()))?;

        let raw: RawPayload =
            serde_json::from_str(payload_json).map_err(|e| PayloadError::InvalidJson(e.to_string()))?;

        let workspace = raw.workspace.unwrap_or_default();
        let repo_path = non_empty(workspace.repo_path).ok_or(PayloadError::MissingField("workspace.repo_path"))?;
        let base_branch = non_empty(workspace.base_branch).unwrap_or_else(|| DEFAULT_BASE_BRANCH.to_string());
        let branch = non_empty(raw.branch).ok_or(PayloadError::MissingField("branch"))?;

        let action = match mode {
            Mode::Verify => ModeAction::Verify(VerifySpec {
                commands: raw.verify.unwrap_or_default().commands,
            }),
            Mode::CodeChange => ModeAction::CodeChange(CodeChangeSpec {
                patch: raw.code_change.unwrap_or_default().patch.unwrap_or_default(),
            }),
            Mode::Submit => {
                let submit = raw.submit.unwrap_or_default();
                ModeAction::Submit(SubmitSpec {
                    commit_message: non_empty(submit.commit_message)
                        .unwrap_or_else(|| DEFAULT_COMMIT_MESSAGE.to_string()),
                    remote: non_empty(submit.remote).unwrap_or_else(|| DEFAULT_REMOTE.to_string()),
                })
            }
        };

        Ok(Self {
            workspace: WorkspaceTarget {
                repo_path: PathBuf::from(repo_path),
                base_branch,
            },
            branch,
            action,
        })
    }

    pub fn mode(&self) -> Mode {
        self.action.mode()
    }
}

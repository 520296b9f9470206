//! SUBMIT: stage everything, commit, push the run's branch.

use std::path::Path;

use super::process;
use crate::domain::{ExecOutcome, SubmitSpec};

pub async fn run(spec: &SubmitSpec, branch: &str, worktree: &Path) -> ExecOutcome {
    let steps: [(&str, Vec<&str>); 3] = [
        ("add", vec!["add", "-A"]),
        ("commit", vec!["commit", "-m", spec.commit_message.as_str()]),
        ("push", vec!["push", spec.remote.as_str(), branch]),
    ];

    for (label, args) in &steps {
        match process::git(args, worktree).await {
            Ok(out) if out.success() => {}
            Ok(out) => return ExecOutcome::infra(format!("git {}: {}", label, out.error_text())),
            Err(e) => return ExecOutcome::infra(format!("git {}: {}", label, e)),
        }
    }

    ExecOutcome::succeeded("pushed", Vec::new())
}

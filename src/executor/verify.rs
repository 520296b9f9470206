//! VERIFY: run check commands in order, stopping at the first failure.

use std::path::Path;

use super::artifacts::{ArtifactWriter, write_failed};
use super::process;
use crate::domain::{ArtifactKind, ArtifactRef, ErrorKind, ExecOutcome, VerifySpec};

const SUCCESS_REPORT: &str = r#"{"summary":"ok"}"#;

pub async fn run(spec: &VerifySpec, worktree: &Path, artifacts: &ArtifactWriter) -> ExecOutcome {
    if spec.commands.is_empty() {
        return ExecOutcome::infra("no commands");
    }

    let mut log = String::new();
    for command in &spec.commands {
        log.push_str(&format!("$ {}\n", command));

        let (kind, summary) = match process::shell(command, worktree).await {
            Ok(out) if out.success() => {
                log.push_str(&out.combined());
                continue;
            }
            Ok(out) => {
                log.push_str(&out.combined());
                log.push_str(&format!("exit code: {}\n", out.exit_text()));
                (ErrorKind::TestFailed, out.exit_text())
            }
            // sh itself could not start; nothing about the change is known
            Err(e) => {
                log.push_str(&format!("spawn error: {}\n", e));
                (ErrorKind::InfraFailed, format!("spawn sh: {}", e))
            }
        };

        log::debug!("verify step failed: {}", command);
        return match artifacts.write(ArtifactKind::Log, &log).await {
            Ok(log_ref) => ExecOutcome::failed(kind, summary, vec![log_ref]),
            Err(e) => write_failed(e),
        };
    }

    // The checks passed; a missing diff does not change that.
    let diff = match process::git(&["diff"], worktree).await {
        Ok(out) if out.success() => out.stdout,
        Ok(out) => {
            log::warn!("git diff in {} failed: {}", worktree.display(), out.error_text());
            String::new()
        }
        Err(e) => {
            log::warn!("git diff in {} failed: {}", worktree.display(), e);
            String::new()
        }
    };

    match write_success(artifacts, &log, &diff).await {
        Ok(refs) => ExecOutcome::succeeded("ok", refs),
        Err(e) => write_failed(e),
    }
}

async fn write_success(artifacts: &ArtifactWriter, log: &str, diff: &str) -> std::io::Result<Vec<ArtifactRef>> {
    Ok(vec![
        artifacts.write(ArtifactKind::Log, log).await?,
        artifacts.write(ArtifactKind::Report, SUCCESS_REPORT).await?,
        artifacts.write(ArtifactKind::Diff, diff).await?,
    ])
}

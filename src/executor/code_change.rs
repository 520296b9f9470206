//! CODE_CHANGE: apply a unified diff to the worktree without committing.

use std::path::Path;

use super::artifacts::{ArtifactWriter, write_failed};
use super::process;
use crate::domain::{ArtifactKind, CodeChangeSpec, ErrorKind, ExecOutcome};

/// Patch file name inside the worktree; removed again after applying.
const PATCH_FILE: &str = "apply.patch";

pub async fn run(spec: &CodeChangeSpec, worktree: &Path, artifacts: &ArtifactWriter) -> ExecOutcome {
    if spec.patch.trim().is_empty() {
        return ExecOutcome::infra("no patch");
    }

    let patch_path = worktree.join(PATCH_FILE);
    if let Err(e) = tokio::fs::write(&patch_path, &spec.patch).await {
        return ExecOutcome::infra(format!("write patch: {}", e));
    }

    let applied = process::git(&["apply", PATCH_FILE], worktree).await;
    if let Err(e) = tokio::fs::remove_file(&patch_path).await {
        log::warn!("Failed to remove {}: {}", patch_path.display(), e);
    }

    match applied {
        Ok(out) if out.success() => {}
        Ok(out) => {
            return ExecOutcome::failed(
                ErrorKind::CodeFailed,
                format!("git apply: {}", out.error_text()),
                Vec::new(),
            );
        }
        Err(e) => return ExecOutcome::infra(format!("git apply: {}", e)),
    }

    let diff = match process::git(&["diff"], worktree).await {
        Ok(out) if out.success() => out.stdout,
        Ok(out) => return ExecOutcome::infra(format!("git diff: {}", out.error_text())),
        Err(e) => return ExecOutcome::infra(format!("git diff: {}", e)),
    };

    match artifacts.write(ArtifactKind::Diff, &diff).await {
        Ok(diff_ref) => ExecOutcome::succeeded("applied", vec![diff_ref]),
        Err(e) => write_failed(e),
    }
}

//! Child process helpers shared by the mode executors.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

/// Captured result of one external step.
#[derive(Debug, Clone)]
pub struct StepOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

impl StepOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    /// stdout followed by stderr, as an operator would read it in a log.
    pub fn combined(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }

    /// Short failure description, e.g. `exit status 1`.
    pub fn exit_text(&self) -> String {
        match self.status.code() {
            Some(code) => format!("exit status {}", code),
            None => "terminated by signal".to_string(),
        }
    }

    /// Failure description with the tail of stderr, for summaries.
    pub fn error_text(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.exit_text()
        } else {
            format!("{}: {}", self.exit_text(), last_line(stderr))
        }
    }
}

fn last_line(s: &str) -> &str {
    s.lines().last().unwrap_or(s)
}

/// Run `command` through `sh -c` inside `cwd`.
pub async fn shell(command: &str, cwd: &Path) -> std::io::Result<StepOutput> {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command);
    capture(cmd, cwd).await
}

/// Run git with `args` inside `cwd`.
pub async fn git(args: &[&str], cwd: &Path) -> std::io::Result<StepOutput> {
    let mut cmd = Command::new("git");
    cmd.args(args);
    capture(cmd, cwd).await
}

async fn capture(mut cmd: Command, cwd: &Path) -> std::io::Result<StepOutput> {
    cmd.current_dir(cwd)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    let output = cmd.spawn()?.wait_with_output().await?;
    Ok(StepOutput {
        status: output.status,
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

//! ID generation utilities for bb-runner
//!
//! Provides functions for generating unique identifiers for stored entities.
//! Run ids double as worktree and artifact directory names, so every id is
//! restricted to `[a-z0-9-]`.

use rand::Rng;

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn generate(prefix: &str) -> String {
    let random: u32 = rand::rng().random();
    format!("{}-{}-{:08x}", prefix, now_ms(), random)
}

/// Generate a run ID
///
/// Format: `run-{timestamp_ms}-{random_hex}`
/// Example: `run-1738300800123-a1b2c3d4`
pub fn generate_run_id() -> String {
    generate("run")
}

/// Generate a job ID
///
/// Format: `job-{timestamp_ms}-{random_hex}`
pub fn generate_job_id() -> String {
    generate("job")
}

/// Generate an artifact ID
///
/// Format: `art-{timestamp_ms}-{random_hex}`
pub fn generate_artifact_id() -> String {
    generate("art")
}

pub fn generate_workspace_id() -> String {
    generate("ws")
}

pub fn generate_task_id() -> String {
    generate("task")
}

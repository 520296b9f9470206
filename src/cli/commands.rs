//! CLI command definitions using clap.
//!
//! Defines the main CLI structure and subcommands:
//! - worker: run the claim loop
//! - enqueue: create a queued run and job
//! - status: show a run with its jobs and artifacts
//! - jobs: list jobs in serving order

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// bb-runner - leases queued jobs and runs them in isolated git worktrees
#[derive(Parser, Debug)]
#[command(name = "bb-runner")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Optional config file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Also log to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Check if verbose mode is enabled
    pub fn is_verbose(&self) -> bool {
        self.verbose
    }
}

/// Main subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Poll for jobs and execute them until Ctrl-C
    Worker {
        /// Claim and run at most one job, then exit
        #[arg(long)]
        once: bool,
    },

    /// Create a queued run and job
    Enqueue {
        /// Owning task ID
        #[arg(long)]
        task: String,

        /// Owning workspace ID
        #[arg(long)]
        workspace: String,

        /// VERIFY, CODE_CHANGE or SUBMIT
        #[arg(long)]
        mode: String,

        /// Payload JSON file, or - for stdin
        #[arg(long)]
        payload: PathBuf,

        /// Higher runs first
        #[arg(long, default_value_t = 0)]
        priority: i64,

        #[arg(long, default_value_t = 3)]
        max_attempts: u32,

        /// Delay before the job becomes claimable
        #[arg(long, default_value_t = 0)]
        delay_secs: u64,
    },

    /// Show a run with its jobs and artifacts
    Status {
        /// Run ID to show
        run_id: String,
    },

    /// List jobs in the order the worker would claim them
    Jobs {
        /// Filter by status (queued, running, succeeded, failed)
        #[arg(short, long)]
        status: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_worker_once() {
        let cli = Cli::try_parse_from(["bb-runner", "worker", "--once"]).unwrap();
        assert!(matches!(cli.command, Commands::Worker { once: true }));
        assert!(!cli.is_verbose());
    }

    #[test]
    fn test_parse_enqueue_defaults() {
        let cli = Cli::try_parse_from([
            "bb-runner",
            "enqueue",
            "--task",
            "task-1",
            "--workspace",
            "ws-1",
            "--mode",
            "VERIFY",
            "--payload",
            "-",
        ])
        .unwrap();
        match cli.command {
            Commands::Enqueue {
                priority,
                max_attempts,
                delay_secs,
                payload,
                ..
            } => {
                assert_eq!(priority, 0);
                assert_eq!(max_attempts, 3);
                assert_eq!(delay_secs, 0);
                assert_eq!(payload, PathBuf::from("-"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["bb-runner", "jobs", "--status", "queued", "-v", "-c", "x.yml"]).unwrap();
        assert!(cli.is_verbose());
        assert_eq!(cli.config, Some(PathBuf::from("x.yml")));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["bb-runner"]).is_err());
    }
}

use chrono::Utc;
use clap::Parser;
use colored::*;
use eyre::{Context, Result, eyre};
use log::info;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;

mod cli;
mod config;

use bb_runner::domain::{Artifact, Job, JobPayload, JobStatus, Mode, Run, RunStatus};
use bb_runner::executor::ModeExecutor;
use bb_runner::reconciler::{Finisher, HttpReporter};
use bb_runner::runner::JobRunner;
use bb_runner::scheduler::{LeaseKeeper, Worker};
use bb_runner::store::{JobStore, NewJob};
use bb_runner::worktree::WorktreeManager;
use cli::Cli;
use cli::commands::Commands;
use config::Config;

/// Log sink that writes to the log file and mirrors to stderr.
struct Tee {
    file: fs::File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.file.write_all(buf)?;
        std::io::stderr().write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()?;
        std::io::stderr().flush()
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    // Create log directory
    let log_dir = dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("bb-runner")
        .join("logs");

    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    let log_file = log_dir.join("bb-runner.log");

    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
        .context("Failed to open log file")?;
    let target: Box<dyn Write + Send> = if verbose { Box::new(Tee { file }) } else { Box::new(file) };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Pipe(target))
        .init();

    info!("Logging initialized, writing to: {}", log_file.display());
    Ok(())
}

fn open_store(config: &Config) -> Result<Arc<JobStore>> {
    let store = JobStore::open(&config.store.path)
        .context(format!("Failed to open job store at {}", config.store.path.display()))?;
    Ok(Arc::new(store))
}

async fn run_application(cli: &Cli, config: &Config) -> Result<()> {
    info!("Starting application");

    match &cli.command {
        Commands::Worker { once } => handle_worker_command(*once, config).await,
        Commands::Enqueue {
            task,
            workspace,
            mode,
            payload,
            priority,
            max_attempts,
            delay_secs,
        } => handle_enqueue_command(
            task,
            workspace,
            mode,
            payload,
            *priority,
            *max_attempts,
            *delay_secs,
            config,
        ),
        Commands::Status { run_id } => handle_status_command(run_id, config),
        Commands::Jobs { status } => handle_jobs_command(status.as_deref(), config),
    }
}

fn build_worker(config: &Config, store: Arc<JobStore>) -> Result<Worker> {
    let reporter = HttpReporter::new(&config.control_plane.base_url, config.report_timeout())
        .context("Failed to create report client")?;
    let finisher = Finisher::new(store.clone(), config.backoff(), Arc::new(reporter), &config.worker.id);

    let mut runner = JobRunner::new(
        store.clone(),
        WorktreeManager::new(config.worktree_dir()),
        Arc::new(ModeExecutor::new(&config.artifacts.root)),
        finisher,
    );
    if config.worker.lease_renewal {
        runner = runner.with_lease_keeper(LeaseKeeper::new(store.clone(), &config.worker.id, config.lease()));
    } else {
        log::warn!("Lease renewal disabled; jobs outliving their lease may be reclaimed while running");
    }

    Ok(Worker::new(config.worker_config(), store, Arc::new(runner)))
}

async fn handle_worker_command(once: bool, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let mut worker = build_worker(config, store)?;

    println!(
        "{} {} (concurrency {}, lease {}s)",
        "Worker:".green(),
        config.worker.id,
        config.worker.max_concurrency,
        config.worker.lease_secs
    );

    if once {
        match worker.run_once().await? {
            Some(run_id) => println!("{} {}", "Ran:".green(), run_id),
            None => println!("{}", "No job available".yellow()),
        }
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::error!("Failed to listen for Ctrl-C: {}", e);
            return;
        }
        println!("{}", "Shutting down, waiting for running jobs...".yellow());
        let _ = shutdown_tx.send(true);
    });

    let stats = worker.run(shutdown_rx).await?;
    println!(
        "{} claimed {} job(s), {} claim error(s)",
        "Stopped:".green(),
        stats.claimed,
        stats.claim_errors
    );
    Ok(())
}

fn read_payload(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut payload = String::new();
        std::io::stdin()
            .read_to_string(&mut payload)
            .context("Failed to read payload from stdin")?;
        Ok(payload)
    } else {
        fs::read_to_string(path).context(format!("Failed to read payload from {}", path.display()))
    }
}

#[allow(clippy::too_many_arguments)]
fn handle_enqueue_command(
    task: &str,
    workspace: &str,
    mode: &str,
    payload_path: &Path,
    priority: i64,
    max_attempts: u32,
    delay_secs: u64,
    config: &Config,
) -> Result<()> {
    let mode = mode.parse::<Mode>().map_err(|e: String| eyre!(e))?;
    let payload = read_payload(payload_path)?;
    JobPayload::decode(mode.as_str(), &payload).context("Invalid payload")?;

    let delay = chrono::Duration::seconds(i64::try_from(delay_secs).context("delay too large")?);
    let new_job = NewJob::new(task, workspace, mode, payload)
        .with_priority(priority)
        .with_max_attempts(max_attempts)
        .with_available_at(Utc::now() + delay);

    let store = open_store(config)?;
    let ids = store.enqueue(&new_job)?;
    info!("Enqueued {} job {} for run {}", mode, ids.job_id, ids.run_id);

    println!("{} {}", "Run:".green(), ids.run_id);
    println!("{} {}", "Job:".green(), ids.job_id);
    Ok(())
}

fn handle_status_command(run_id: &str, config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let run = store
        .get_run(run_id)?
        .ok_or_else(|| bb_runner::RunnerError::RunNotFound(run_id.to_string()))?;

    print_run(&run);

    let jobs = store.jobs_for_run(run_id)?;
    if !jobs.is_empty() {
        println!("\n{}", "Jobs:".cyan());
        for job in &jobs {
            print_job(job);
        }
    }

    let artifacts = store.artifacts_for_run(run_id)?;
    if !artifacts.is_empty() {
        println!("\n{}", "Artifacts:".cyan());
        for artifact in &artifacts {
            print_artifact(artifact, &config.artifacts.root);
        }
    }
    Ok(())
}

fn handle_jobs_command(status: Option<&str>, config: &Config) -> Result<()> {
    let status: Option<JobStatus> = status.map(|s| s.parse::<JobStatus>().map_err(|e: String| eyre!(e))).transpose()?;

    let store = open_store(config)?;
    let jobs = store.list_jobs(status)?;
    if jobs.is_empty() {
        println!("{}", "No jobs".yellow());
        return Ok(());
    }
    for job in &jobs {
        print_job(job);
    }
    Ok(())
}

fn colored_run_status(status: RunStatus) -> ColoredString {
    match status {
        RunStatus::Queued => status.as_str().normal(),
        RunStatus::Running => status.as_str().cyan(),
        RunStatus::Succeeded => status.as_str().green(),
        RunStatus::Failed => status.as_str().red(),
    }
}

fn colored_job_status(status: JobStatus) -> ColoredString {
    match status {
        JobStatus::Queued => status.as_str().normal(),
        JobStatus::Running => status.as_str().cyan(),
        JobStatus::Succeeded => status.as_str().green(),
        JobStatus::Failed => status.as_str().red(),
    }
}

fn print_run(run: &Run) {
    println!("{} {}", "Run:".green(), run.id.bold());
    println!("  task:     {}", run.task_id);
    println!("  mode:     {}", run.mode);
    println!("  status:   {}", colored_run_status(run.status));
    println!("  error:    {}", run.error_kind);
    if let Some(message) = &run.error_message {
        println!("  summary:  {}", message);
    }
    if let Some(branch) = &run.branch_name {
        println!("  branch:   {}", branch);
    }
    if let Some(path) = &run.worktree_path {
        println!("  worktree: {}", path);
    }
    if let Some(started) = run.started_at {
        println!("  started:  {}", started.to_rfc3339());
    }
    if let Some(finished) = run.finished_at {
        println!("  finished: {}", finished.to_rfc3339());
    }
}

fn print_job(job: &Job) {
    println!(
        "  {} {:<9} {:<11} prio {:<3} attempts {}/{}  available {}",
        job.id.bold(),
        colored_job_status(job.status),
        job.mode,
        job.priority,
        job.attempts,
        job.max_attempts,
        job.available_at.to_rfc3339()
    );
    if let Some(owner) = &job.locked_by
        && job.status == JobStatus::Running
    {
        let until = job.locked_until.map(|t| t.to_rfc3339()).unwrap_or_default();
        println!("      leased by {} until {}", owner, until);
    }
    if let Some(error) = &job.last_error {
        println!("      last error: {}", error.red());
    }
}

fn print_artifact(artifact: &Artifact, root: &Path) {
    println!(
        "  {:<7} {}",
        artifact.artifact_type,
        root.join(&artifact.uri).display()
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Setup logging first
    setup_logging(cli.is_verbose()).context("Failed to setup logging")?;

    // Load configuration
    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    info!("Starting with config from: {:?}", cli.config);

    if let Err(e) = run_application(&cli, &config).await {
        log::error!("Application error: {}", e);
        eprintln!("{} {:#}", "Error:".red(), e);
        std::process::exit(1);
    }

    Ok(())
}

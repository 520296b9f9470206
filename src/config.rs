//! Configuration: YAML file with fallback chain plus environment overrides.

use eyre::{Context, Result, eyre};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use bb_runner::scheduler::{BackoffPolicy, WorkerConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreConfig,
    pub artifacts: ArtifactsConfig,
    pub worker: WorkerSection,
    pub retry: RetryConfig,
    pub control_plane: ControlPlaneConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/bullboard.db"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    /// Run artifacts land in `{root}/{run_id}/`, worktrees in `{root}/worktrees/`
    pub root: PathBuf,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("artifacts"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSection {
    pub id: String,
    pub max_concurrency: usize,
    pub lease_secs: u64,
    pub poll_interval_ms: u64,
    pub claim_error_backoff_ms: u64,
    /// Extend leases while jobs run; false never renews
    pub lease_renewal: bool,
}

impl Default for WorkerSection {
    fn default() -> Self {
        Self {
            id: "runner-1".to_string(),
            max_concurrency: 1,
            lease_secs: 600,
            poll_interval_ms: 2000,
            claim_error_backoff_ms: 5000,
            lease_renewal: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub backoff_base_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { backoff_base_secs: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlPlaneConfig {
    pub base_url: String,
    pub report_timeout_secs: u64,
}

impl Default for ControlPlaneConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:3000".to_string(),
            report_timeout_secs: 10,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            artifacts: ArtifactsConfig::default(),
            worker: WorkerSection::default(),
            retry: RetryConfig::default(),
            control_plane: ControlPlaneConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration with fallback chain, then apply environment overrides
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let mut config = Self::load_file(config_path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn load_file(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try primary location: ~/.config/<project>/<project>.yml
        if let Some(config_dir) = dirs::config_dir() {
            let project_name = env!("CARGO_PKG_NAME");
            let primary_config = config_dir.join(project_name).join(format!("{}.yml", project_name));
            if primary_config.exists() {
                match Self::load_from_file(&primary_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        log::warn!("Failed to load config from {}: {}", primary_config.display(), e);
                    }
                }
            }
        }

        // Try fallback location: ./<project>.yml
        let project_name = env!("CARGO_PKG_NAME");
        let fallback_config = PathBuf::from(format!("{}.yml", project_name));
        if fallback_config.exists() {
            match Self::load_from_file(&fallback_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    log::warn!("Failed to load config from {}: {}", fallback_config.display(), e);
                }
            }
        }

        // No config file found, use defaults
        log::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        log::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply environment overrides. `lookup` returns the variable's value, if set.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("SQLITE_PATH") {
            self.store.path = PathBuf::from(v);
        }
        if let Some(v) = get("ARTIFACTS_DIR") {
            self.artifacts.root = PathBuf::from(v);
        }
        if let Some(v) = get("RUNNER_ID") {
            self.worker.id = v;
        }
        if let Some(v) = get("MAX_CONCURRENCY") {
            self.worker.max_concurrency = parse_env("MAX_CONCURRENCY", &v)?;
        }
        if let Some(v) = get("LEASE_SECONDS") {
            self.worker.lease_secs = parse_env("LEASE_SECONDS", &v)?;
        }
        if let Some(v) = get("POLL_INTERVAL_MS") {
            self.worker.poll_interval_ms = parse_env("POLL_INTERVAL_MS", &v)?;
        }
        if let Some(v) = get("CLAIM_ERROR_BACKOFF_MS") {
            self.worker.claim_error_backoff_ms = parse_env("CLAIM_ERROR_BACKOFF_MS", &v)?;
        }
        if let Some(v) = get("LEASE_RENEWAL") {
            self.worker.lease_renewal = parse_bool("LEASE_RENEWAL", &v)?;
        }
        if let Some(v) = get("BACKOFF_BASE_SECS") {
            self.retry.backoff_base_secs = parse_env("BACKOFF_BASE_SECS", &v)?;
        }
        if let Some(v) = get("API_BASE_URL") {
            self.control_plane.base_url = v;
        }
        if let Some(v) = get("REPORT_TIMEOUT_SECS") {
            self.control_plane.report_timeout_secs = parse_env("REPORT_TIMEOUT_SECS", &v)?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker.max_concurrency == 0 {
            return Err(eyre!("worker.max_concurrency must be at least 1"));
        }
        if self.worker.lease_secs == 0 {
            return Err(eyre!("worker.lease_secs must be at least 1"));
        }
        if self.worker.id.trim().is_empty() {
            return Err(eyre!("worker.id must not be empty"));
        }
        Ok(())
    }

    pub fn worktree_dir(&self) -> PathBuf {
        self.artifacts.root.join("worktrees")
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.worker.lease_secs)
    }

    pub fn report_timeout(&self) -> Duration {
        Duration::from_secs(self.control_plane.report_timeout_secs)
    }

    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::new(Duration::from_secs(self.retry.backoff_base_secs))
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            worker_id: self.worker.id.clone(),
            max_concurrency: self.worker.max_concurrency,
            lease: self.lease(),
            poll_interval: Duration::from_millis(self.worker.poll_interval_ms),
            claim_error_backoff: Duration::from_millis(self.worker.claim_error_backoff_ms),
        }
    }
}

fn parse_env<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| eyre!("invalid value for {}: {:?}", name, value))
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(eyre!("invalid value for {}: {:?}", name, value)),
    }
}

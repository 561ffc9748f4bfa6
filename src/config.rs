//! Orchestrator configuration
//!
//! Defaults match the recognized options table; every value can be
//! overridden via `ORCHESTRATOR_*` environment variables and again by CLI
//! flags in the binary.

use std::path::PathBuf;
use std::time::Duration;

/// Runtime configuration for the orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Root of the managed working trees (`~/projects`)
    pub projects_dir: PathBuf,

    /// Orchestrator state directory (`~/orchestrator`), holds `logs/`
    pub orchestrator_home: PathBuf,

    /// Global cap on concurrent runs
    pub max_concurrent_runs: usize,

    /// Wall-clock timeout for task and improvement runs
    pub run_timeout: Duration,

    /// Wall-clock timeout for self-evaluation runs
    pub eval_timeout: Duration,

    /// Minimum interval between improvements for one project
    pub improvement_cooldown: Duration,

    /// Interval between improvement sweeps over all projects
    pub improvement_sweep_interval: Duration,

    /// Pending-task poll interval
    pub pending_poll_interval: Duration,

    /// Stagger between consecutive task dispatches within one poll
    pub per_task_stagger: Duration,

    /// Assistant binary invoked for every run
    pub assistant_binary: String,

    /// Declared safety target: improvements per file per week. Not enforced
    /// by the engine (no per-file application index in the data model);
    /// surfaced for operators and logs only.
    pub max_improvements_per_file_week: u32,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            projects_dir: home.join("projects"),
            orchestrator_home: home.join("orchestrator"),
            max_concurrent_runs: 3,
            run_timeout: Duration::from_secs(600),
            eval_timeout: Duration::from_secs(120),
            improvement_cooldown: Duration::from_secs(24 * 3600),
            improvement_sweep_interval: Duration::from_secs(3600),
            pending_poll_interval: Duration::from_secs(10),
            per_task_stagger: Duration::from_secs(2),
            assistant_binary: "claude".to_string(),
            max_improvements_per_file_week: 3,
        }
    }
}

impl OrchestratorConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("ORCHESTRATOR_PROJECTS_DIR") {
            config.projects_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("ORCHESTRATOR_HOME") {
            config.orchestrator_home = PathBuf::from(dir);
        }
        if let Some(n) = env_parse("ORCHESTRATOR_MAX_CONCURRENT_RUNS") {
            config.max_concurrent_runs = n;
        }
        if let Some(secs) = env_parse("ORCHESTRATOR_RUN_TIMEOUT_SECONDS") {
            config.run_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("ORCHESTRATOR_EVAL_TIMEOUT_SECONDS") {
            config.eval_timeout = Duration::from_secs(secs);
        }
        if let Some(hours) = env_parse::<u64>("ORCHESTRATOR_IMPROVEMENT_COOLDOWN_HOURS") {
            config.improvement_cooldown = Duration::from_secs(hours * 3600);
        }
        if let Some(secs) = env_parse("ORCHESTRATOR_IMPROVEMENT_SWEEP_SECONDS") {
            config.improvement_sweep_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("ORCHESTRATOR_PENDING_POLL_SECONDS") {
            config.pending_poll_interval = Duration::from_secs(secs);
        }
        if let Some(secs) = env_parse("ORCHESTRATOR_PER_TASK_STAGGER_SECONDS") {
            config.per_task_stagger = Duration::from_secs(secs);
        }
        if let Ok(binary) = std::env::var("ORCHESTRATOR_ASSISTANT_BINARY") {
            config.assistant_binary = binary;
        }

        config
    }

    /// Directory holding full per-run output files
    pub fn runs_log_dir(&self) -> PathBuf {
        self.orchestrator_home.join("logs").join("runs")
    }

    /// Full-output path for a given run
    pub fn run_log_path(&self, run_id: i64) -> PathBuf {
        self.runs_log_dir().join(format!("run_{}.log", run_id))
    }

    /// Daily dispatcher/executor log file
    pub fn executor_log_path(&self) -> PathBuf {
        let day = chrono::Utc::now().format("%Y%m%d");
        self.orchestrator_home
            .join("logs")
            .join(format!("executor_{}.log", day))
    }

    /// Working tree for a project's local directory name
    pub fn project_dir(&self, local_directory: &str) -> PathBuf {
        self.projects_dir.join(local_directory)
    }

    /// Cutoff age after which a `running` run is considered stale
    pub fn stale_run_age(&self) -> Duration {
        self.run_timeout * 2
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

//! Orchestrator binary
//!
//! Reads configuration from the environment, applies CLI overrides, connects
//! to the Supabase state store, and runs the supervisor until interrupted.
//! Exits non-zero when the store is unreachable at startup.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::prelude::*;

use orchestrator::{ClaudeRunner, OrchestratorConfig, SharedStateStore, SupabaseStore, Supervisor};

/// Command-line arguments; each flag overrides the env-derived config
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Global cap on concurrent runs
    #[arg(long)]
    max_concurrent: Option<usize>,

    /// Pending-task poll interval in seconds
    #[arg(long)]
    poll_seconds: Option<u64>,

    /// Improvement sweep interval in seconds
    #[arg(long)]
    sweep_seconds: Option<u64>,

    /// Root directory of the managed working trees
    #[arg(long)]
    projects_dir: Option<PathBuf>,

    /// Assistant binary to invoke
    #[arg(long)]
    assistant_binary: Option<String>,

    /// Run exactly one improvement sweep over all projects, then exit
    #[arg(long, default_value_t = false)]
    sweep_once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = OrchestratorConfig::from_env();
    if let Some(max) = args.max_concurrent {
        config.max_concurrent_runs = max;
    }
    if let Some(secs) = args.poll_seconds {
        config.pending_poll_interval = std::time::Duration::from_secs(secs);
    }
    if let Some(secs) = args.sweep_seconds {
        config.improvement_sweep_interval = std::time::Duration::from_secs(secs);
    }
    if let Some(dir) = args.projects_dir {
        config.projects_dir = dir;
    }
    if let Some(binary) = args.assistant_binary {
        config.assistant_binary = binary;
    }

    init_tracing(&config).context("failed to initialize logging")?;
    info!(
        projects_dir = %config.projects_dir.display(),
        max_concurrent = config.max_concurrent_runs,
        run_timeout_secs = config.run_timeout.as_secs(),
        "orchestrator starting"
    );

    let store: SharedStateStore = Arc::new(
        SupabaseStore::from_env().context("failed to initialize the state store")?,
    );
    let runner = Arc::new(ClaudeRunner::new(config.assistant_binary.clone()));
    let supervisor = Supervisor::new(store, runner, Arc::new(config));

    if args.sweep_once {
        supervisor
            .sweep_once()
            .await
            .context("improvement sweep failed")?;
        return Ok(());
    }

    supervisor
        .run()
        .await
        .context("orchestrator terminated on an unrecoverable store failure")?;
    Ok(())
}

/// Stderr layer plus a non-ANSI daily file layer under the orchestrator home
fn init_tracing(config: &OrchestratorConfig) -> anyhow::Result<()> {
    let log_dir = config.orchestrator_home.join("logs");
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("could not create {}", log_dir.display()))?;
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.executor_log_path())?;

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("orchestrator=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(log_file)),
        )
        .init();
    Ok(())
}

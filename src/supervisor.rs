//! Supervisor loop
//!
//! Wires the store, dispatcher and improvement engine together and owns
//! process lifecycle: startup health check, stale-run reconciliation,
//! interrupt-driven shutdown. On shutdown the polling loops stop but
//! in-flight workers run to completion, so exit is bounded by the run
//! timeout.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::config::OrchestratorConfig;
use crate::dispatcher::{wait_or_shutdown, Dispatcher};
use crate::error::OrchestratorResult;
use crate::executor::RunExecutor;
use crate::improvement::ImprovementEngine;
use crate::runner::{AssistantRunner, EXIT_TIMEOUT};
use crate::store::types::{RunCompletion, RunStatus, TaskStatus};
use crate::store::SharedStateStore;

/// Owns lifecycle and wiring of all components
pub struct Supervisor {
    store: SharedStateStore,
    runner: Arc<dyn AssistantRunner>,
    config: Arc<OrchestratorConfig>,
}

impl Supervisor {
    pub fn new(
        store: SharedStateStore,
        runner: Arc<dyn AssistantRunner>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            store,
            runner,
            config,
        }
    }

    /// Run until interrupted. Fails only on an unrecoverable store failure
    /// at startup.
    pub async fn run(&self) -> OrchestratorResult<()> {
        self.store.health_check().await?;
        info!("state store reachable");

        self.reconcile_stale_runs().await;

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
                let _ = shutdown_tx.send(true);
            }
        });

        let executor = Arc::new(RunExecutor::new(
            self.store.clone(),
            self.runner.clone(),
            self.config.clone(),
        ));
        let dispatcher = Dispatcher::new(self.store.clone(), executor, self.config.clone());
        let dispatcher_shutdown = shutdown_rx.clone();
        let dispatcher_handle = tokio::spawn(async move {
            dispatcher.run(dispatcher_shutdown).await;
        });

        // The engine sweeps on the supervisor, one project at a time.
        let engine = ImprovementEngine::new(
            self.store.clone(),
            self.runner.clone(),
            self.config.clone(),
        );
        let mut shutdown = shutdown_rx;
        loop {
            if wait_or_shutdown(&mut shutdown, self.config.improvement_sweep_interval).await {
                break;
            }
            engine.sweep().await;
        }

        if let Err(e) = dispatcher_handle.await {
            error!(error = %e, "dispatcher task aborted");
        }
        info!("supervisor stopped");
        Ok(())
    }

    /// One improvement sweep over all projects, then return
    pub async fn sweep_once(&self) -> OrchestratorResult<()> {
        self.store.health_check().await?;
        let engine = ImprovementEngine::new(
            self.store.clone(),
            self.runner.clone(),
            self.config.clone(),
        );
        engine.sweep().await;
        Ok(())
    }

    /// A crash between run insert and run completion leaves a `running` row
    /// behind. Anything older than twice the run timeout cannot still be in
    /// flight; mark the run and its task failed with a synthetic note.
    pub async fn reconcile_stale_runs(&self) {
        let age = chrono::Duration::from_std(self.config.stale_run_age())
            .unwrap_or_else(|_| chrono::Duration::seconds(1200));
        let cutoff = Utc::now() - age;

        let stale = match self.store.list_stale_running_runs(cutoff).await {
            Ok(runs) => runs,
            Err(e) => {
                warn!(error = %e, "stale-run scan failed");
                return;
            }
        };
        if stale.is_empty() {
            debug!("no stale runs to reconcile");
            return;
        }

        warn!(count = stale.len(), "reconciling runs left running by a previous process");
        for run in stale {
            let note = format!(
                "run {} was still marked running at startup; marked failed during reconciliation",
                run.id
            );
            let completion = RunCompletion {
                status: RunStatus::Failed,
                exit_code: EXIT_TIMEOUT,
                stdout_preview: note.clone(),
                full_output_path: run.full_output_path.clone(),
                duration_seconds: 0,
                completed_at: Utc::now(),
            };
            if let Err(e) = self.store.complete_run(run.id, &completion).await {
                warn!(run_id = run.id, error = %e, "could not reconcile stale run");
                continue;
            }
            if let Err(e) = self
                .store
                .update_task_status(run.task_id, TaskStatus::Failed, Some(&note))
                .await
            {
                warn!(task_id = run.task_id, error = %e, "could not fail task of stale run");
            }
            info!(run_id = run.id, task_id = run.task_id, "stale run reconciled");
        }
    }
}

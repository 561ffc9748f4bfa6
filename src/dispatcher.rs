//! Task dispatcher
//!
//! Polls the pending queue and fans tasks out to background workers under
//! two invariants: at most `max_concurrent_runs` runs in flight globally,
//! and at most one run per project at any time (the working tree is the
//! serialization unit). Tasks whose project is busy are skipped, not
//! blocked; the next poll reconsiders them, so ordering within a project is
//! FIFO and the scheduler stays work-conserving across projects.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::executor::RunExecutor;
use crate::store::SharedStateStore;

/// Bookkeeping for one in-flight run
#[derive(Debug, Clone)]
pub struct RunningTask {
    pub task_id: i64,
    pub started_at: DateTime<Utc>,
}

type RunningMap = Arc<Mutex<HashMap<String, RunningTask>>>;

/// Schedules pending tasks onto background workers
pub struct Dispatcher {
    store: SharedStateStore,
    executor: Arc<RunExecutor>,
    config: Arc<OrchestratorConfig>,
    running: RunningMap,
}

impl Dispatcher {
    pub fn new(
        store: SharedStateStore,
        executor: Arc<RunExecutor>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        Self {
            store,
            executor,
            config,
            running: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Projects with a run in flight
    pub fn running_projects(&self) -> Vec<String> {
        lock_running(&self.running).keys().cloned().collect()
    }

    /// Claim a scheduling slot for a project. Holds the mutex only for the
    /// check-and-register; never across a subprocess wait.
    fn try_claim(&self, project_id: &str, task_id: i64) -> bool {
        let mut running = lock_running(&self.running);
        if running.contains_key(project_id) {
            debug!(project_id, "project already running");
            return false;
        }
        if running.len() >= self.config.max_concurrent_runs {
            debug!(
                limit = self.config.max_concurrent_runs,
                "max concurrent runs reached"
            );
            return false;
        }
        running.insert(
            project_id.to_string(),
            RunningTask {
                task_id,
                started_at: Utc::now(),
            },
        );
        true
    }

    /// Scheduling loop. Returns once shutdown is signalled and every
    /// in-flight worker has finished; workers are never killed mid-run.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            max_concurrent = self.config.max_concurrent_runs,
            poll_secs = self.config.pending_poll_interval.as_secs(),
            "dispatcher started"
        );

        let mut workers: JoinSet<()> = JoinSet::new();

        'poll: loop {
            if *shutdown.borrow() {
                break;
            }

            // Reap workers that finished since the last poll.
            while workers.try_join_next().is_some() {}

            let running = self.running_projects();
            if !running.is_empty() {
                info!(count = running.len(), projects = ?running, "runs in flight");
            }

            match self.store.list_pending_tasks().await {
                Err(e) => {
                    // Transient or not, the queue is retried at the next poll.
                    warn!(error = %e, transient = e.is_transient(), "pending task fetch failed");
                }
                Ok(tasks) if tasks.is_empty() => debug!("no pending tasks"),
                Ok(tasks) => {
                    info!(count = tasks.len(), "pending tasks detected");
                    for task in tasks {
                        if *shutdown.borrow() {
                            break 'poll;
                        }
                        if !self.try_claim(&task.project_id, task.id) {
                            continue;
                        }

                        info!(task_id = task.id, project_id = %task.project_id, "task dispatched");
                        let executor = self.executor.clone();
                        let running = self.running.clone();
                        let project_id = task.project_id.clone();
                        workers.spawn(async move {
                            executor.execute(&task).await;
                            lock_running(&running).remove(&project_id);
                        });

                        if wait_or_shutdown(&mut shutdown, self.config.per_task_stagger).await {
                            break 'poll;
                        }
                    }
                }
            }

            if wait_or_shutdown(&mut shutdown, self.config.pending_poll_interval).await {
                break;
            }
        }

        let in_flight = workers.len();
        if in_flight > 0 {
            info!(in_flight, "dispatcher stopping, waiting for in-flight runs");
        }
        while workers.join_next().await.is_some() {}
        info!("dispatcher stopped");
    }
}

/// Lock the running map, recovering from a poisoned mutex; the critical
/// sections only touch the map, so the data is still consistent.
fn lock_running(running: &Mutex<HashMap<String, RunningTask>>) -> MutexGuard<'_, HashMap<String, RunningTask>> {
    running.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Sleep for `duration` unless shutdown is signalled first. Returns true
/// when the loop should stop.
pub(crate) async fn wait_or_shutdown(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => false,
        changed = shutdown.changed() => match changed {
            Ok(()) => *shutdown.borrow(),
            // Sender gone: treat as shutdown rather than spin.
            Err(_) => true,
        },
    }
}

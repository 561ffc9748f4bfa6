//! State store gateway
//!
//! Typed operations over the persistent relational store. The gateway is a
//! value constructed at supervisor startup and passed by reference to each
//! component; all callers hold only ids and value snapshots. Implementations
//! must be safe to call from multiple workers in parallel.

pub mod memory;
pub mod supabase;
pub mod types;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::OrchestratorResult;
use types::{
    Evaluation, ImprovementRecord, KnowledgeAsset, NewRun, ProjectConfig, ProjectSummary, Run,
    RunCompletion, Suggestion, Task, TaskStatus, ToolCall,
};

pub use memory::MemoryStore;
pub use supabase::SupabaseStore;

/// Shared reference to a state store implementation
pub type SharedStateStore = Arc<dyn StateStore>;

/// Typed operations over the persistent store.
///
/// Operations fail with either a transient (retry at next poll) or permanent
/// error; see [`crate::error::OrchestratorError::is_transient`].
#[async_trait]
pub trait StateStore: Send + Sync {
    /// Cheap reachability probe used at supervisor startup
    async fn health_check(&self) -> OrchestratorResult<()>;

    /// All configured projects
    async fn list_projects(&self) -> OrchestratorResult<Vec<ProjectConfig>>;

    /// Project configuration by id, `None` when the store has no row
    async fn get_project(&self, project_id: &str) -> OrchestratorResult<Option<ProjectConfig>>;

    /// Pending tasks ordered by `created_at` ascending
    async fn list_pending_tasks(&self) -> OrchestratorResult<Vec<Task>>;

    /// Update a task's status; terminal states also set `completed_at`
    async fn update_task_status(
        &self,
        task_id: i64,
        status: TaskStatus,
        completion_note: Option<&str>,
    ) -> OrchestratorResult<()>;

    /// Insert a run record, returning its id
    async fn insert_run(&self, new_run: &NewRun) -> OrchestratorResult<i64>;

    /// Write a run's terminal fields
    async fn complete_run(&self, run_id: i64, completion: &RunCompletion)
        -> OrchestratorResult<()>;

    /// Most recent runs for a project, `created_at` descending
    async fn list_recent_runs(&self, project_id: &str, limit: usize)
        -> OrchestratorResult<Vec<Run>>;

    /// Runs still marked `running` that were created before `cutoff`
    async fn list_stale_running_runs(&self, cutoff: DateTime<Utc>)
        -> OrchestratorResult<Vec<Run>>;

    /// Bulk-insert the tool-call trace of a run
    async fn insert_tool_calls(&self, run_id: i64, calls: &[ToolCall]) -> OrchestratorResult<()>;

    /// Insert a self-evaluation row
    async fn insert_evaluation(&self, evaluation: &Evaluation) -> OrchestratorResult<()>;

    /// Evaluations for a set of run ids
    async fn list_evaluations(&self, run_ids: &[i64]) -> OrchestratorResult<Vec<Evaluation>>;

    /// Insert or update the one summary row per project
    async fn upsert_project_summary(&self, summary: &ProjectSummary) -> OrchestratorResult<()>;

    /// Append a proposed next action
    async fn insert_suggestion(&self, suggestion: &Suggestion) -> OrchestratorResult<()>;

    /// Improvement history rows with `applied_at >= cutoff`
    async fn improvements_since(
        &self,
        project_id: &str,
        cutoff: DateTime<Utc>,
    ) -> OrchestratorResult<Vec<ImprovementRecord>>;

    /// Record an applied improvement
    async fn insert_improvement(&self, record: &ImprovementRecord) -> OrchestratorResult<()>;

    /// Record a `.claude/` file authored during an improvement
    async fn insert_knowledge_asset(&self, asset: &KnowledgeAsset) -> OrchestratorResult<()>;
}

//! In-process state store
//!
//! Backs the test suites and doubles as the injectable fake the design calls
//! for: identical semantics to the Supabase gateway, no I/O. Ordering ties on
//! `created_at` are broken by id so queries stay deterministic.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::{OrchestratorError, OrchestratorResult};

use super::types::{
    Evaluation, ImprovementRecord, KnowledgeAsset, NewRun, ProjectConfig, ProjectSummary, Run,
    RunCompletion, RunStatus, Suggestion, Task, TaskStatus, ToolCall,
};
use super::StateStore;

#[derive(Default)]
struct Inner {
    projects: Vec<ProjectConfig>,
    tasks: Vec<Task>,
    runs: Vec<Run>,
    tool_calls: Vec<(i64, ToolCall)>,
    evaluations: Vec<Evaluation>,
    summaries: HashMap<String, ProjectSummary>,
    suggestions: Vec<Suggestion>,
    improvements: Vec<ImprovementRecord>,
    assets: Vec<KnowledgeAsset>,
    next_task_id: i64,
    next_run_id: i64,
}

/// In-memory store implementation
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                next_task_id: 1,
                next_run_id: 1,
                ..Inner::default()
            }),
        }
    }

    fn lock(&self) -> OrchestratorResult<std::sync::MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| OrchestratorError::store_permanent("store lock poisoned"))
    }

    /// Register a project configuration
    pub fn add_project(&self, config: ProjectConfig) {
        self.inner.lock().unwrap().projects.push(config);
    }

    /// Enqueue a pending task, returning its id
    pub fn add_task(&self, project_id: &str, title: &str, description: Option<&str>) -> i64 {
        let mut inner = self.inner.lock().unwrap();
        let id = inner.next_task_id;
        inner.next_task_id += 1;
        inner.tasks.push(Task {
            id,
            project_id: project_id.to_string(),
            title: title.to_string(),
            description: description.map(str::to_string),
            status: TaskStatus::Pending,
            created_at: Utc::now(),
            completed_at: None,
            completion_note: None,
        });
        id
    }

    /// Snapshot of a task by id
    pub fn get_task(&self, task_id: i64) -> Option<Task> {
        self.inner
            .lock()
            .unwrap()
            .tasks
            .iter()
            .find(|t| t.id == task_id)
            .cloned()
    }

    /// Snapshot of a run by id
    pub fn get_run(&self, run_id: i64) -> Option<Run> {
        self.inner
            .lock()
            .unwrap()
            .runs
            .iter()
            .find(|r| r.id == run_id)
            .cloned()
    }

    /// All runs for a project, oldest first
    pub fn runs_for(&self, project_id: &str) -> Vec<Run> {
        let inner = self.inner.lock().unwrap();
        let mut runs: Vec<Run> = inner
            .runs
            .iter()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| (r.created_at, r.id));
        runs
    }

    /// Rewrite a run's `created_at`, for seeding ordering-sensitive scenarios
    pub fn backdate_run(&self, run_id: i64, created_at: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(run) = inner.runs.iter_mut().find(|r| r.id == run_id) {
            run.created_at = created_at;
        }
    }

    pub fn summary_for(&self, project_id: &str) -> Option<ProjectSummary> {
        self.inner.lock().unwrap().summaries.get(project_id).cloned()
    }

    pub fn suggestions_for(&self, project_id: &str) -> Vec<Suggestion> {
        self.inner
            .lock()
            .unwrap()
            .suggestions
            .iter()
            .filter(|s| s.project_id == project_id)
            .cloned()
            .collect()
    }

    pub fn tool_calls_for(&self, run_id: i64) -> Vec<ToolCall> {
        self.inner
            .lock()
            .unwrap()
            .tool_calls
            .iter()
            .filter(|(id, _)| *id == run_id)
            .map(|(_, call)| call.clone())
            .collect()
    }

    pub fn improvements_for(&self, project_id: &str) -> Vec<ImprovementRecord> {
        self.inner
            .lock()
            .unwrap()
            .improvements
            .iter()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect()
    }

    pub fn assets_for(&self, project_id: &str) -> Vec<KnowledgeAsset> {
        self.inner
            .lock()
            .unwrap()
            .assets
            .iter()
            .filter(|a| a.project_id == project_id)
            .cloned()
            .collect()
    }

    pub fn evaluations_for_run(&self, run_id: i64) -> Vec<Evaluation> {
        self.inner
            .lock()
            .unwrap()
            .evaluations
            .iter()
            .filter(|e| e.run_id == run_id)
            .cloned()
            .collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn health_check(&self) -> OrchestratorResult<()> {
        self.lock().map(|_| ())
    }

    async fn list_projects(&self) -> OrchestratorResult<Vec<ProjectConfig>> {
        Ok(self.lock()?.projects.clone())
    }

    async fn get_project(&self, project_id: &str) -> OrchestratorResult<Option<ProjectConfig>> {
        Ok(self
            .lock()?
            .projects
            .iter()
            .find(|p| p.id == project_id)
            .cloned())
    }

    async fn list_pending_tasks(&self) -> OrchestratorResult<Vec<Task>> {
        let inner = self.lock()?;
        let mut tasks: Vec<Task> = inner
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect();
        tasks.sort_by_key(|t| (t.created_at, t.id));
        Ok(tasks)
    }

    async fn update_task_status(
        &self,
        task_id: i64,
        status: TaskStatus,
        completion_note: Option<&str>,
    ) -> OrchestratorResult<()> {
        let mut inner = self.lock()?;
        let task = inner
            .tasks
            .iter_mut()
            .find(|t| t.id == task_id)
            .ok_or_else(|| {
                OrchestratorError::store_permanent(format!("task {} not found", task_id))
            })?;
        task.status = status;
        if status.is_terminal() {
            task.completed_at = Some(Utc::now());
        }
        if let Some(note) = completion_note {
            task.completion_note = Some(note.to_string());
        }
        Ok(())
    }

    async fn insert_run(&self, new_run: &NewRun) -> OrchestratorResult<i64> {
        let mut inner = self.lock()?;
        let id = inner.next_run_id;
        inner.next_run_id += 1;
        inner.runs.push(Run {
            id,
            task_id: new_run.task_id,
            project_id: new_run.project_id.clone(),
            instruction: new_run.instruction.clone(),
            status: new_run.status,
            exit_code: None,
            stdout_preview: None,
            full_output_path: None,
            duration_seconds: None,
            timeout_seconds: new_run.timeout_seconds,
            created_at: Utc::now(),
            completed_at: None,
        });
        Ok(id)
    }

    async fn complete_run(
        &self,
        run_id: i64,
        completion: &RunCompletion,
    ) -> OrchestratorResult<()> {
        let mut inner = self.lock()?;
        let run = inner
            .runs
            .iter_mut()
            .find(|r| r.id == run_id)
            .ok_or_else(|| {
                OrchestratorError::store_permanent(format!("run {} not found", run_id))
            })?;
        run.status = completion.status;
        run.exit_code = Some(completion.exit_code);
        run.stdout_preview = Some(completion.stdout_preview.clone());
        run.full_output_path = completion.full_output_path.clone();
        run.duration_seconds = Some(completion.duration_seconds);
        run.completed_at = Some(completion.completed_at);
        Ok(())
    }

    async fn list_recent_runs(
        &self,
        project_id: &str,
        limit: usize,
    ) -> OrchestratorResult<Vec<Run>> {
        let inner = self.lock()?;
        let mut runs: Vec<Run> = inner
            .runs
            .iter()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect();
        runs.sort_by_key(|r| std::cmp::Reverse((r.created_at, r.id)));
        runs.truncate(limit);
        Ok(runs)
    }

    async fn list_stale_running_runs(
        &self,
        cutoff: DateTime<Utc>,
    ) -> OrchestratorResult<Vec<Run>> {
        let inner = self.lock()?;
        Ok(inner
            .runs
            .iter()
            .filter(|r| r.status == RunStatus::Running && r.created_at < cutoff)
            .cloned()
            .collect())
    }

    async fn insert_tool_calls(&self, run_id: i64, calls: &[ToolCall]) -> OrchestratorResult<()> {
        let mut inner = self.lock()?;
        inner
            .tool_calls
            .extend(calls.iter().map(|c| (run_id, c.clone())));
        Ok(())
    }

    async fn insert_evaluation(&self, evaluation: &Evaluation) -> OrchestratorResult<()> {
        self.lock()?.evaluations.push(evaluation.clone());
        Ok(())
    }

    async fn list_evaluations(&self, run_ids: &[i64]) -> OrchestratorResult<Vec<Evaluation>> {
        let inner = self.lock()?;
        Ok(inner
            .evaluations
            .iter()
            .filter(|e| run_ids.contains(&e.run_id))
            .cloned()
            .collect())
    }

    async fn upsert_project_summary(&self, summary: &ProjectSummary) -> OrchestratorResult<()> {
        self.lock()?
            .summaries
            .insert(summary.project_id.clone(), summary.clone());
        Ok(())
    }

    async fn insert_suggestion(&self, suggestion: &Suggestion) -> OrchestratorResult<()> {
        self.lock()?.suggestions.push(suggestion.clone());
        Ok(())
    }

    async fn improvements_since(
        &self,
        project_id: &str,
        cutoff: DateTime<Utc>,
    ) -> OrchestratorResult<Vec<ImprovementRecord>> {
        let inner = self.lock()?;
        Ok(inner
            .improvements
            .iter()
            .filter(|r| r.project_id == project_id && r.applied_at >= cutoff)
            .cloned()
            .collect())
    }

    async fn insert_improvement(&self, record: &ImprovementRecord) -> OrchestratorResult<()> {
        self.lock()?.improvements.push(record.clone());
        Ok(())
    }

    async fn insert_knowledge_asset(&self, asset: &KnowledgeAsset) -> OrchestratorResult<()> {
        self.lock()?.assets.push(asset.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::super::types::TriggerType;
    use super::*;
    use chrono::Duration;

    fn completion(status: RunStatus, exit_code: i32) -> RunCompletion {
        RunCompletion {
            status,
            exit_code,
            stdout_preview: "out".to_string(),
            full_output_path: None,
            duration_seconds: 1,
            completed_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_pending_tasks_fifo() {
        let store = MemoryStore::new();
        let first = store.add_task("idiom", "first", None);
        let second = store.add_task("docflow", "second", None);

        let pending = store.list_pending_tasks().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, first);
        assert_eq!(pending[1].id, second);

        store
            .update_task_status(first, TaskStatus::Done, Some("ok"))
            .await
            .unwrap();
        let pending = store.list_pending_tasks().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, second);
    }

    #[tokio::test]
    async fn test_terminal_task_sets_completed_at() {
        let store = MemoryStore::new();
        let id = store.add_task("idiom", "t", None);

        store
            .update_task_status(id, TaskStatus::InProgress, None)
            .await
            .unwrap();
        assert!(store.get_task(id).unwrap().completed_at.is_none());

        store
            .update_task_status(id, TaskStatus::Failed, Some("boom"))
            .await
            .unwrap();
        let task = store.get_task(id).unwrap();
        assert!(task.completed_at.is_some());
        assert_eq!(task.completion_note.as_deref(), Some("boom"));
    }

    #[tokio::test]
    async fn test_run_lifecycle() {
        let store = MemoryStore::new();
        let task_id = store.add_task("idiom", "t", None);
        let run_id = store
            .insert_run(&NewRun::new(task_id, "idiom", "do it", 600))
            .await
            .unwrap();

        let run = store.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.completed_at.is_none());

        store
            .complete_run(run_id, &completion(RunStatus::Completed, 0))
            .await
            .unwrap();
        let run = store.get_run(run_id).unwrap();
        assert_eq!(run.status, RunStatus::Completed);
        assert_eq!(run.exit_code, Some(0));
        assert!(run.completed_at.is_some());
    }

    #[tokio::test]
    async fn test_recent_runs_desc_order() {
        let store = MemoryStore::new();
        let task_id = store.add_task("idiom", "t", None);
        let mut ids = Vec::new();
        for _ in 0..4 {
            ids.push(
                store
                    .insert_run(&NewRun::new(task_id, "idiom", "i", 600))
                    .await
                    .unwrap(),
            );
        }

        let recent = store.list_recent_runs("idiom", 3).await.unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].id, ids[3]);
        assert_eq!(recent[1].id, ids[2]);
        assert_eq!(recent[2].id, ids[1]);
    }

    #[tokio::test]
    async fn test_stale_running_runs() {
        let store = MemoryStore::new();
        let task_id = store.add_task("idiom", "t", None);
        let old = store
            .insert_run(&NewRun::new(task_id, "idiom", "i", 600))
            .await
            .unwrap();
        let fresh = store
            .insert_run(&NewRun::new(task_id, "idiom", "i", 600))
            .await
            .unwrap();
        store.backdate_run(old, Utc::now() - Duration::hours(2));

        let stale = store
            .list_stale_running_runs(Utc::now() - Duration::minutes(20))
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, old);
        assert_ne!(stale[0].id, fresh);
    }

    #[tokio::test]
    async fn test_evaluations_by_run_set() {
        let store = MemoryStore::new();
        for run_id in [1, 2, 3] {
            store
                .insert_evaluation(&Evaluation {
                    run_id,
                    task_id: 1,
                    overall_score: 4.0,
                    failure_category: None,
                    evaluation_details: serde_json::json!({}),
                    improvement_suggestions: vec![],
                    tool_usage_analysis: serde_json::json!({}),
                    error_patterns: serde_json::json!([]),
                    evaluator: "claude_code".to_string(),
                })
                .await
                .unwrap();
        }

        let evals = store.list_evaluations(&[1, 3]).await.unwrap();
        assert_eq!(evals.len(), 2);
    }

    #[tokio::test]
    async fn test_summary_upsert_overwrites() {
        let store = MemoryStore::new();
        let mut summary = ProjectSummary {
            project_id: "idiom".to_string(),
            current_status: "v1".to_string(),
            next_milestone: "m".to_string(),
            recent_progress: "p".to_string(),
            updated_at: Utc::now(),
        };
        store.upsert_project_summary(&summary).await.unwrap();
        summary.current_status = "v2".to_string();
        store.upsert_project_summary(&summary).await.unwrap();

        let stored = store.summary_for("idiom").unwrap();
        assert_eq!(stored.current_status, "v2");
    }

    #[tokio::test]
    async fn test_improvement_cooldown_window() {
        let store = MemoryStore::new();
        let record = ImprovementRecord {
            project_id: "docflow".to_string(),
            trigger_type: TriggerType::LowScore,
            trigger_details: serde_json::json!({}),
            target_files: vec![],
            changes_summary: String::new(),
            before_avg_score: 3.0,
            applied_at: Utc::now() - Duration::hours(30),
        };
        store.insert_improvement(&record).await.unwrap();

        let cutoff = Utc::now() - Duration::hours(24);
        assert!(store
            .improvements_since("docflow", cutoff)
            .await
            .unwrap()
            .is_empty());

        let recent = ImprovementRecord {
            applied_at: Utc::now() - Duration::hours(1),
            ..record
        };
        store.insert_improvement(&recent).await.unwrap();
        assert_eq!(
            store.improvements_since("docflow", cutoff).await.unwrap().len(),
            1
        );
    }
}

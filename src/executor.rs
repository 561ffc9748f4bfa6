//! Run executor
//!
//! Owns the full lifecycle of one assistant run: prompt composition, run
//! record insertion, subprocess invocation, output persistence, artifact
//! parsing, self-evaluation, and the task's terminal status. The run record
//! is created before the subprocess starts and reaches a terminal status
//! before the task does; post-run persistence failures are logged and never
//! revert a terminal status.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{error, info, warn};

use crate::config::OrchestratorConfig;
use crate::evaluator::{EvaluationContext, SelfEvaluator};
use crate::parser;
use crate::runner::{AssistantRunner, RunOutcome, RunRequest, EXIT_SPAWN_ERROR};
use crate::store::types::{NewRun, ProjectConfig, RunCompletion, RunStatus, Task, TaskStatus};
use crate::store::SharedStateStore;

/// Character cap for the run-record output preview
const PREVIEW_CHARS: usize = 5000;

/// Character caps for task completion notes
const DONE_NOTE_CHARS: usize = 1000;
const FAILED_NOTE_CHARS: usize = 500;

/// Executes one task through the assistant subprocess
pub struct RunExecutor {
    store: SharedStateStore,
    runner: Arc<dyn AssistantRunner>,
    evaluator: SelfEvaluator,
    config: Arc<OrchestratorConfig>,
}

impl RunExecutor {
    pub fn new(
        store: SharedStateStore,
        runner: Arc<dyn AssistantRunner>,
        config: Arc<OrchestratorConfig>,
    ) -> Self {
        let evaluator = SelfEvaluator::new(store.clone(), runner.clone(), config.clone());
        Self {
            store,
            runner,
            evaluator,
            config,
        }
    }

    /// Execute a task end to end. All failures are translated into entity
    /// status writes; nothing escapes to the dispatcher.
    pub async fn execute(&self, task: &Task) {
        let instruction = task.instruction();
        info!(
            task_id = task.id,
            project_id = %task.project_id,
            title = %task.title,
            "task execution started"
        );

        let project = self.resolve_project(&task.project_id).await;
        let project_dir = self.config.project_dir(&project.local_directory);

        // CLAUDE.md is context for the operator log only; the assistant reads
        // it from the working tree itself.
        if let Ok(claude_md) = std::fs::read_to_string(project_dir.join("CLAUDE.md")) {
            info!(
                task_id = task.id,
                chars = claude_md.chars().count(),
                "project CLAUDE.md present"
            );
        }

        let prompt = build_task_prompt(&task.project_id, instruction);

        let new_run = NewRun::new(
            task.id,
            &task.project_id,
            instruction,
            self.config.run_timeout.as_secs() as i64,
        );
        let run_id = match self.store.insert_run(&new_run).await {
            Ok(id) => id,
            Err(e) => {
                // Leaving the task pending makes the next poll retry it.
                error!(task_id = task.id, error = %e, "run insert failed, task stays pending");
                return;
            }
        };
        info!(task_id = task.id, run_id, "run record created");

        if let Err(e) = self
            .store
            .update_task_status(task.id, TaskStatus::InProgress, None)
            .await
        {
            warn!(task_id = task.id, error = %e, "failed to mark task in_progress");
        }

        let started = Instant::now();
        let outcome = if project_dir.exists() {
            self.runner
                .run(RunRequest {
                    prompt: &prompt,
                    working_dir: &project_dir,
                    temp_key: &format!("task_{}", task.id),
                    timeout: self.config.run_timeout,
                })
                .await
        } else {
            error!(
                task_id = task.id,
                path = %project_dir.display(),
                "project directory not found"
            );
            RunOutcome {
                success: false,
                exit_code: EXIT_SPAWN_ERROR,
                output: format!("project directory not found: {}", project_dir.display()),
            }
        };
        let duration_seconds = started.elapsed().as_secs() as i64;

        let full_output_path = self.persist_full_output(run_id, &outcome.output);

        let status = if outcome.success {
            RunStatus::Completed
        } else {
            RunStatus::Failed
        };
        let completion = RunCompletion {
            status,
            exit_code: outcome.exit_code,
            stdout_preview: truncate_chars(&outcome.output, PREVIEW_CHARS).to_string(),
            full_output_path: full_output_path.clone(),
            duration_seconds,
            completed_at: Utc::now(),
        };
        if let Err(e) = self.store.complete_run(run_id, &completion).await {
            error!(run_id, error = %e, "failed to write run terminal fields");
        }
        info!(run_id, %status, exit_code = outcome.exit_code, duration_seconds, "run finished");

        self.persist_artifacts(run_id, &task.project_id, &outcome).await;

        self.evaluator
            .evaluate(EvaluationContext {
                run_id,
                task_id: task.id,
                project_dir: &project_dir,
                instruction,
                output: &outcome.output,
                success: outcome.success,
                exit_code: outcome.exit_code,
            })
            .await;

        let (task_status, note_chars) = if outcome.success {
            (TaskStatus::Done, DONE_NOTE_CHARS)
        } else {
            (TaskStatus::Failed, FAILED_NOTE_CHARS)
        };
        let note = truncate_chars(&outcome.output, note_chars);
        if let Err(e) = self
            .store
            .update_task_status(task.id, task_status, Some(note))
            .await
        {
            error!(task_id = task.id, error = %e, "failed to write task terminal status");
        }
        info!(task_id = task.id, status = %task_status, "task finished");
    }

    async fn resolve_project(&self, project_id: &str) -> ProjectConfig {
        match self.store.get_project(project_id).await {
            Ok(Some(project)) => project,
            Ok(None) => ProjectConfig::defaults_for(project_id),
            Err(e) => {
                warn!(project_id, error = %e, "project lookup failed, using defaults");
                ProjectConfig::defaults_for(project_id)
            }
        }
    }

    /// Write the complete output to the per-run log file, returning its path
    fn persist_full_output(&self, run_id: i64, output: &str) -> Option<String> {
        let dir = self.config.runs_log_dir();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!(run_id, error = %e, "could not create runs log dir");
            return None;
        }
        let path = self.config.run_log_path(run_id);
        match std::fs::write(&path, output) {
            Ok(()) => Some(path.to_string_lossy().into_owned()),
            Err(e) => {
                warn!(run_id, error = %e, "could not persist full output");
                None
            }
        }
    }

    /// Best-effort persistence of parsed artifacts; run status is already
    /// terminal and is never reverted from here.
    async fn persist_artifacts(&self, run_id: i64, project_id: &str, outcome: &RunOutcome) {
        let calls = parser::extract_tool_calls(&outcome.output);
        if !calls.is_empty() {
            match self.store.insert_tool_calls(run_id, &calls).await {
                Ok(()) => info!(run_id, count = calls.len(), "tool calls saved"),
                Err(e) => warn!(run_id, error = %e, "failed to save tool calls"),
            }
        }

        if !outcome.success {
            return;
        }

        if let Some(summary) = parser::extract_summary(project_id, &outcome.output) {
            match self.store.upsert_project_summary(&summary).await {
                Ok(()) => info!(project_id, "project summary updated"),
                Err(e) => warn!(project_id, error = %e, "failed to save project summary"),
            }
        }

        for suggestion in parser::extract_suggestions(project_id, &outcome.output) {
            match self.store.insert_suggestion(&suggestion).await {
                Ok(()) => info!(project_id, title = %suggestion.title, "suggestion saved"),
                Err(e) => warn!(project_id, error = %e, "failed to save suggestion"),
            }
        }
    }
}

/// Truncate to at most `max_chars` characters on a char boundary
pub(crate) fn truncate_chars(s: &str, max_chars: usize) -> &str {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

/// Fixed instruction template: the task instruction plus the two fenced-block
/// request footers the parser understands.
fn build_task_prompt(project_id: &str, instruction: &str) -> String {
    format!(
        r#"## Background

A task was enqueued from the orchestrator dashboard.
Project: {project_id}

## Instruction

{instruction}

## Notes

- Keep the work short and focused
- When finished, report that the task is done
- On error, report the failure and the reason

## After completion

1. Summarize the project state in 1-2 sentences each:

```summary
現在の状態: [1-2 sentences]
次の予定: [1 sentence]
最近の進捗: [1 sentence]
```

2. Propose the next three actions for this project:

```suggestions
1. [title] - [short description]
2. [title] - [short description]
3. [title] - [short description]
```
"#
    )
}

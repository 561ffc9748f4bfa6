//! Shared fixtures for integration tests: fake assistant runners, git repo
//! scaffolding, and store seeding helpers.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use orchestrator::store::types::{
    Evaluation, FailureCategory, NewRun, RunCompletion, RunStatus,
};
use orchestrator::store::{MemoryStore, StateStore};
use orchestrator::{AssistantRunner, RunOutcome, RunRequest};

/// Sleeps for a fixed delay per invocation and records the maximum observed
/// concurrency, globally and per working directory.
pub struct RecordingRunner {
    delay: Duration,
    output: String,
    current: AtomicUsize,
    max_observed: AtomicUsize,
    per_dir: Mutex<HashMap<String, (usize, usize)>>,
}

impl RecordingRunner {
    pub fn new(delay: Duration, output: impl Into<String>) -> Self {
        Self {
            delay,
            output: output.into(),
            current: AtomicUsize::new(0),
            max_observed: AtomicUsize::new(0),
            per_dir: Mutex::new(HashMap::new()),
        }
    }

    /// Highest number of simultaneously running invocations seen
    pub fn max_concurrent(&self) -> usize {
        self.max_observed.load(Ordering::SeqCst)
    }

    /// Highest simultaneous invocations seen for one project directory
    pub fn max_concurrent_for(&self, dir_name: &str) -> usize {
        self.per_dir
            .lock()
            .unwrap()
            .get(dir_name)
            .map(|(_, max)| *max)
            .unwrap_or(0)
    }
}

#[async_trait]
impl AssistantRunner for RecordingRunner {
    async fn run(&self, request: RunRequest<'_>) -> RunOutcome {
        let dir_name = request
            .working_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_observed.fetch_max(now, Ordering::SeqCst);
        {
            let mut per_dir = self.per_dir.lock().unwrap();
            let entry = per_dir.entry(dir_name.clone()).or_insert((0, 0));
            entry.0 += 1;
            entry.1 = entry.1.max(entry.0);
        }

        tokio::time::sleep(self.delay).await;

        self.current.fetch_sub(1, Ordering::SeqCst);
        {
            let mut per_dir = self.per_dir.lock().unwrap();
            if let Some(entry) = per_dir.get_mut(&dir_name) {
                entry.0 -= 1;
            }
        }

        RunOutcome {
            success: true,
            exit_code: 0,
            output: self.output.clone(),
        }
    }
}

/// Writes a fixed set of files into the working directory before replying,
/// standing in for an assistant that edits the project tree.
pub struct WritingRunner {
    pub files: Vec<(String, String)>,
    pub output: String,
    pub exit_code: i32,
}

impl WritingRunner {
    pub fn new(files: Vec<(String, String)>, output: impl Into<String>) -> Self {
        Self {
            files,
            output: output.into(),
            exit_code: 0,
        }
    }

    pub fn failing() -> Self {
        Self {
            files: Vec::new(),
            output: String::new(),
            exit_code: 1,
        }
    }
}

#[async_trait]
impl AssistantRunner for WritingRunner {
    async fn run(&self, request: RunRequest<'_>) -> RunOutcome {
        for (path, content) in &self.files {
            let full = request.working_dir.join(path);
            if let Some(parent) = full.parent() {
                std::fs::create_dir_all(parent).unwrap();
            }
            std::fs::write(full, content).unwrap();
        }
        RunOutcome {
            success: self.exit_code == 0,
            exit_code: self.exit_code,
            output: self.output.clone(),
        }
    }
}

/// Initialize a git repository with one commit at `path`
pub fn init_git_repo(path: &Path) {
    std::fs::create_dir_all(path).unwrap();
    run_git(path, &["init", "-b", "main"]);
    run_git(path, &["config", "user.email", "test@test.com"]);
    run_git(path, &["config", "user.name", "Test"]);
    std::fs::write(path.join("README.md"), "# Test project\n").unwrap();
    run_git(path, &["add", "."]);
    run_git(path, &["commit", "-m", "Initial commit"]);
}

pub fn run_git(path: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(path)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

/// Seed one terminal run plus its evaluation for a project
pub async fn seed_evaluated_run(
    store: &MemoryStore,
    project_id: &str,
    status: RunStatus,
    score: f64,
    category: Option<FailureCategory>,
) -> i64 {
    let task_id = store.add_task(project_id, "seeded", None);
    let run_id = store
        .insert_run(&NewRun::new(task_id, project_id, "seeded", 600))
        .await
        .unwrap();
    store
        .complete_run(
            run_id,
            &RunCompletion {
                status,
                exit_code: if status == RunStatus::Failed { 1 } else { 0 },
                stdout_preview: String::new(),
                full_output_path: None,
                duration_seconds: 1,
                completed_at: Utc::now(),
            },
        )
        .await
        .unwrap();

    store
        .insert_evaluation(&Evaluation {
            run_id,
            task_id,
            overall_score: score,
            failure_category: category,
            evaluation_details: serde_json::json!({}),
            improvement_suggestions: vec![
                "create a project-specific lint skill".to_string(),
                "document the build entry points".to_string(),
            ],
            tool_usage_analysis: serde_json::json!({
                "skill_effectiveness": {
                    "ineffective_skills": [],
                    "missing_skills": ["docflow-lint"]
                },
                "agent_effectiveness": {}
            }),
            error_patterns: serde_json::json!([]),
            evaluator: "claude_code".to_string(),
        })
        .await
        .unwrap();

    run_id
}

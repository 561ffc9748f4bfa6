//! Integration tests for the improvement engine
//!
//! Exercises the full sweep against a real temp git repository: trigger
//! detection, branch creation, commit, knowledge-asset capture, cooldown,
//! and rollback on a failed improvement run.

mod support;

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use orchestrator::store::types::{
    FailureCategory, ImprovementRecord, ProjectConfig, RunStatus, TriggerType,
};
use orchestrator::store::{MemoryStore, SharedStateStore, StateStore};
use orchestrator::{ImprovementEngine, OrchestratorConfig};
use sha2::{Digest, Sha256};
use support::{init_git_repo, run_git, seed_evaluated_run, WritingRunner};

const SKILL_PATH: &str = ".claude/skills/docflow-lint.sh";
const SKILL_CONTENT: &str = "#!/bin/sh\n# Lint entry point for docflow\nexec cargo clippy\n";

const IMPROVEMENT_REPLY: &str = "\
Applied the requested improvements.

```changes
.claude/skills/docflow-lint.sh: new lint skill wrapping clippy
CLAUDE.md: recorded the failure pattern
```

```skills-created
name: docflow-lint
purpose: consistent lint entry point
usage: .claude/skills/docflow-lint.sh
---
```
";

fn test_config(root: &Path) -> Arc<OrchestratorConfig> {
    Arc::new(OrchestratorConfig {
        projects_dir: root.join("projects"),
        orchestrator_home: root.join("orchestrator"),
        ..OrchestratorConfig::default()
    })
}

async fn seed_docflow(store: &Arc<MemoryStore>, root: &Path) -> ProjectConfig {
    let project = ProjectConfig {
        id: "docflow".to_string(),
        local_directory: "docflow".to_string(),
        session_name: "orch-docflow".to_string(),
        repository_url: None,
    };
    store.add_project(project.clone());
    init_git_repo(&root.join("projects").join("docflow"));

    for _ in 0..3 {
        seed_evaluated_run(
            store,
            "docflow",
            RunStatus::Failed,
            2.0,
            Some(FailureCategory::ToolUsageError),
        )
        .await;
    }
    project
}

#[tokio::test]
async fn test_consecutive_failures_apply_improvement() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed_docflow(&store, dir.path()).await;

    let shared: SharedStateStore = store.clone();
    let runner = Arc::new(WritingRunner::new(
        vec![(SKILL_PATH.to_string(), SKILL_CONTENT.to_string())],
        IMPROVEMENT_REPLY,
    ));
    let engine = ImprovementEngine::new(shared, runner, test_config(dir.path()));
    engine.sweep().await;

    // One history row with the failure trigger.
    let improvements = store.improvements_for("docflow");
    assert_eq!(improvements.len(), 1);
    let record = &improvements[0];
    assert_eq!(record.trigger_type, TriggerType::ConsecutiveFailures);
    assert_eq!(
        record.trigger_details["failure_category"],
        "tool_usage_error"
    );
    assert!(record
        .target_files
        .contains(&SKILL_PATH.to_string()));
    assert!(record.changes_summary.contains("docflow-lint"));

    // The repo sits on a fresh improvement branch with the commit applied.
    let repo = dir.path().join("projects").join("docflow");
    let branch = run_git(&repo, &["rev-parse", "--abbrev-ref", "HEAD"]);
    assert!(branch.starts_with("auto-improvement-"), "branch: {branch}");
    let subject = run_git(&repo, &["log", "-1", "--format=%s"]);
    assert_eq!(subject, "Auto-improvement: consecutive_failures");

    // The authored skill is captured as a knowledge asset with its hash.
    let assets = store.assets_for("docflow");
    assert_eq!(assets.len(), 1);
    let asset = &assets[0];
    assert_eq!(asset.file_path, SKILL_PATH);
    assert_eq!(asset.content, SKILL_CONTENT);
    assert_eq!(asset.version, 1);
    assert!(asset.auto_generated);

    let expected_hash: String = Sha256::digest(SKILL_CONTENT.as_bytes())
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect();
    assert_eq!(asset.content_hash, expected_hash);
}

#[tokio::test]
async fn test_cooldown_blocks_new_improvement() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed_docflow(&store, dir.path()).await;

    // An improvement applied an hour ago puts the project in cooldown.
    store
        .insert_improvement(&ImprovementRecord {
            project_id: "docflow".to_string(),
            trigger_type: TriggerType::ConsecutiveFailures,
            trigger_details: serde_json::json!({}),
            target_files: vec![],
            changes_summary: String::new(),
            before_avg_score: 0.0,
            applied_at: Utc::now() - chrono::Duration::hours(1),
        })
        .await
        .unwrap();

    let shared: SharedStateStore = store.clone();
    let runner = Arc::new(WritingRunner::new(
        vec![(SKILL_PATH.to_string(), SKILL_CONTENT.to_string())],
        IMPROVEMENT_REPLY,
    ));
    let engine = ImprovementEngine::new(shared, runner, test_config(dir.path()));
    engine.sweep().await;

    // No second history row, no branch, repo untouched.
    assert_eq!(store.improvements_for("docflow").len(), 1);
    let repo = dir.path().join("projects").join("docflow");
    assert_eq!(run_git(&repo, &["rev-parse", "--abbrev-ref", "HEAD"]), "main");
    assert!(store.assets_for("docflow").is_empty());
}

#[tokio::test]
async fn test_failed_improvement_run_rolls_back_branch() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());
    seed_docflow(&store, dir.path()).await;

    let shared: SharedStateStore = store.clone();
    let engine = ImprovementEngine::new(
        shared,
        Arc::new(WritingRunner::failing()),
        test_config(dir.path()),
    );
    engine.sweep().await;

    // No history row; the repo is back on main and the improvement branch
    // is gone.
    assert!(store.improvements_for("docflow").is_empty());
    let repo = dir.path().join("projects").join("docflow");
    assert_eq!(run_git(&repo, &["rev-parse", "--abbrev-ref", "HEAD"]), "main");
    let branches = run_git(&repo, &["branch", "--list", "auto-improvement-*"]);
    assert!(branches.is_empty(), "leftover branches: {branches}");
}

#[tokio::test]
async fn test_no_trigger_means_no_improvement() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(MemoryStore::new());

    let project = ProjectConfig {
        id: "idiom".to_string(),
        local_directory: "idiom".to_string(),
        session_name: "orch-idiom".to_string(),
        repository_url: None,
    };
    store.add_project(project);
    init_git_repo(&dir.path().join("projects").join("idiom"));

    // Healthy history: two successes only.
    for _ in 0..2 {
        seed_evaluated_run(&store, "idiom", RunStatus::Completed, 9.0, None).await;
    }

    let shared: SharedStateStore = store.clone();
    let engine = ImprovementEngine::new(
        shared,
        Arc::new(WritingRunner::new(vec![], IMPROVEMENT_REPLY)),
        test_config(dir.path()),
    );
    engine.sweep().await;

    assert!(store.improvements_for("idiom").is_empty());
    let repo = dir.path().join("projects").join("idiom");
    assert_eq!(run_git(&repo, &["rev-parse", "--abbrev-ref", "HEAD"]), "main");
}

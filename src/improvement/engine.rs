//! Trigger detection, suggestion aggregation, and improvement application
//!
//! One sweep visits every project. A project is skipped while its cooldown
//! window holds an improvement; otherwise the two triggers are checked in
//! order (consecutive same-category failures first, then low average score).
//! A transient store failure aborts only that project's pass, never the
//! whole sweep.

use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{error, info, warn};

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::parser;
use crate::runner::{AssistantRunner, RunRequest};
use crate::store::types::{
    AssetType, FailureCategory, ImprovementRecord, KnowledgeAsset, ProjectConfig, RunStatus,
    TriggerType,
};
use crate::store::SharedStateStore;

use super::git::GitWorkspace;

/// Runs examined for the consecutive-failures trigger
const FAILURE_WINDOW: usize = 10;
/// Failures that must share a category to trigger
const FAILURE_STREAK: usize = 3;
/// Runs examined for the low-score trigger
const SCORE_WINDOW: usize = 5;
/// Mean score below which the low-score trigger fires
const SCORE_THRESHOLD: f64 = 5.0;

/// A detected improvement trigger and its evidence
#[derive(Debug, Clone)]
pub struct Trigger {
    pub trigger_type: TriggerType,
    pub run_ids: Vec<i64>,
    pub failure_category: Option<FailureCategory>,
    pub average_score: Option<f64>,
    pub scores: Vec<f64>,
}

impl Trigger {
    /// Trigger payload persisted with the improvement record
    pub fn details(&self) -> Value {
        match self.trigger_type {
            TriggerType::ConsecutiveFailures => json!({
                "failure_category": self.failure_category,
                "run_ids": self.run_ids,
                "count": FAILURE_STREAK,
            }),
            TriggerType::LowScore => json!({
                "average_score": self.average_score,
                "scores": self.scores,
                "run_ids": self.run_ids,
            }),
        }
    }
}

/// Improvement material aggregated across a trigger's evaluations
#[derive(Debug, Default, Clone)]
pub struct AggregatedImprovements {
    pub suggestions: Vec<String>,
    pub ineffective_skills: Vec<String>,
    pub missing_skills: Vec<String>,
    pub agent_suggestions: Vec<String>,
}

impl AggregatedImprovements {
    /// An improvement runs only when there is something concrete to do
    pub fn is_actionable(&self) -> bool {
        !self.suggestions.is_empty() || !self.missing_skills.is_empty()
    }
}

/// Detects failure patterns and applies improvements on dedicated branches
pub struct ImprovementEngine {
    store: SharedStateStore,
    runner: Arc<dyn AssistantRunner>,
    config: Arc<OrchestratorConfig>,
}

impl ImprovementEngine {
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

    /// One full pass over all projects
    pub async fn sweep(&self) {
        let projects = match self.store.list_projects().await {
            Ok(projects) => projects,
            Err(e) => {
                warn!(error = %e, "could not list projects, skipping sweep");
                return;
            }
        };

        info!(count = projects.len(), "improvement sweep started");
        for project in projects {
            if let Err(e) = self.check_project(&project).await {
                warn!(
                    project_id = %project.id,
                    error = %e,
                    transient = e.is_transient(),
                    "improvement pass aborted for project"
                );
            }
        }
    }

    /// Cooldown check, trigger detection, aggregation, and application for
    /// one project
    pub async fn check_project(&self, project: &ProjectConfig) -> OrchestratorResult<()> {
        let cooldown = chrono::Duration::from_std(self.config.improvement_cooldown)
            .unwrap_or_else(|_| chrono::Duration::hours(24));
        let cutoff = Utc::now() - cooldown;
        if !self
            .store
            .improvements_since(&project.id, cutoff)
            .await?
            .is_empty()
        {
            info!(project_id = %project.id, "in cooldown period, skipping");
            return Ok(());
        }

        let Some(trigger) = self.detect_trigger(&project.id).await? else {
            return Ok(());
        };
        info!(
            project_id = %project.id,
            trigger_type = %trigger.trigger_type,
            run_ids = ?trigger.run_ids,
            "improvement trigger detected"
        );

        let improvements = self.aggregate(&trigger.run_ids).await?;
        if !improvements.is_actionable() {
            warn!(project_id = %project.id, "no actionable improvement material, skipping");
            return Ok(());
        }
        info!(
            project_id = %project.id,
            suggestions = improvements.suggestions.len(),
            ineffective_skills = improvements.ineffective_skills.len(),
            missing_skills = improvements.missing_skills.len(),
            agent_suggestions = improvements.agent_suggestions.len(),
            "aggregated improvement material"
        );

        self.apply(project, &trigger, &improvements).await
    }

    /// First matching trigger wins: consecutive failures, then low score
    pub async fn detect_trigger(&self, project_id: &str) -> OrchestratorResult<Option<Trigger>> {
        if let Some(trigger) = self.consecutive_failures(project_id).await? {
            return Ok(Some(trigger));
        }
        self.low_average_score(project_id).await
    }

    /// The most recent three runs all failed with one shared non-null
    /// failure category
    async fn consecutive_failures(&self, project_id: &str) -> OrchestratorResult<Option<Trigger>> {
        let runs = self
            .store
            .list_recent_runs(project_id, FAILURE_WINDOW)
            .await?;
        if runs.len() < FAILURE_STREAK {
            return Ok(None);
        }

        let recent = &runs[..FAILURE_STREAK];
        if !recent.iter().all(|r| r.status == RunStatus::Failed) {
            return Ok(None);
        }

        let run_ids: Vec<i64> = recent.iter().map(|r| r.id).collect();
        let evaluations = self.store.list_evaluations(&run_ids).await?;
        let categories: Vec<FailureCategory> = evaluations
            .iter()
            .filter_map(|e| e.failure_category)
            .collect();

        if categories.len() < FAILURE_STREAK {
            return Ok(None);
        }
        let first = categories[0];
        if !categories[..FAILURE_STREAK].iter().all(|c| *c == first) {
            return Ok(None);
        }

        Ok(Some(Trigger {
            trigger_type: TriggerType::ConsecutiveFailures,
            run_ids,
            failure_category: Some(first),
            average_score: None,
            scores: Vec::new(),
        }))
    }

    /// Mean overall score across the last five evaluated runs is below 5.0
    async fn low_average_score(&self, project_id: &str) -> OrchestratorResult<Option<Trigger>> {
        let runs = self.store.list_recent_runs(project_id, SCORE_WINDOW).await?;
        if runs.len() < SCORE_WINDOW {
            return Ok(None);
        }

        let run_ids: Vec<i64> = runs.iter().map(|r| r.id).collect();
        let evaluations = self.store.list_evaluations(&run_ids).await?;
        if evaluations.len() < SCORE_WINDOW {
            return Ok(None);
        }

        let scores: Vec<f64> = evaluations.iter().map(|e| e.overall_score).collect();
        let average = scores.iter().sum::<f64>() / scores.len() as f64;
        if average >= SCORE_THRESHOLD {
            return Ok(None);
        }

        Ok(Some(Trigger {
            trigger_type: TriggerType::LowScore,
            run_ids,
            failure_category: None,
            average_score: Some(average),
            scores,
        }))
    }

    /// Union the improvement material across the trigger's evaluations,
    /// preserving first-seen order and dropping duplicates
    pub async fn aggregate(&self, run_ids: &[i64]) -> OrchestratorResult<AggregatedImprovements> {
        let evaluations = self.store.list_evaluations(run_ids).await?;
        let mut aggregated = AggregatedImprovements::default();

        for evaluation in &evaluations {
            for suggestion in &evaluation.improvement_suggestions {
                push_unique(&mut aggregated.suggestions, suggestion);
            }

            let analysis = &evaluation.tool_usage_analysis;
            for skill in str_array(analysis, "/skill_effectiveness/ineffective_skills") {
                push_unique(&mut aggregated.ineffective_skills, skill);
            }
            for skill in str_array(analysis, "/skill_effectiveness/missing_skills") {
                push_unique(&mut aggregated.missing_skills, skill);
            }
            if let Some(suggestion) = analysis
                .pointer("/agent_effectiveness/better_agent_suggestion")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
            {
                push_unique(&mut aggregated.agent_suggestions, suggestion);
            }
        }

        Ok(aggregated)
    }

    /// Drive the assistant on a new branch and commit whatever it changed.
    /// A non-zero exit or a source-control failure restores the previous
    /// branch state and deletes the new branch.
    async fn apply(
        &self,
        project: &ProjectConfig,
        trigger: &Trigger,
        improvements: &AggregatedImprovements,
    ) -> OrchestratorResult<()> {
        let project_dir = self.config.project_dir(&project.local_directory);
        if !project_dir.exists() {
            return Err(OrchestratorError::ProjectDirMissing { path: project_dir });
        }

        let timestamp = Utc::now().format("%Y%m%d-%H%M%S").to_string();
        let branch = format!("auto-improvement-{}", timestamp);
        let git = GitWorkspace::for_project(&project.id, &project_dir);

        // Remember where the tree was so a rollback lands on the real base
        // branch, whatever it is called.
        let base_branch = git.current_branch()?;
        git.create_branch(&branch)?;
        info!(project_id = %project.id, branch = %branch, base = %base_branch, "applying improvement");

        let prompt = build_improvement_prompt(&project.id, trigger, improvements);
        let outcome = self
            .runner
            .run(RunRequest {
                prompt: &prompt,
                working_dir: &project_dir,
                temp_key: &format!("improvement_{}_{}", project.id, timestamp),
                timeout: self.config.run_timeout,
            })
            .await;

        if !outcome.success {
            error!(
                project_id = %project.id,
                exit_code = outcome.exit_code,
                "improvement run failed, restoring branch state"
            );
            rollback_branch(&git, &base_branch, &branch);
            return Err(OrchestratorError::ImprovementFailed {
                exit_code: outcome.exit_code,
            });
        }

        if let Err(e) = stage_and_commit(&git, trigger, improvements) {
            error!(project_id = %project.id, error = %e, "commit failed, restoring branch state");
            rollback_branch(&git, &base_branch, &branch);
            return Err(e);
        }

        self.record(project, &project_dir, trigger, &outcome.output)
            .await?;

        info!(
            project_id = %project.id,
            branch = %branch,
            "improvement applied; review and merge manually"
        );
        Ok(())
    }

    /// Parse the reply and persist the improvement record plus knowledge
    /// assets for every changed file under `.claude/`
    async fn record(
        &self,
        project: &ProjectConfig,
        project_dir: &Path,
        trigger: &Trigger,
        output: &str,
    ) -> OrchestratorResult<()> {
        let changes = parser::extract_changes(output);
        let target_files: Vec<String> = changes
            .as_ref()
            .map(|c| c.entries.iter().map(|e| e.path.clone()).collect())
            .unwrap_or_default();

        let mut changes_summary = changes
            .map(|c| c.raw)
            .unwrap_or_else(|| "No summary provided".to_string());
        let skills = parser::extract_skills_created(output);
        if !skills.is_empty() {
            changes_summary.push_str("\n\n## Created Skills:\n");
            changes_summary.push_str(&skills.join("\n"));
        }

        let record = ImprovementRecord {
            project_id: project.id.clone(),
            trigger_type: trigger.trigger_type,
            trigger_details: trigger.details(),
            target_files: target_files.clone(),
            changes_summary,
            before_avg_score: trigger.average_score.unwrap_or(0.0),
            applied_at: Utc::now(),
        };
        self.store.insert_improvement(&record).await?;
        if !skills.is_empty() {
            info!(project_id = %project.id, count = skills.len(), "new skills documented");
        }

        for file_path in &target_files {
            if !file_path.starts_with(".claude/") {
                continue;
            }
            let content = match std::fs::read_to_string(project_dir.join(file_path)) {
                Ok(content) => content,
                // The reply may list files it never wrote; skip them.
                Err(_) => continue,
            };
            let asset = KnowledgeAsset {
                project_id: project.id.clone(),
                asset_type: AssetType::classify(file_path),
                file_path: file_path.clone(),
                content_hash: sha256_hex(&content),
                content,
                version: 1,
                auto_generated: true,
                created_by: "improvement_engine".to_string(),
            };
            match self.store.insert_knowledge_asset(&asset).await {
                Ok(()) => info!(
                    project_id = %project.id,
                    file = %file_path,
                    asset_type = ?asset.asset_type,
                    "knowledge asset recorded"
                ),
                Err(e) => warn!(
                    project_id = %project.id,
                    file = %file_path,
                    error = %e,
                    "failed to record knowledge asset"
                ),
            }
        }

        Ok(())
    }
}

fn stage_and_commit(
    git: &GitWorkspace,
    trigger: &Trigger,
    improvements: &AggregatedImprovements,
) -> OrchestratorResult<()> {
    git.stage_all()?;

    let applied: Vec<String> = improvements
        .suggestions
        .iter()
        .take(5)
        .map(|s| format!("- {}", s))
        .collect();
    let message = format!(
        "Auto-improvement: {}\n\nTrigger details: {}\n\nImprovements applied:\n{}",
        trigger.trigger_type,
        trigger.details(),
        applied.join("\n"),
    );
    git.commit(&message)
}

/// Best-effort restore to the recorded base branch; both steps tolerate
/// partial failure
fn rollback_branch(git: &GitWorkspace, base_branch: &str, branch: &str) {
    if let Err(e) = git.checkout(base_branch) {
        warn!(base_branch, error = %e, "could not return to base branch");
    }
    if let Err(e) = git.delete_branch(branch) {
        warn!(branch, error = %e, "could not delete improvement branch");
    }
}

fn push_unique(list: &mut Vec<String>, value: &str) {
    if !list.iter().any(|existing| existing == value) {
        list.push(value.to_string());
    }
}

fn str_array<'a>(value: &'a Value, pointer: &str) -> impl Iterator<Item = &'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .filter_map(Value::as_str)
}

fn sha256_hex(content: &str) -> String {
    let digest = Sha256::digest(content.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn format_list(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        return format!("  ({})", empty);
    }
    items
        .iter()
        .map(|item| format!("  - {}", item))
        .collect::<Vec<_>>()
        .join("\n")
}

fn build_improvement_prompt(
    project_id: &str,
    trigger: &Trigger,
    improvements: &AggregatedImprovements,
) -> String {
    let numbered: String = if improvements.suggestions.is_empty() {
        "  (no general suggestions)".to_string()
    } else {
        improvements
            .suggestions
            .iter()
            .enumerate()
            .map(|(i, s)| format!("{}. {}", i + 1, s))
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        r#"## Automatic improvement task - skill/agent optimization

Project: {project_id}

## Trigger

type: {trigger_type}
details: {details}

## Improvement suggestions

{numbered}

## Skill evaluation results

### Ineffective skills (consider removing):
{ineffective}

### Missing skills (create these):
{missing}

## Agent suggestions:
{agents}

## Instructions

Based on the failure patterns and suggestions above:

### 1. Skill management (highest priority)
- Check or create the `.claude/skills/` directory
- Remove or substantially rework the ineffective skills listed above
- Create the missing skills listed above
- Skill naming: `{project_id}-[purpose].sh` or `.py`
- Every skill must be runnable and documented

### 2. Agent configuration
- Check or create `.claude/agents/` as needed
- Add project-specific agent configuration: prompt templates, tool-usage
  policy, guardrails against the observed failures

### 3. Sub-agent strategy
- For complex tasks, record the sub-agent decomposition strategy in
  `.claude/subagents.md`

### 4. CLAUDE.md
- Record the failure patterns and their countermeasures
- Document the skill/agent configuration changes

### 5. Code fixes (only if needed)
- Fix root-cause code problems, but prioritize skill/agent work

Keep existing functionality working and make the changes incrementally.

## Required output

```changes
.claude/skills/[new skill].sh: [purpose]
.claude/agents/[config file]: [description]
CLAUDE.md: [what was recorded]
[other changed file]: [description]
```

```skills-created
name: [skill name]
purpose: [problem this skill solves]
usage: [how to run it]
---
name: [skill name]
...
```
"#,
        project_id = project_id,
        trigger_type = trigger.trigger_type,
        details = trigger.details(),
        numbered = numbered,
        ineffective = format_list(&improvements.ineffective_skills, "none"),
        missing = format_list(&improvements.missing_skills, "none"),
        agents = format_list(&improvements.agent_suggestions, "none"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RunOutcome;
    use crate::store::types::{Evaluation, NewRun, RunCompletion};
    use crate::store::{MemoryStore, StateStore};
    use async_trait::async_trait;

    struct NoopRunner;

    #[async_trait]
    impl AssistantRunner for NoopRunner {
        async fn run(&self, _request: RunRequest<'_>) -> RunOutcome {
            RunOutcome {
                success: true,
                exit_code: 0,
                output: String::new(),
            }
        }
    }

    fn engine(store: Arc<MemoryStore>) -> ImprovementEngine {
        ImprovementEngine::new(
            store,
            Arc::new(NoopRunner),
            Arc::new(OrchestratorConfig::default()),
        )
    }

    async fn seed_run(
        store: &MemoryStore,
        project: &str,
        status: RunStatus,
        evaluation: Option<Evaluation>,
    ) -> i64 {
        let task_id = store.add_task(project, "seed", None);
        let run_id = store
            .insert_run(&NewRun::new(task_id, project, "seed", 600))
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
        if let Some(mut eval) = evaluation {
            eval.run_id = run_id;
            eval.task_id = task_id;
            store.insert_evaluation(&eval).await.unwrap();
        }
        run_id
    }

    fn eval(score: f64, category: Option<FailureCategory>) -> Evaluation {
        Evaluation {
            run_id: 0,
            task_id: 0,
            overall_score: score,
            failure_category: category,
            evaluation_details: json!({}),
            improvement_suggestions: vec!["add retry logic".to_string()],
            tool_usage_analysis: json!({
                "skill_effectiveness": {
                    "ineffective_skills": ["stale-lint"],
                    "missing_skills": ["deploy-check"]
                },
                "agent_effectiveness": {
                    "better_agent_suggestion": "test-runner"
                }
            }),
            error_patterns: json!([]),
            evaluator: "claude_code".to_string(),
        }
    }

    #[tokio::test]
    async fn test_consecutive_failures_trigger() {
        let store = Arc::new(MemoryStore::new());
        for _ in 0..3 {
            seed_run(
                &store,
                "docflow",
                RunStatus::Failed,
                Some(eval(2.0, Some(FailureCategory::ToolUsageError))),
            )
            .await;
        }

        let trigger = engine(store)
            .detect_trigger("docflow")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(trigger.trigger_type, TriggerType::ConsecutiveFailures);
        assert_eq!(trigger.failure_category, Some(FailureCategory::ToolUsageError));
        assert_eq!(trigger.run_ids.len(), 3);
    }

    #[tokio::test]
    async fn test_mixed_categories_do_not_trigger() {
        let store = Arc::new(MemoryStore::new());
        seed_run(
            &store,
            "docflow",
            RunStatus::Failed,
            Some(eval(2.0, Some(FailureCategory::ToolUsageError))),
        )
        .await;
        seed_run(
            &store,
            "docflow",
            RunStatus::Failed,
            Some(eval(2.0, Some(FailureCategory::LogicError))),
        )
        .await;
        seed_run(
            &store,
            "docflow",
            RunStatus::Failed,
            Some(eval(2.0, Some(FailureCategory::ToolUsageError))),
        )
        .await;

        // Three failed runs but no shared category, and fewer than five runs
        // total for the score trigger.
        assert!(engine(store)
            .detect_trigger("docflow")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_recent_success_blocks_failure_trigger() {
        let store = Arc::new(MemoryStore::new());
        seed_run(
            &store,
            "docflow",
            RunStatus::Failed,
            Some(eval(2.0, Some(FailureCategory::ToolUsageError))),
        )
        .await;
        seed_run(
            &store,
            "docflow",
            RunStatus::Failed,
            Some(eval(2.0, Some(FailureCategory::ToolUsageError))),
        )
        .await;
        seed_run(&store, "docflow", RunStatus::Completed, Some(eval(9.0, None))).await;

        assert!(engine(store)
            .detect_trigger("docflow")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_low_score_trigger() {
        let store = Arc::new(MemoryStore::new());
        for score in [3.0, 4.0, 4.5, 2.0, 5.0] {
            seed_run(
                &store,
                "idiom",
                RunStatus::Completed,
                Some(eval(score, None)),
            )
            .await;
        }

        let trigger = engine(store).detect_trigger("idiom").await.unwrap().unwrap();
        assert_eq!(trigger.trigger_type, TriggerType::LowScore);
        assert_eq!(trigger.scores.len(), 5);
        assert!(trigger.average_score.unwrap() < SCORE_THRESHOLD);
    }

    #[tokio::test]
    async fn test_healthy_scores_do_not_trigger() {
        let store = Arc::new(MemoryStore::new());
        for score in [7.0, 8.0, 6.0, 9.0, 7.5] {
            seed_run(
                &store,
                "idiom",
                RunStatus::Completed,
                Some(eval(score, None)),
            )
            .await;
        }
        assert!(engine(store).detect_trigger("idiom").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_too_few_runs_do_not_trigger() {
        let store = Arc::new(MemoryStore::new());
        seed_run(&store, "idiom", RunStatus::Failed, None).await;
        assert!(engine(store).detect_trigger("idiom").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_aggregate_dedupes_preserving_order() {
        let store = Arc::new(MemoryStore::new());
        let mut run_ids = Vec::new();
        for _ in 0..3 {
            run_ids.push(
                seed_run(
                    &store,
                    "docflow",
                    RunStatus::Failed,
                    Some(eval(2.0, Some(FailureCategory::ToolUsageError))),
                )
                .await,
            );
        }

        let aggregated = engine(store).aggregate(&run_ids).await.unwrap();
        assert_eq!(aggregated.suggestions, vec!["add retry logic".to_string()]);
        assert_eq!(aggregated.ineffective_skills, vec!["stale-lint".to_string()]);
        assert_eq!(aggregated.missing_skills, vec!["deploy-check".to_string()]);
        assert_eq!(aggregated.agent_suggestions, vec!["test-runner".to_string()]);
        assert!(aggregated.is_actionable());
    }

    #[test]
    fn test_empty_aggregation_not_actionable() {
        let aggregated = AggregatedImprovements::default();
        assert!(!aggregated.is_actionable());

        let only_ineffective = AggregatedImprovements {
            ineffective_skills: vec!["x".to_string()],
            ..AggregatedImprovements::default()
        };
        assert!(!only_ineffective.is_actionable());
    }

    #[test]
    fn test_sha256_hex() {
        // Known vector for the empty string
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_prompt_embeds_material() {
        let trigger = Trigger {
            trigger_type: TriggerType::ConsecutiveFailures,
            run_ids: vec![1, 2, 3],
            failure_category: Some(FailureCategory::ToolUsageError),
            average_score: None,
            scores: Vec::new(),
        };
        let improvements = AggregatedImprovements {
            suggestions: vec!["pin the toolchain".to_string()],
            ineffective_skills: vec!["stale-lint".to_string()],
            missing_skills: vec!["deploy-check".to_string()],
            agent_suggestions: vec!["test-runner".to_string()],
        };

        let prompt = build_improvement_prompt("docflow", &trigger, &improvements);
        assert!(prompt.contains("consecutive_failures"));
        assert!(prompt.contains("1. pin the toolchain"));
        assert!(prompt.contains("stale-lint"));
        assert!(prompt.contains("deploy-check"));
        assert!(prompt.contains("test-runner"));
        assert!(prompt.contains("```changes"));
        assert!(prompt.contains("```skills-created"));
    }
}

//! Self-evaluation of completed runs
//!
//! After a run reaches a terminal status, the assistant is invoked a second
//! time to grade it. The reply must carry a `json` fence matching the
//! evaluation shape; `skill_effectiveness` and `agent_effectiveness` are
//! merged into `tool_usage_analysis` before persisting. Any failure here is
//! logged and swallowed: no evaluation row is written, and the run and task
//! keep their statuses. The gap is recoverable on later runs.

use std::path::Path;
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::executor::truncate_chars;
use crate::parser;
use crate::runner::{AssistantRunner, RunRequest};
use crate::store::types::{Evaluation, FailureCategory};
use crate::store::SharedStateStore;

/// Everything the evaluator needs from the finished run
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub run_id: i64,
    pub task_id: i64,
    pub project_dir: &'a Path,
    pub instruction: &'a str,
    pub output: &'a str,
    pub success: bool,
    pub exit_code: i32,
}

/// Grades runs through a second assistant invocation
pub struct SelfEvaluator {
    store: SharedStateStore,
    runner: Arc<dyn AssistantRunner>,
    config: Arc<OrchestratorConfig>,
}

impl SelfEvaluator {
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

    /// Evaluate one run. Never fails the caller.
    pub async fn evaluate(&self, ctx: EvaluationContext<'_>) {
        info!(run_id = ctx.run_id, "performing self-evaluation");

        let prompt = build_evaluation_prompt(&ctx);
        let outcome = self
            .runner
            .run(RunRequest {
                prompt: &prompt,
                working_dir: ctx.project_dir,
                temp_key: &format!("eval_{}", ctx.run_id),
                timeout: self.config.eval_timeout,
            })
            .await;

        if !outcome.success {
            warn!(
                run_id = ctx.run_id,
                exit_code = outcome.exit_code,
                "evaluation run failed"
            );
            return;
        }

        let Some(payload) = parser::extract_json_payload(&outcome.output) else {
            warn!(run_id = ctx.run_id, "no json fence in evaluation reply");
            return;
        };

        let value: Value = match serde_json::from_str(&payload) {
            Ok(value) => value,
            Err(e) => {
                warn!(run_id = ctx.run_id, error = %e, "evaluation JSON did not parse");
                return;
            }
        };

        let evaluation = assemble_evaluation(ctx.run_id, ctx.task_id, &value);
        log_effectiveness(ctx.run_id, &value);

        match self.store.insert_evaluation(&evaluation).await {
            Ok(()) => info!(
                run_id = ctx.run_id,
                score = evaluation.overall_score,
                "self-evaluation saved"
            ),
            Err(e) => warn!(run_id = ctx.run_id, error = %e, "failed to save evaluation"),
        }
    }
}

/// Map the raw JSON reply onto the evaluation row, merging the skill and
/// agent effectiveness sections into `tool_usage_analysis`.
fn assemble_evaluation(run_id: i64, task_id: i64, value: &Value) -> Evaluation {
    let overall_score = value
        .get("overall_score")
        .and_then(Value::as_f64)
        .unwrap_or(5.0);

    let failure_category: Option<FailureCategory> = value
        .get("failure_category")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok());

    let improvement_suggestions: Vec<String> = value
        .get("improvement_suggestions")
        .cloned()
        .and_then(|v| serde_json::from_value(v).ok())
        .unwrap_or_default();

    let mut merged = match value.get("tool_usage_analysis") {
        Some(Value::Object(map)) => map.clone(),
        _ => serde_json::Map::new(),
    };
    merged.insert(
        "skill_effectiveness".to_string(),
        value
            .get("skill_effectiveness")
            .cloned()
            .unwrap_or_else(|| json!({})),
    );
    merged.insert(
        "agent_effectiveness".to_string(),
        value
            .get("agent_effectiveness")
            .cloned()
            .unwrap_or_else(|| json!({})),
    );

    Evaluation {
        run_id,
        task_id,
        overall_score,
        failure_category,
        evaluation_details: value
            .get("evaluation_details")
            .cloned()
            .unwrap_or_else(|| json!({})),
        improvement_suggestions,
        tool_usage_analysis: Value::Object(merged),
        error_patterns: value
            .get("error_patterns")
            .cloned()
            .unwrap_or_else(|| json!([])),
        evaluator: "claude_code".to_string(),
    }
}

fn log_effectiveness(run_id: i64, value: &Value) {
    let skill_eff = value.get("skill_effectiveness");
    let agent_eff = value.get("agent_effectiveness");

    if let Some(ineffective) = skill_eff
        .and_then(|v| v.get("ineffective_skills"))
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
    {
        warn!(run_id, skills = ?ineffective, "ineffective skills detected");
    }
    if let Some(missing) = skill_eff
        .and_then(|v| v.get("missing_skills"))
        .and_then(Value::as_array)
        .filter(|a| !a.is_empty())
    {
        info!(run_id, skills = ?missing, "missing skills suggested");
    }
    if let Some(suggestion) = agent_eff
        .and_then(|v| v.get("better_agent_suggestion"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
    {
        info!(run_id, suggestion, "better agent suggested");
    }
}

/// Summarize extracted Skill/Task tool-calls for the evaluation prompt
fn tools_summary(output: &str) -> String {
    let calls = parser::extract_tool_calls(output);
    let skills: Vec<&str> = calls
        .iter()
        .filter(|c| c.tool_name == "Skill")
        .filter_map(|c| c.parameters.get("skill").map(String::as_str))
        .collect();
    let agents: Vec<&str> = calls
        .iter()
        .filter(|c| c.tool_name == "Task")
        .filter_map(|c| c.parameters.get("subagent_type").map(String::as_str))
        .collect();

    let mut summary = format!("skills used ({}):\n", skills.len());
    for skill in &skills {
        summary.push_str(&format!("  - {}\n", skill));
    }
    summary.push_str(&format!("\nagents launched ({}):\n", agents.len()));
    for agent in &agents {
        summary.push_str(&format!("  - {}\n", agent));
    }
    summary
}

fn build_evaluation_prompt(ctx: &EvaluationContext<'_>) -> String {
    format!(
        r#"You are an AI evaluating your own task execution. Grade the run below.

## Task instruction

{instruction}

## Result

success: {success}
exit code: {exit_code}

## Tools, skills and agents used

{tools}

## Output (first 3000 chars)

{output}

## Required reply

Return the evaluation as a JSON object inside a ```json fence, exactly in
this shape:

```json
{{
  "overall_score": <number 1-10>,
  "failure_category": "<on failure: tool_usage_error, skill_ineffective, agent_misconfigured, permission_error, logic_error, timeout, unknown; otherwise null>",
  "evaluation_details": {{
    "task_completion": "<did the task complete>",
    "quality": "<implementation quality>",
    "efficiency": "<efficiency>"
  }},
  "improvement_suggestions": [
    "<suggestion 1>",
    "<suggestion 2>",
    "<suggestion 3>"
  ],
  "tool_usage_analysis": {{
    "appropriate_tools": <true/false>,
    "tool_sequence": "<was the call order sensible>"
  }},
  "skill_effectiveness": {{
    "skills_used": ["<skill name>"],
    "effective_skills": ["<skills that helped>"],
    "ineffective_skills": ["<skills that did not help or caused problems>"],
    "missing_skills": ["<skills that would have helped>"]
  }},
  "agent_effectiveness": {{
    "agents_used": ["<agent types used>"],
    "appropriate_agent_choice": <true/false>,
    "agent_performance": "<per-agent performance>",
    "better_agent_suggestion": "<a better-suited agent, if any>"
  }},
  "error_patterns": [
    "<detected error pattern>"
  ]
}}
```

Notes:
- overall_score is 1-10, 10 is best
- set failure_category to null when the run succeeded
- grade skill and agent effectiveness concretely; propose deleting
  ineffective skills and creating missing ones
- give at least three concrete, actionable improvement suggestions
"#,
        instruction = ctx.instruction,
        success = ctx.success,
        exit_code = ctx.exit_code,
        tools = tools_summary(ctx.output),
        output = truncate_chars(ctx.output, 3000),
    )
}

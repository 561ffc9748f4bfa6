//! Entity types persisted through the state store
//!
//! Names are logical; the Supabase gateway maps them onto the `orch_*`
//! tables. Timestamps travel as ISO-8601 via chrono's serde support.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Static project configuration resolved from the store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Stable short slug
    pub id: String,
    /// Working-tree directory name under the projects root
    pub local_directory: String,
    /// Retained for forward compatibility; `--print` mode is session-less
    pub session_name: String,
    #[serde(default)]
    pub repository_url: Option<String>,
}

impl ProjectConfig {
    /// Fallback configuration when the store has no row for a project
    pub fn defaults_for(project_id: &str) -> Self {
        Self {
            id: project_id.to_string(),
            local_directory: project_id.to_string(),
            session_name: format!("orch-{}", project_id),
            repository_url: None,
        }
    }
}

/// Task lifecycle: `pending → in_progress → {done, failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    InProgress,
    Done,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Unit of work enqueued by the dashboard
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: i64,
    pub project_id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completion_note: Option<String>,
}

impl Task {
    /// The instruction passed to the assistant: the description when one was
    /// provided, otherwise the title.
    pub fn instruction(&self) -> &str {
        match self.description.as_deref().map(str::trim) {
            Some(d) if !d.is_empty() => d,
            _ => &self.title,
        }
    }
}

/// Run lifecycle: `running → {completed, failed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// One assistant subprocess invocation serving a task
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: i64,
    pub task_id: i64,
    pub project_id: String,
    pub instruction: String,
    pub status: RunStatus,
    #[serde(default)]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub stdout_preview: Option<String>,
    #[serde(default)]
    pub full_output_path: Option<String>,
    #[serde(default)]
    pub duration_seconds: Option<i64>,
    pub timeout_seconds: i64,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Fields for inserting a run record before the subprocess starts
#[derive(Debug, Clone, Serialize)]
pub struct NewRun {
    pub task_id: i64,
    pub project_id: String,
    pub instruction: String,
    pub status: RunStatus,
    pub timeout_seconds: i64,
}

impl NewRun {
    pub fn new(task_id: i64, project_id: &str, instruction: &str, timeout_seconds: i64) -> Self {
        Self {
            task_id,
            project_id: project_id.to_string(),
            instruction: instruction.to_string(),
            status: RunStatus::Running,
            timeout_seconds,
        }
    }
}

/// Terminal fields written once the subprocess returns or times out
#[derive(Debug, Clone, Serialize)]
pub struct RunCompletion {
    pub status: RunStatus,
    pub exit_code: i32,
    pub stdout_preview: String,
    pub full_output_path: Option<String>,
    pub duration_seconds: i64,
    pub completed_at: DateTime<Utc>,
}

/// Tool-call category used for aggregate analysis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolCategory {
    FileOperation,
    CommandExecution,
    Search,
    SkillUsage,
    AgentInvocation,
    Other,
}

/// Best-effort reconstruction of one assistant action from stdout
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Monotonic within a run, assigned in discovery order
    pub sequence_number: u32,
    pub tool_name: String,
    /// Ordered so repeated parses serialize identically
    pub parameters: BTreeMap<String, String>,
    pub category: ToolCategory,
    pub success: bool,
}

/// Categorical failure label assigned by the self-evaluator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    ToolUsageError,
    SkillIneffective,
    AgentMisconfigured,
    PermissionError,
    LogicError,
    Timeout,
    Unknown,
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::ToolUsageError => "tool_usage_error",
            Self::SkillIneffective => "skill_ineffective",
            Self::AgentMisconfigured => "agent_misconfigured",
            Self::PermissionError => "permission_error",
            Self::LogicError => "logic_error",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        };
        write!(f, "{}", s)
    }
}

/// Self-evaluation of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evaluation {
    pub run_id: i64,
    pub task_id: i64,
    /// 1-10, higher is better
    pub overall_score: f64,
    #[serde(default)]
    pub failure_category: Option<FailureCategory>,
    #[serde(default)]
    pub evaluation_details: serde_json::Value,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
    /// Includes the merged `skill_effectiveness` and `agent_effectiveness`
    #[serde(default)]
    pub tool_usage_analysis: serde_json::Value,
    #[serde(default)]
    pub error_patterns: serde_json::Value,
    pub evaluator: String,
}

/// One row per project, upserted on each successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project_id: String,
    pub current_status: String,
    pub next_milestone: String,
    pub recent_progress: String,
    pub updated_at: DateTime<Utc>,
}

/// Proposed next action, append-only
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub project_id: String,
    pub title: String,
    pub description: String,
    pub source: String,
    pub priority: i32,
    pub created_by: String,
}

/// Why an improvement was applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    ConsecutiveFailures,
    LowScore,
}

impl std::fmt::Display for TriggerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ConsecutiveFailures => write!(f, "consecutive_failures"),
            Self::LowScore => write!(f, "low_score"),
        }
    }
}

/// One row per applied improvement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementRecord {
    pub project_id: String,
    pub trigger_type: TriggerType,
    pub trigger_details: serde_json::Value,
    pub target_files: Vec<String>,
    pub changes_summary: String,
    pub before_avg_score: f64,
    pub applied_at: DateTime<Utc>,
}

/// Kind of file authored under `.claude/` during an improvement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetType {
    Skill,
    Agent,
    SubagentConfig,
    Other,
}

impl AssetType {
    /// Classify a `.claude/`-relative path
    pub fn classify(file_path: &str) -> Self {
        if file_path.contains("/skills/") {
            Self::Skill
        } else if file_path.contains("/agents/") {
            Self::Agent
        } else if file_path.contains("subagents.md") {
            Self::SubagentConfig
        } else {
            Self::Other
        }
    }
}

/// Append-only record of a `.claude/` file captured during an improvement
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeAsset {
    pub project_id: String,
    pub asset_type: AssetType,
    pub file_path: String,
    pub content: String,
    /// SHA-256 of `content`, hex-encoded
    pub content_hash: String,
    pub version: i32,
    pub auto_generated: bool,
    pub created_by: String,
}

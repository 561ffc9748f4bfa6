//! Supabase-backed state store
//!
//! Talks to the PostgREST API exposed by Supabase. Endpoint and credential
//! come from `SUPABASE_URL` / `SUPABASE_KEY`. Network failures and 5xx/429
//! responses map to transient errors; other non-success statuses are
//! permanent.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};

use super::types::{
    Evaluation, ImprovementRecord, KnowledgeAsset, NewRun, ProjectConfig, ProjectSummary, Run,
    RunCompletion, Suggestion, Task, TaskStatus, ToolCall,
};
use super::StateStore;

const PROJECTS: &str = "orch_projects";
const TASKS: &str = "orch_tasks";
const RUNS: &str = "orch_runs";
const TOOL_CALLS: &str = "orch_tool_calls";
const EVALUATIONS: &str = "orch_evaluations";
const SUMMARIES: &str = "orch_project_summaries";
const SUGGESTIONS: &str = "orch_suggestions";
const IMPROVEMENTS: &str = "orch_improvement_history";
const KNOWLEDGE_ASSETS: &str = "orch_knowledge_assets";

/// PostgREST gateway to the `orch_*` tables
pub struct SupabaseStore {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// `orch_projects` row; nullable columns fall back to slug-derived defaults
#[derive(Debug, Deserialize)]
struct ProjectRow {
    id: String,
    local_directory: Option<String>,
    resume_session_name: Option<String>,
    repository_url: Option<String>,
}

impl ProjectRow {
    fn into_config(self) -> ProjectConfig {
        let defaults = ProjectConfig::defaults_for(&self.id);
        ProjectConfig {
            local_directory: self
                .local_directory
                .filter(|d| !d.is_empty())
                .unwrap_or(defaults.local_directory),
            session_name: self
                .resume_session_name
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.session_name),
            repository_url: self.repository_url,
            id: self.id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdRow {
    id: i64,
}

#[derive(Debug, Serialize)]
struct ToolCallRow<'a> {
    run_id: i64,
    tool_name: &'a str,
    parameters: &'a std::collections::BTreeMap<String, String>,
    success: bool,
    sequence_number: u32,
    category: super::types::ToolCategory,
}

impl SupabaseStore {
    /// Build a store from `SUPABASE_URL` / `SUPABASE_KEY`
    pub fn from_env() -> OrchestratorResult<Self> {
        let base_url = std::env::var("SUPABASE_URL")
            .map_err(|_| OrchestratorError::config("SUPABASE_URL is not set"))?;
        let api_key = std::env::var("SUPABASE_KEY")
            .map_err(|_| OrchestratorError::config("SUPABASE_KEY is not set"))?;
        Self::new(base_url, api_key)
    }

    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> OrchestratorResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| OrchestratorError::config(format!("http client: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        self.http
            .request(method, self.table_url(table))
            .header("apikey", &self.api_key)
            .bearer_auth(&self.api_key)
    }

    async fn send(&self, builder: RequestBuilder, context: &str) -> OrchestratorResult<Response> {
        let response = builder.send().await.map_err(|e| {
            OrchestratorError::store_transient(format!("{}: {}", context, e))
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        let message = format!("{}: {} {}", context, status, body);
        if status.is_server_error() || status.as_u16() == 429 {
            Err(OrchestratorError::store_transient(message))
        } else {
            Err(OrchestratorError::store_permanent(message))
        }
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        query: &[(&str, String)],
        context: &str,
    ) -> OrchestratorResult<Vec<T>> {
        let builder = self.request(Method::GET, table).query(query);
        let response = self.send(builder, context).await?;
        response
            .json()
            .await
            .map_err(|e| OrchestratorError::store_permanent(format!("{}: decode: {}", context, e)))
    }

    async fn insert<T: Serialize + ?Sized>(
        &self,
        table: &str,
        body: &T,
        context: &str,
    ) -> OrchestratorResult<()> {
        let builder = self
            .request(Method::POST, table)
            .header("Prefer", "return=minimal")
            .json(body);
        self.send(builder, context).await.map(|_| ())
    }
}

/// PostgREST `in.(...)` filter for an id set
fn in_list(ids: &[i64]) -> String {
    let joined = ids
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",");
    format!("in.({})", joined)
}

#[async_trait]
impl StateStore for SupabaseStore {
    async fn health_check(&self) -> OrchestratorResult<()> {
        self.select::<IdRowStr>(
            PROJECTS,
            &[("select", "id".to_string()), ("limit", "1".to_string())],
            "health check",
        )
        .await
        .map(|_| ())
    }

    async fn list_projects(&self) -> OrchestratorResult<Vec<ProjectConfig>> {
        let rows: Vec<ProjectRow> = self
            .select(
                PROJECTS,
                &[(
                    "select",
                    "id,local_directory,resume_session_name,repository_url".to_string(),
                )],
                "list projects",
            )
            .await?;
        Ok(rows.into_iter().map(ProjectRow::into_config).collect())
    }

    async fn get_project(&self, project_id: &str) -> OrchestratorResult<Option<ProjectConfig>> {
        let rows: Vec<ProjectRow> = self
            .select(
                PROJECTS,
                &[
                    (
                        "select",
                        "id,local_directory,resume_session_name,repository_url".to_string(),
                    ),
                    ("id", format!("eq.{}", project_id)),
                    ("limit", "1".to_string()),
                ],
                "get project",
            )
            .await?;
        Ok(rows.into_iter().next().map(ProjectRow::into_config))
    }

    async fn list_pending_tasks(&self) -> OrchestratorResult<Vec<Task>> {
        self.select(
            TASKS,
            &[
                ("select", "*".to_string()),
                ("status", "eq.pending".to_string()),
                ("order", "created_at.asc".to_string()),
            ],
            "list pending tasks",
        )
        .await
    }

    async fn update_task_status(
        &self,
        task_id: i64,
        status: TaskStatus,
        completion_note: Option<&str>,
    ) -> OrchestratorResult<()> {
        let mut body = serde_json::json!({ "status": status });
        if status.is_terminal() {
            body["completed_at"] = serde_json::json!(Utc::now().to_rfc3339());
        }
        if let Some(note) = completion_note {
            body["completion_note"] = serde_json::json!(note);
        }

        let builder = self
            .request(Method::PATCH, TASKS)
            .query(&[("id", format!("eq.{}", task_id))])
            .header("Prefer", "return=minimal")
            .json(&body);
        self.send(builder, "update task status").await.map(|_| ())
    }

    async fn insert_run(&self, new_run: &NewRun) -> OrchestratorResult<i64> {
        let builder = self
            .request(Method::POST, RUNS)
            .header("Prefer", "return=representation")
            .json(new_run);
        let response = self.send(builder, "insert run").await?;
        let rows: Vec<IdRow> = response.json().await.map_err(|e| {
            OrchestratorError::store_permanent(format!("insert run: decode: {}", e))
        })?;
        rows.first()
            .map(|r| r.id)
            .ok_or_else(|| OrchestratorError::store_permanent("insert run: no id returned"))
    }

    async fn complete_run(
        &self,
        run_id: i64,
        completion: &RunCompletion,
    ) -> OrchestratorResult<()> {
        let builder = self
            .request(Method::PATCH, RUNS)
            .query(&[("id", format!("eq.{}", run_id))])
            .header("Prefer", "return=minimal")
            .json(completion);
        self.send(builder, "complete run").await.map(|_| ())
    }

    async fn list_recent_runs(
        &self,
        project_id: &str,
        limit: usize,
    ) -> OrchestratorResult<Vec<Run>> {
        self.select(
            RUNS,
            &[
                ("select", "*".to_string()),
                ("project_id", format!("eq.{}", project_id)),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ],
            "list recent runs",
        )
        .await
    }

    async fn list_stale_running_runs(
        &self,
        cutoff: DateTime<Utc>,
    ) -> OrchestratorResult<Vec<Run>> {
        self.select(
            RUNS,
            &[
                ("select", "*".to_string()),
                ("status", "eq.running".to_string()),
                ("created_at", format!("lt.{}", cutoff.to_rfc3339())),
            ],
            "list stale runs",
        )
        .await
    }

    async fn insert_tool_calls(&self, run_id: i64, calls: &[ToolCall]) -> OrchestratorResult<()> {
        if calls.is_empty() {
            return Ok(());
        }
        let rows: Vec<ToolCallRow<'_>> = calls
            .iter()
            .map(|c| ToolCallRow {
                run_id,
                tool_name: &c.tool_name,
                parameters: &c.parameters,
                success: c.success,
                sequence_number: c.sequence_number,
                category: c.category,
            })
            .collect();
        self.insert(TOOL_CALLS, &rows, "insert tool calls").await
    }

    async fn insert_evaluation(&self, evaluation: &Evaluation) -> OrchestratorResult<()> {
        self.insert(EVALUATIONS, evaluation, "insert evaluation")
            .await
    }

    async fn list_evaluations(&self, run_ids: &[i64]) -> OrchestratorResult<Vec<Evaluation>> {
        if run_ids.is_empty() {
            return Ok(Vec::new());
        }
        self.select(
            EVALUATIONS,
            &[
                ("select", "*".to_string()),
                ("run_id", in_list(run_ids)),
            ],
            "list evaluations",
        )
        .await
    }

    async fn upsert_project_summary(&self, summary: &ProjectSummary) -> OrchestratorResult<()> {
        let builder = self
            .request(Method::POST, SUMMARIES)
            .query(&[("on_conflict", "project_id".to_string())])
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(summary);
        self.send(builder, "upsert project summary").await.map(|_| ())
    }

    async fn insert_suggestion(&self, suggestion: &Suggestion) -> OrchestratorResult<()> {
        self.insert(SUGGESTIONS, suggestion, "insert suggestion")
            .await
    }

    async fn improvements_since(
        &self,
        project_id: &str,
        cutoff: DateTime<Utc>,
    ) -> OrchestratorResult<Vec<ImprovementRecord>> {
        self.select(
            IMPROVEMENTS,
            &[
                ("select", "*".to_string()),
                ("project_id", format!("eq.{}", project_id)),
                ("applied_at", format!("gte.{}", cutoff.to_rfc3339())),
            ],
            "list improvement history",
        )
        .await
    }

    async fn insert_improvement(&self, record: &ImprovementRecord) -> OrchestratorResult<()> {
        self.insert(IMPROVEMENTS, record, "insert improvement")
            .await
    }

    async fn insert_knowledge_asset(&self, asset: &KnowledgeAsset) -> OrchestratorResult<()> {
        self.insert(KNOWLEDGE_ASSETS, asset, "insert knowledge asset")
            .await
    }
}

/// Health check selects string ids; project slugs are text, not serial
#[derive(Debug, Deserialize)]
struct IdRowStr {
    #[allow(dead_code)]
    id: String,
}

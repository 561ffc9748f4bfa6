//! Fenced-block extraction
//!
//! The assistant is asked to close each reply with tagged triple-backtick
//! blocks. The tag set is closed: `summary`, `suggestions`, `changes`,
//! `skills-created`, and `json` (evaluation replies). Absent markers yield
//! `None`/empty.

use std::sync::LazyLock;

use chrono::Utc;
use regex::Regex;

use crate::store::types::{ProjectSummary, Suggestion};

static SUMMARY_FENCE: LazyLock<Regex> = LazyLock::new(|| fence("summary"));
static SUGGESTIONS_FENCE: LazyLock<Regex> = LazyLock::new(|| fence("suggestions"));
static CHANGES_FENCE: LazyLock<Regex> = LazyLock::new(|| fence("changes"));
static SKILLS_FENCE: LazyLock<Regex> = LazyLock::new(|| fence("skills-created"));
static JSON_FENCE: LazyLock<Regex> = LazyLock::new(|| fence("json"));

/// `<n>. <title> - <description>` suggestion lines
static SUGGESTION_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\.\s*(.+?)\s*-\s*(.+)$").expect("invalid suggestion pattern"));

fn fence(tag: &str) -> Regex {
    Regex::new(&format!(r"(?s)```{}\s*\n(.*?)\n```", regex::escape(tag)))
        .expect("invalid fence pattern")
}

fn fenced_body<'a>(pattern: &Regex, output: &'a str) -> Option<&'a str> {
    pattern
        .captures(output)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
}

// Labels the summary block is requested with; left side of each line.
const LABEL_CURRENT_STATUS: &str = "現在の状態:";
const LABEL_NEXT_MILESTONE: &str = "次の予定:";
const LABEL_RECENT_PROGRESS: &str = "最近の進捗:";

/// Parse the `summary` block into a project-summary payload.
///
/// Returns `None` when the block is absent or carries none of the three
/// labeled lines.
pub fn extract_summary(project_id: &str, output: &str) -> Option<ProjectSummary> {
    let body = fenced_body(&SUMMARY_FENCE, output)?;

    let mut current_status = String::new();
    let mut next_milestone = String::new();
    let mut recent_progress = String::new();

    for line in body.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix(LABEL_CURRENT_STATUS) {
            current_status = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix(LABEL_NEXT_MILESTONE) {
            next_milestone = rest.trim().to_string();
        } else if let Some(rest) = line.strip_prefix(LABEL_RECENT_PROGRESS) {
            recent_progress = rest.trim().to_string();
        }
    }

    if current_status.is_empty() && next_milestone.is_empty() && recent_progress.is_empty() {
        return None;
    }

    Some(ProjectSummary {
        project_id: project_id.to_string(),
        current_status,
        next_milestone,
        recent_progress,
        updated_at: Utc::now(),
    })
}

/// Parse the `suggestions` block into suggestion payloads.
///
/// Lines that do not match `<n>. <title> - <description>` are skipped.
pub fn extract_suggestions(project_id: &str, output: &str) -> Vec<Suggestion> {
    let Some(body) = fenced_body(&SUGGESTIONS_FENCE, output) else {
        return Vec::new();
    };

    body.lines()
        .filter_map(|line| SUGGESTION_LINE.captures(line.trim()))
        .map(|captures| Suggestion {
            project_id: project_id.to_string(),
            title: captures[1].trim().to_string(),
            description: captures[2].trim().to_string(),
            source: "ai_proposal".to_string(),
            priority: 0,
            created_by: "claude_code".to_string(),
        })
        .collect()
}

/// One `path: description` line from the `changes` block
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEntry {
    pub path: String,
    pub description: String,
}

/// The `changes` block: raw text plus the parsed file entries
#[derive(Debug, Clone)]
pub struct ChangesBlock {
    pub raw: String,
    pub entries: Vec<ChangeEntry>,
}

/// Parse the `changes` block. The target path is everything left of the
/// first colon; lines without a colon are ignored.
pub fn extract_changes(output: &str) -> Option<ChangesBlock> {
    let body = fenced_body(&CHANGES_FENCE, output)?;

    let entries = body
        .lines()
        .filter_map(|line| {
            let (path, description) = line.split_once(':')?;
            let path = path.trim();
            if path.is_empty() {
                return None;
            }
            Some(ChangeEntry {
                path: path.to_string(),
                description: description.trim().to_string(),
            })
        })
        .collect();

    Some(ChangesBlock {
        raw: body.to_string(),
        entries,
    })
}

/// Parse the `skills-created` block: stanzas separated by `---`, each
/// documenting one newly authored skill.
pub fn extract_skills_created(output: &str) -> Vec<String> {
    let Some(body) = fenced_body(&SKILLS_FENCE, output) else {
        return Vec::new();
    };

    body.split("---")
        .map(str::trim)
        .filter(|stanza| !stanza.is_empty())
        .map(str::to_string)
        .collect()
}

/// Extract the raw `json` fence body from an evaluation reply
pub fn extract_json_payload(output: &str) -> Option<String> {
    fenced_body(&JSON_FENCE, output).map(str::to_string)
}

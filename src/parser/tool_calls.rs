//! Tool-call trace reconstruction
//!
//! Scans assistant output against a fixed table of per-tool regex patterns.
//! A match means the assistant reported performing that action, so `success`
//! is recorded as true. Sequence numbers are assigned in discovery order:
//! table order first, then match position. Scanning the same output twice
//! yields identical results.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::store::types::{ToolCall, ToolCategory};

/// Per-tool extraction patterns. Capture group 1 is the tool's primary
/// parameter. Matching is case-insensitive and line-anchored where the
/// parameter runs to end of line.
static PATTERN_TABLE: LazyLock<Vec<(&'static str, Vec<Regex>)>> = LazyLock::new(|| {
    fn compile(patterns: &[&str]) -> Vec<Regex> {
        patterns
            .iter()
            .map(|p| Regex::new(&format!("(?im){}", p)).expect("invalid tool pattern"))
            .collect()
    }

    vec![
        (
            "Read",
            compile(&[
                r"Reading file[:\s]+([^\n]+)",
                r"Read\s+tool.*file_path[:\s]+([^\n]+)",
                r"cat\s+-n\s+([^\s]+)",
            ]),
        ),
        (
            "Write",
            compile(&[
                r"Writing to file[:\s]+([^\n]+)",
                r"Write\s+tool.*file_path[:\s]+([^\n]+)",
                r"Created file[:\s]+([^\n]+)",
            ]),
        ),
        (
            "Edit",
            compile(&[
                r"Editing file[:\s]+([^\n]+)",
                r"Edit\s+tool.*file_path[:\s]+([^\n]+)",
                r"Modified file[:\s]+([^\n]+)",
            ]),
        ),
        (
            "Bash",
            compile(&[
                r"Running command[:\s]+(.+?)(?:\n|$)",
                r"Bash\s+tool.*command[:\s]+(.+?)(?:\n|$)",
                r"Executing[:\s]+(.+?)(?:\n|$)",
            ]),
        ),
        (
            "Glob",
            compile(&[
                r"Searching for files matching[:\s]+([^\n]+)",
                r"Glob\s+tool.*pattern[:\s]+([^\n]+)",
                r"Finding files[:\s]+([^\n]+)",
            ]),
        ),
        (
            "Grep",
            compile(&[
                r"Searching for pattern[:\s]+([^\n]+)",
                r"Grep\s+tool.*pattern[:\s]+([^\n]+)",
                r"Grepping for[:\s]+([^\n]+)",
            ]),
        ),
        (
            "Skill",
            compile(&[
                r#"Skill\s+tool.*skill[:\s]+"?([^"\n]+)"?"#,
                r"Using skill[:\s]+([^\n]+)",
                r"Invoking skill[:\s]+([^\n]+)",
            ]),
        ),
        (
            "Task",
            compile(&[
                r#"Task\s+tool.*subagent_type[:\s]+"?([^"\n]+)"?"#,
                r"Launching agent[:\s]+([^\n]+)",
                r"Starting.*agent.*[:\s]+([^\n]+)",
            ]),
        ),
    ]
});

/// Parameter key for a tool's captured value
fn parameter_key(tool_name: &str) -> &'static str {
    match tool_name {
        "Read" | "Write" | "Edit" => "file_path",
        "Bash" => "command",
        "Glob" | "Grep" => "pattern",
        "Skill" => "skill",
        "Task" => "subagent_type",
        _ => "value",
    }
}

/// Category for a tool name
fn categorize(tool_name: &str) -> ToolCategory {
    match tool_name {
        "Read" | "Write" | "Edit" => ToolCategory::FileOperation,
        "Bash" => ToolCategory::CommandExecution,
        "Glob" | "Grep" => ToolCategory::Search,
        "Skill" => ToolCategory::SkillUsage,
        "Task" => ToolCategory::AgentInvocation,
        _ => ToolCategory::Other,
    }
}

/// Extract the tool-call trace from raw assistant output
pub fn extract_tool_calls(output: &str) -> Vec<ToolCall> {
    let mut calls = Vec::new();
    let mut sequence_number = 0u32;

    for (tool_name, patterns) in PATTERN_TABLE.iter() {
        for pattern in patterns {
            for captures in pattern.captures_iter(output) {
                let Some(value) = captures.get(1) else {
                    continue;
                };
                let mut parameters = BTreeMap::new();
                parameters.insert(
                    parameter_key(tool_name).to_string(),
                    value.as_str().trim().to_string(),
                );

                calls.push(ToolCall {
                    sequence_number,
                    tool_name: (*tool_name).to_string(),
                    parameters,
                    category: categorize(tool_name),
                    success: true,
                });
                sequence_number += 1;
            }
        }
    }

    calls
}

//! Output artifact parser
//!
//! Best-effort extraction of structure from raw assistant stdout+stderr:
//! a tool-call trace reconstructed from a fixed regex table, and a closed
//! set of fenced blocks (`summary`, `suggestions`, `changes`,
//! `skills-created`, `json`). Every extractor returns empty when its marker
//! is absent; missing structure is never an error.

pub mod blocks;
pub mod tool_calls;

pub use blocks::{
    extract_changes, extract_json_payload, extract_skills_created, extract_suggestions,
    extract_summary, ChangeEntry, ChangesBlock,
};
pub use tool_calls::extract_tool_calls;

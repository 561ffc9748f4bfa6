//! Improvement engine
//!
//! Closes the feedback loop: scans each project's recent runs for failure
//! patterns, aggregates the evaluators' improvement material, and drives an
//! assistant invocation on a dedicated branch to rework the project's
//! `.claude/` skill and agent configuration. Applied improvements are
//! surfaced as branches for human review; there is no automatic rollback of
//! a committed improvement.

pub mod engine;
pub mod git;

pub use engine::{AggregatedImprovements, ImprovementEngine, Trigger};
pub use git::GitWorkspace;

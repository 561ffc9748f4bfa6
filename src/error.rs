//! Orchestrator error types
//!
//! Every fallible boundary translates into one of these variants; workers
//! catch them, log with task/run context, and write the matching entity
//! status instead of letting the error escape.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors that can occur while orchestrating runs
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// State store operation failed. `transient` marks retry-eligible
    /// failures (network, 5xx); permanent failures surface upward.
    #[error("store error: {message}")]
    Store { message: String, transient: bool },

    /// Project working tree not present on this host
    #[error("project directory not found: {path}")]
    ProjectDirMissing { path: PathBuf },

    /// Assistant subprocess could not be spawned
    #[error("failed to spawn assistant: {message}")]
    Spawn { message: String },

    /// Assistant subprocess exceeded its wall-clock timeout
    #[error("assistant timed out after {seconds}s")]
    Timeout { seconds: u64 },

    /// Source-control command failed
    #[error("git operation failed: {operation} - {message}")]
    Git { operation: String, message: String },

    /// Improvement subprocess exited non-zero; branch state was restored
    #[error("improvement run failed with exit code {exit_code}")]
    ImprovementFailed { exit_code: i32 },

    /// Configuration error
    #[error("configuration error: {message}")]
    Config { message: String },

    /// IO error wrapper
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OrchestratorError {
    /// Create a transient (retry-eligible) store error
    pub fn store_transient(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            transient: true,
        }
    }

    /// Create a permanent store error
    pub fn store_permanent(message: impl Into<String>) -> Self {
        Self::Store {
            message: message.into(),
            transient: false,
        }
    }

    /// Create a git error
    pub fn git(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Git {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a spawn error
    pub fn spawn(message: impl Into<String>) -> Self {
        Self::Spawn {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check whether retrying at the next poll/sweep may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store { transient, .. } => *transient,
            // Git lock conflicts and repository-busy states clear on retry
            Self::Git { message, .. } => {
                let lower = message.to_lowercase();
                lower.contains("lock")
                    || lower.contains("another git process")
                    || lower.contains("timeout")
                    || lower.contains("connection")
            }
            Self::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

/// Run `op` up to `attempts` times, retrying only failures that
/// [`OrchestratorError::is_transient`] classifies as retryable and doubling
/// `delay` between tries. Permanent errors and the final attempt's error
/// surface unchanged.
pub fn retry_transient<T>(
    attempts: u32,
    mut delay: Duration,
    mut op: impl FnMut() -> OrchestratorResult<T>,
) -> OrchestratorResult<T> {
    let mut remaining = attempts.max(1);
    loop {
        remaining -= 1;
        match op() {
            Err(e) if remaining > 0 && e.is_transient() => {
                std::thread::sleep(delay);
                delay = delay.saturating_mul(2);
            }
            result => return result,
        }
    }
}

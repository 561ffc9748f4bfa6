//! Assistant subprocess runner
//!
//! The assistant invocation is the system's only side-effecting operation;
//! everything that touches a working tree goes through this seam, so tests
//! inject a fake implementation.
//!
//! Contract: `<binary> --dangerously-skip-permissions --print` with the
//! prompt piped on stdin from a temp file, CWD set to the project directory,
//! stdout+stderr captured and concatenated, hard wall-clock timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Sentinel exit code recorded when the subprocess hits its timeout
pub const EXIT_TIMEOUT: i32 = -2;

/// Sentinel exit code recorded when the subprocess could not be spawned
pub const EXIT_SPAWN_ERROR: i32 = -3;

/// One assistant invocation
#[derive(Debug, Clone, Copy)]
pub struct RunRequest<'a> {
    pub prompt: &'a str,
    /// CWD for the subprocess; must exist
    pub working_dir: &'a Path,
    /// Names the temp prompt file so concurrent runs never collide
    pub temp_key: &'a str,
    pub timeout: Duration,
}

/// What the invocation produced. Failures are encoded, never thrown: the
/// caller always gets an exit code and whatever output was captured.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub success: bool,
    pub exit_code: i32,
    /// stdout followed by stderr, lossily decoded
    pub output: String,
}

impl RunOutcome {
    fn timed_out(timeout: Duration) -> Self {
        Self {
            success: false,
            exit_code: EXIT_TIMEOUT,
            output: format!("timed out after {}s", timeout.as_secs()),
        }
    }

    fn spawn_failed(message: impl std::fmt::Display) -> Self {
        Self {
            success: false,
            exit_code: EXIT_SPAWN_ERROR,
            output: format!("failed to start assistant: {}", message),
        }
    }
}

/// Seam for invoking the assistant
#[async_trait]
pub trait AssistantRunner: Send + Sync {
    async fn run(&self, request: RunRequest<'_>) -> RunOutcome;
}

/// Spawns the real assistant binary
pub struct ClaudeRunner {
    program: String,
    args: Vec<String>,
}

impl ClaudeRunner {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: vec![
                "--dangerously-skip-permissions".to_string(),
                "--print".to_string(),
            ],
        }
    }

    /// Arbitrary program + args, for exercising the runner without the
    /// assistant installed
    pub fn with_command(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    fn prompt_path(temp_key: &str) -> PathBuf {
        std::env::temp_dir().join(format!("orchestrator_{}.txt", temp_key))
    }
}

impl Default for ClaudeRunner {
    fn default() -> Self {
        Self::new("claude")
    }
}

#[async_trait]
impl AssistantRunner for ClaudeRunner {
    async fn run(&self, request: RunRequest<'_>) -> RunOutcome {
        let prompt_path = Self::prompt_path(request.temp_key);

        if let Err(e) = tokio::fs::write(&prompt_path, request.prompt).await {
            return RunOutcome::spawn_failed(format!(
                "write prompt {}: {}",
                prompt_path.display(),
                e
            ));
        }

        let stdin = match std::fs::File::open(&prompt_path) {
            Ok(file) => Stdio::from(file),
            Err(e) => {
                let _ = tokio::fs::remove_file(&prompt_path).await;
                return RunOutcome::spawn_failed(e);
            }
        };

        debug!(
            program = %self.program,
            working_dir = %request.working_dir.display(),
            timeout_secs = request.timeout.as_secs(),
            "spawning assistant"
        );

        let spawned = Command::new(&self.program)
            .args(&self.args)
            .current_dir(request.working_dir)
            .stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // A timed-out child is abandoned by dropping its future; make
            // sure the process dies with it.
            .kill_on_drop(true)
            .spawn();

        let outcome = match spawned {
            Err(e) => RunOutcome::spawn_failed(e),
            Ok(child) => {
                match tokio::time::timeout(request.timeout, child.wait_with_output()).await {
                    Err(_) => RunOutcome::timed_out(request.timeout),
                    Ok(Err(e)) => RunOutcome::spawn_failed(e),
                    Ok(Ok(result)) => {
                        let mut output = String::from_utf8_lossy(&result.stdout).into_owned();
                        output.push_str(&String::from_utf8_lossy(&result.stderr));
                        RunOutcome {
                            success: result.status.success(),
                            exit_code: result.status.code().unwrap_or(-1),
                            output,
                        }
                    }
                }
            }
        };

        // Temp prompt files are always deleted missing-ok.
        let _ = tokio::fs::remove_file(&prompt_path).await;

        outcome
    }
}

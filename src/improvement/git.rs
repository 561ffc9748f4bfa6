//! Source-control wrapper for improvement branches
//!
//! Thin shell over the git CLI, pinned to one project working tree. Every
//! error names the project and the failing command so a sweep log reads
//! without cross-referencing. Write operations go through the shared
//! transient-retry policy in [`crate::error`]; lock-file conflicts from a
//! concurrent run usually clear within a try or two.

use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use crate::error::{retry_transient, OrchestratorError, OrchestratorResult};

const GIT_ATTEMPTS: u32 = 3;
const GIT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Git operations on one project's working tree
pub struct GitWorkspace {
    project_id: String,
    working_dir: PathBuf,
}

impl GitWorkspace {
    pub fn for_project(project_id: &str, working_dir: impl AsRef<Path>) -> Self {
        Self {
            project_id: project_id.to_string(),
            working_dir: working_dir.as_ref().to_path_buf(),
        }
    }

    /// Run one git command, returning trimmed stdout. Failures carry the
    /// project id and the rendered command.
    fn run(&self, args: &[&str]) -> OrchestratorResult<String> {
        let operation = format!("{}: git {}", self.project_id, args.join(" "));
        match Command::new("git")
            .args(args)
            .current_dir(&self.working_dir)
            .output()
        {
            Ok(output) if output.status.success() => {
                Ok(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
            }
            Ok(output) => Err(OrchestratorError::git(
                operation,
                String::from_utf8_lossy(&output.stderr).trim_end(),
            )),
            Err(e) => Err(OrchestratorError::git(operation, e.to_string())),
        }
    }

    /// Like [`Self::run`], under the transient-retry policy
    fn run_retrying(&self, args: &[&str]) -> OrchestratorResult<String> {
        retry_transient(GIT_ATTEMPTS, GIT_RETRY_DELAY, || self.run(args))
    }

    /// Branch currently checked out. The engine records this as the base to
    /// restore when an improvement rolls back.
    pub fn current_branch(&self) -> OrchestratorResult<String> {
        self.run(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    /// Whether a local branch with this name exists
    pub fn branch_exists(&self, name: &str) -> OrchestratorResult<bool> {
        Ok(!self.run(&["branch", "--list", name])?.is_empty())
    }

    /// Create and switch to a new branch from HEAD. Refuses to reuse an
    /// existing branch name; a stale branch means an earlier improvement was
    /// never cleaned up and needs a human look.
    pub fn create_branch(&self, name: &str) -> OrchestratorResult<()> {
        if self.branch_exists(name)? {
            return Err(OrchestratorError::git(
                format!("{}: git checkout -b {}", self.project_id, name),
                "branch already exists",
            ));
        }
        self.run_retrying(&["checkout", "-b", name]).map(|_| ())
    }

    /// Switch to an existing branch by name
    pub fn checkout(&self, name: &str) -> OrchestratorResult<()> {
        self.run_retrying(&["checkout", name]).map(|_| ())
    }

    /// Force-delete a branch
    pub fn delete_branch(&self, name: &str) -> OrchestratorResult<()> {
        self.run_retrying(&["branch", "-D", name]).map(|_| ())
    }

    /// Stage everything under the working tree
    pub fn stage_all(&self) -> OrchestratorResult<()> {
        self.run_retrying(&["add", "."]).map(|_| ())
    }

    /// Commit staged changes
    pub fn commit(&self, message: &str) -> OrchestratorResult<()> {
        self.run_retrying(&["commit", "-m", message]).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;
    use tempfile::tempdir;

    fn setup_git_repo() -> (tempfile::TempDir, GitWorkspace) {
        let dir = tempdir().unwrap();

        Command::new("git")
            .args(["init", "-b", "main"])
            .current_dir(dir.path())
            .output()
            .unwrap();
        Command::new("git")
            .args(["config", "user.email", "test@test.com"])
            .current_dir(dir.path())
            .output()
            .unwrap();
        Command::new("git")
            .args(["config", "user.name", "Test"])
            .current_dir(dir.path())
            .output()
            .unwrap();

        std::fs::write(dir.path().join("README.md"), "# Test").unwrap();
        Command::new("git")
            .args(["add", "."])
            .current_dir(dir.path())
            .output()
            .unwrap();
        Command::new("git")
            .args(["commit", "-m", "Initial commit"])
            .current_dir(dir.path())
            .output()
            .unwrap();

        let git = GitWorkspace::for_project("test-project", dir.path());
        (dir, git)
    }

    #[test]
    fn test_create_and_delete_branch() {
        let (_dir, git) = setup_git_repo();

        git.create_branch("auto-improvement-test").unwrap();
        assert_eq!(git.current_branch().unwrap(), "auto-improvement-test");
        assert!(git.branch_exists("auto-improvement-test").unwrap());

        git.checkout("main").unwrap();
        assert_eq!(git.current_branch().unwrap(), "main");

        git.delete_branch("auto-improvement-test").unwrap();
        assert!(!git.branch_exists("auto-improvement-test").unwrap());
    }

    #[test]
    fn test_create_branch_refuses_existing_name() {
        let (_dir, git) = setup_git_repo();

        git.create_branch("auto-improvement-test").unwrap();
        git.checkout("main").unwrap();

        let err = git.create_branch("auto-improvement-test").unwrap_err();
        assert!(err.to_string().contains("branch already exists"));
        // The working tree stays where it was.
        assert_eq!(git.current_branch().unwrap(), "main");
    }

    #[test]
    fn test_stage_and_commit() {
        let (dir, git) = setup_git_repo();

        std::fs::write(dir.path().join("skill.sh"), "#!/bin/sh\n").unwrap();
        git.stage_all().unwrap();
        git.commit("Auto-improvement: low_score").unwrap();

        let subject = git.run(&["log", "-1", "--format=%s"]).unwrap();
        assert_eq!(subject, "Auto-improvement: low_score");
    }

    #[test]
    fn test_errors_name_project_and_command() {
        let (_dir, git) = setup_git_repo();
        let err = git.delete_branch("never-created").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("test-project"));
        assert!(message.contains("branch -D never-created"));
    }
}

//! Git metadata queries
//!
//! `git` is spawned directly (no shell) in the repository directory. A
//! non-zero exit is a [`ToolInvocationError`] whose exit code the process
//! forwards.

use cwd_exec::{CommandSpec, ExecError, ExitState};
use std::path::PathBuf;

/// Read-only repository metadata needed for a release name
pub trait Vcs {
    /// Abbreviated hash of HEAD
    fn short_hash(&self) -> Result<String, GitError>;

    /// Name of the checked-out branch
    fn branch(&self) -> Result<String, GitError>;

    /// Number of first-parent commits reachable from HEAD
    fn commit_count(&self) -> Result<u64, GitError>;
}

/// A version-control command exited unsuccessfully
#[derive(Debug, thiserror::Error)]
#[error("`{command}` failed with {status}: {stderr}")]
pub struct ToolInvocationError {
    pub command: String,
    pub status: ExitState,
    /// Captured stderr, trimmed
    pub stderr: String,
}

/// Git query errors
#[derive(Debug, thiserror::Error)]
pub enum GitError {
    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Tool(#[from] ToolInvocationError),

    #[error("Unexpected output from `{command}`: {output:?}")]
    UnexpectedOutput { command: String, output: String },
}

impl GitError {
    /// Exit code to terminate with, forwarding git's own status
    pub fn exit_code(&self) -> i32 {
        match self {
            GitError::Exec(e) => e.exit_code(),
            GitError::Tool(e) => e.status.exit_code(),
            GitError::UnexpectedOutput { .. } => 1,
        }
    }
}

/// [`Vcs`] backed by the `git` executable
#[derive(Debug, Clone)]
pub struct GitCli {
    program: String,
    repo_dir: PathBuf,
}

impl GitCli {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            program: "git".to_string(),
            repo_dir: repo_dir.into(),
        }
    }

    /// Use a different git executable
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Run `git <args>` and return stdout without the trailing newline
    fn query(&self, args: &[&str]) -> Result<String, GitError> {
        let spec = CommandSpec::new(&self.program)
            .args(args.iter().copied())
            .current_dir(&self.repo_dir);

        let output = spec.run()?;
        if !output.success() {
            return Err(ToolInvocationError {
                command: spec.display_line(),
                status: output.status,
                stderr: output.stderr_lossy().trim().to_string(),
            }
            .into());
        }
        Ok(output.stdout_line())
    }
}

impl Vcs for GitCli {
    fn short_hash(&self) -> Result<String, GitError> {
        self.query(&["rev-parse", "--short", "HEAD"])
    }

    fn branch(&self) -> Result<String, GitError> {
        self.query(&["rev-parse", "--abbrev-ref", "HEAD"])
    }

    fn commit_count(&self) -> Result<u64, GitError> {
        let args = ["rev-list", "--count", "--first-parent", "HEAD"];
        let output = self.query(&args)?;
        output
            .trim()
            .parse()
            .map_err(|_| GitError::UnexpectedOutput {
                command: format!("{} {}", self.program, args.join(" ")),
                output,
            })
    }
}

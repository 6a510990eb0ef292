//! Direct process execution with captured output
//!
//! Spawns a program without going through a shell, captures stdout and
//! stderr as byte buffers, and reports how the child ended as an explicit
//! [`ExitState`]. The `cwd-exec` binary is a thin wrapper over
//! [`run_in_dir`].

mod runner;

pub use runner::run_in_dir;

use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, ExitStatus, Stdio};

/// Exit code reported when the program could not be spawned at all
pub const SPAWN_FAILURE_CODE: i32 = 127;

/// Offset added to a terminating signal number, matching shell convention
pub const SIGNAL_EXIT_OFFSET: i32 = 128;

/// Errors for process execution
#[derive(Debug, thiserror::Error)]
pub enum ExecError {
    #[error("No command given")]
    EmptyCommand,

    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("Failed to touch output marker {}: {source}", path.display())]
    Marker {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ExecError {
    /// Exit code the runner should terminate with for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecError::Spawn { .. } => SPAWN_FAILURE_CODE,
            _ => 1,
        }
    }
}

/// How a child process ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitState {
    /// Normal exit with a status code
    Code(i32),
    /// Terminated by a signal (unix only)
    Signal(i32),
    /// Neither a code nor a signal was reported
    Unknown,
}

impl ExitState {
    fn from_status(status: ExitStatus) -> Self {
        if let Some(code) = status.code() {
            return ExitState::Code(code);
        }
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            if let Some(signal) = status.signal() {
                return ExitState::Signal(signal);
            }
        }
        ExitState::Unknown
    }

    /// Whether the child exited with status 0
    pub fn success(&self) -> bool {
        matches!(self, ExitState::Code(0))
    }

    /// Numeric exit code to forward from the parent process
    pub fn exit_code(&self) -> i32 {
        match self {
            ExitState::Code(code) => *code,
            ExitState::Signal(signal) => SIGNAL_EXIT_OFFSET + signal,
            ExitState::Unknown => 1,
        }
    }
}

impl std::fmt::Display for ExitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitState::Code(code) => write!(f, "exit code {}", code),
            ExitState::Signal(signal) => write!(f, "signal {}", signal),
            ExitState::Unknown => write!(f, "unknown exit status"),
        }
    }
}

/// Output captured from a finished child
#[derive(Debug, Clone)]
pub struct CapturedOutput {
    pub status: ExitState,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CapturedOutput {
    pub fn success(&self) -> bool {
        self.status.success()
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Stdout with trailing CR/LF removed
    pub fn stdout_line(&self) -> String {
        self.stdout_lossy().trim_end_matches(['\r', '\n']).to_string()
    }
}

/// A program invocation: argv plus optional working directory
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
        }
    }

    /// Build from a full argv (`argv[0]` is the program)
    pub fn from_argv(argv: &[String]) -> Result<Self, ExecError> {
        let (program, args) = argv.split_first().ok_or(ExecError::EmptyCommand)?;
        Ok(Self::new(program.clone()).args(args.iter().cloned()))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.cwd = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Program and arguments joined by spaces, for display only
    pub fn display_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Spawn the program, wait for it, and capture both streams
    pub fn run(&self) -> Result<CapturedOutput, ExecError> {
        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(ref cwd) = self.cwd {
            command.current_dir(cwd);
        }

        tracing::debug!(cmd = %self.display_line(), cwd = ?self.cwd, "spawning");

        let output = command.output().map_err(|source| ExecError::Spawn {
            program: self.program.clone(),
            source,
        })?;

        Ok(CapturedOutput {
            status: ExitState::from_status(output.status),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

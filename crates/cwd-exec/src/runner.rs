//! The cwd-exec runner
//!
//! Prints the command line, working directory and marker path, touches the
//! marker file, runs the command in the given directory, then echoes its
//! output. Stderr is only echoed when the child fails.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use crate::{CommandSpec, ExecError};

/// Run `argv` inside `cwd` and echo the results to `out`.
///
/// Returns the exit code the caller should terminate with. The marker file
/// is created if missing and never truncated.
pub fn run_in_dir<W: Write>(
    cwd: &Path,
    marker: &Path,
    argv: &[String],
    out: &mut W,
) -> Result<i32, ExecError> {
    let spec = CommandSpec::from_argv(argv)?.current_dir(cwd);

    writeln!(out, "CMD: {}", spec.display_line())?;
    writeln!(out, "CWD: {}", cwd.display())?;
    writeln!(out, "OUT: {}", marker.display())?;

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(marker)
        .map_err(|source| ExecError::Marker {
            path: marker.to_path_buf(),
            source,
        })?;

    let output = spec.run()?;

    writeln!(out, "{}", output.stdout_lossy())?;
    if !output.success() {
        tracing::debug!(status = %output.status, "command failed");
        writeln!(out, "{}", output.stderr_lossy())?;
    }

    Ok(output.status.exit_code())
}

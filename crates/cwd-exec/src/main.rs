//! cwd-exec entrypoint
//!
//! Usage: cwd-exec <CWD> <OUTPUT_MARKER> <COMMAND>...

use std::io;
use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "cwd-exec")]
#[command(about = "Run a command in a working directory and forward its exit status", version)]
struct Cli {
    /// Working directory for the command
    cwd: PathBuf,

    /// File to touch before running (created if missing)
    marker: PathBuf,

    /// Program and arguments to run
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();

    let cli = Cli::parse();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cwd_exec::run_in_dir(&cli.cwd, &cli.marker, &cli.command, &mut out) {
        Ok(code) => process::exit(code),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(e.exit_code());
        }
    }
}

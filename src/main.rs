//! Release Lane CLI
//!
//! Entry point for the `release-lane` command-line tool.

use clap::{Args, Parser, Subcommand};
use release_lane::{
    ArchiveManifest, EnvSnapshot, GitCli, ReleaseConfig, ReleaseError, ReleasePipeline,
};
use serde_json::{json, Map, Value};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "release-lane")]
#[command(about = "Package build output and upload the release archive", version)]
struct Cli {
    /// Enable debug logging
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Archive the staging directory, print its manifest and upload it
    Package {
        #[command(flatten)]
        config: ConfigArgs,

        /// Directory whose contents become the archive (default: package)
        #[arg(long)]
        staging_dir: Option<PathBuf>,

        /// Directory the archive is written to (default: .)
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// HTTP upload endpoint
        #[arg(long)]
        endpoint: Option<String>,

        /// Branch whose uploads go to the base FTP directory (default: master)
        #[arg(long)]
        default_branch: Option<String>,

        /// Build the archive but skip the upload step
        #[arg(long)]
        no_upload: bool,

        /// Print the run summary as JSON instead of the table
        #[arg(long)]
        json: bool,
    },

    /// Print the archive file name for the current checkout
    Version {
        #[command(flatten)]
        config: ConfigArgs,

        /// Print the full release identifier as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the manifest of an existing archive
    Manifest {
        /// Archive to inspect
        archive: PathBuf,

        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
}

/// Options shared by every command that resolves a release
#[derive(Args)]
struct ConfigArgs {
    /// Config file (default: release.toml if present)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Project name used in the archive name
    #[arg(long)]
    project: Option<String>,

    /// Product version file (default: ../product.version)
    #[arg(long)]
    version_file: Option<PathBuf>,

    /// Git repository to query (default: .)
    #[arg(long)]
    repo_dir: Option<PathBuf>,
}

impl ConfigArgs {
    fn overrides(&self) -> Map<String, Value> {
        let mut map = Map::new();
        if let Some(project) = &self.project {
            map.insert("project".to_string(), json!(project));
        }
        insert_path(&mut map, "version_file", self.version_file.as_deref());
        insert_path(&mut map, "repo_dir", self.repo_dir.as_deref());
        map
    }

    fn load(&self, extra: Map<String, Value>) -> Result<ReleaseConfig, ReleaseError> {
        let mut overrides = self.overrides();
        overrides.extend(extra);

        let loaded = ReleaseConfig::load(
            self.config.as_deref(),
            Path::new("."),
            Value::Object(overrides),
        )?;
        for source in &loaded.sources {
            tracing::debug!(origin = ?source.origin, path = ?source.path, "config layer");
        }
        Ok(loaded.config)
    }
}

fn insert_path(map: &mut Map<String, Value>, key: &str, path: Option<&Path>) {
    if let Some(path) = path {
        map.insert(key.to_string(), json!(path.to_string_lossy()));
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match cli.command {
        Commands::Package {
            config,
            staging_dir,
            output_dir,
            endpoint,
            default_branch,
            no_upload,
            json,
        } => {
            let mut extra = Map::new();
            insert_path(&mut extra, "staging_dir", staging_dir.as_deref());
            insert_path(&mut extra, "output_dir", output_dir.as_deref());
            if let Some(endpoint) = endpoint {
                extra.insert("endpoint".to_string(), json!(endpoint));
            }
            if let Some(branch) = default_branch {
                extra.insert("default_branch".to_string(), json!(branch));
            }
            run_package(&config, extra, no_upload, json)
        }
        Commands::Version { config, json } => run_version(&config, json),
        Commands::Manifest { archive, json } => run_manifest(&archive, json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        process::exit(e.exit_code());
    }
}

fn run_package(
    args: &ConfigArgs,
    extra: Map<String, Value>,
    no_upload: bool,
    json: bool,
) -> Result<(), ReleaseError> {
    let config = args.load(extra)?;
    let env = EnvSnapshot::from_process();
    let git = GitCli::new(&config.repo_dir);

    let pipeline = if no_upload {
        ReleasePipeline::offline(&config, &env, &git)
    } else {
        ReleasePipeline::new(&config, &env, &git)?
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    if json {
        let summary = pipeline.run(&mut io::sink())?;
        writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
    } else {
        let summary = pipeline.run(&mut out)?;
        tracing::info!(
            archive = %summary.archive.path.display(),
            sha256 = %summary.archive.sha256,
            "release packaged"
        );
    }
    Ok(())
}

fn run_version(args: &ConfigArgs, json: bool) -> Result<(), ReleaseError> {
    let config = args.load(Map::new())?;
    let env = EnvSnapshot::from_process();
    let git = GitCli::new(&config.repo_dir);

    let identifier = ReleasePipeline::offline(&config, &env, &git).identifier()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&identifier)?);
    } else {
        println!("{}", identifier.archive_file_name());
    }
    Ok(())
}

fn run_manifest(archive: &Path, json: bool) -> Result<(), ReleaseError> {
    let manifest = ArchiveManifest::read(archive)?;
    if json {
        println!("{}", manifest.to_json()?);
    } else {
        print!("{}", manifest.render_table());
    }
    Ok(())
}

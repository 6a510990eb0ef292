//! Release pipeline orchestration
//!
//! Runs the stages strictly in order:
//! - resolve the release identifier (version file, then git)
//! - archive the staging directory
//! - read the archive back and print the manifest table
//! - upload with the transport selected from the environment
//!
//! A failure at any stage stops the run; nothing is rolled back.

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::archive::{ArchiveError, ArchiveSummary, Archiver};
use crate::config::{ConfigError, EnvSnapshot, ReleaseConfig};
use crate::report::{ArchiveManifest, ReportError};
use crate::upload::{UploadError, UploadOutcome, UploadRequest, UploadTarget, Uploader};
use crate::version::{GitError, Platform, ReleaseIdentifier, ResolveError, Vcs, VersionResolver};

/// Exit code for failures that carry no subprocess status
pub const GENERAL_FAILURE_CODE: i32 = 1;

/// Any failure of a release run
#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("version error: {0}")]
    Version(#[from] ResolveError),

    #[error("git error: {0}")]
    Git(#[from] GitError),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("report error: {0}")]
    Report(#[from] ReportError),

    #[error("upload error: {0}")]
    Upload(#[from] UploadError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReleaseError {
    /// Get the exit code for this error.
    ///
    /// A failed git invocation forwards git's own exit status.
    pub fn exit_code(&self) -> i32 {
        match self {
            ReleaseError::Version(ResolveError::Git(e)) | ReleaseError::Git(e) => e.exit_code(),
            _ => GENERAL_FAILURE_CODE,
        }
    }
}

/// Result type for pipeline operations
pub type ReleaseResult<T> = Result<T, ReleaseError>;

/// Everything a finished run produced
#[derive(Debug, Clone, Serialize)]
pub struct PipelineSummary {
    pub identifier: ReleaseIdentifier,
    pub archive_name: String,
    pub archive: ArchiveSummary,
    pub manifest: ArchiveManifest,
    /// Upload branch; only resolved when an upload was attempted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    pub upload: UploadOutcome,
}

/// One packaging run over a resolved configuration
pub struct ReleasePipeline<'a> {
    config: &'a ReleaseConfig,
    env: &'a EnvSnapshot,
    vcs: &'a dyn Vcs,
    platform: Platform,
    uploader: Uploader,
}

impl<'a> ReleasePipeline<'a> {
    /// Select the upload transport from `env` and prepare a run
    pub fn new(
        config: &'a ReleaseConfig,
        env: &'a EnvSnapshot,
        vcs: &'a dyn Vcs,
    ) -> ReleaseResult<Self> {
        let target = UploadTarget::from_env(env, &config.endpoint)?;
        tracing::debug!(transport = target.kind(), "selected upload transport");
        Ok(Self {
            config,
            env,
            vcs,
            platform: Platform::current(),
            uploader: Uploader::new(target),
        })
    }

    /// Prepare a run that never uploads and ignores upload variables
    pub fn offline(config: &'a ReleaseConfig, env: &'a EnvSnapshot, vcs: &'a dyn Vcs) -> Self {
        Self {
            config,
            env,
            vcs,
            platform: Platform::current(),
            uploader: Uploader::new(UploadTarget::None),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    /// Replace the uploader (e.g. one with a preconfigured HTTP client)
    pub fn with_uploader(mut self, uploader: Uploader) -> Self {
        self.uploader = uploader;
        self
    }

    /// Package without uploading, whatever the environment says
    pub fn without_upload(mut self) -> Self {
        self.uploader = Uploader::new(UploadTarget::None);
        self
    }

    pub fn upload_target(&self) -> &UploadTarget {
        self.uploader.target()
    }

    fn resolver(&self) -> VersionResolver<'_> {
        VersionResolver::new(self.vcs, &self.config.project, &self.config.version_file)
            .with_platform(self.platform)
            .with_debug(self.env.debug_build())
            .with_ci_branch(self.env.ci_branch())
    }

    /// Resolve the release identifier only
    pub fn identifier(&self) -> ReleaseResult<ReleaseIdentifier> {
        Ok(self.resolver().resolve()?)
    }

    /// Path the archive is written to
    pub fn archive_path(&self, identifier: &ReleaseIdentifier) -> PathBuf {
        self.config.output_dir.join(identifier.archive_file_name())
    }

    /// Run every stage, writing the user-facing report to `out`
    pub fn run<W: Write>(&self, out: &mut W) -> ReleaseResult<PipelineSummary> {
        let resolver = self.resolver();
        let identifier = resolver.resolve()?;
        let archive_name = identifier.archive_file_name();
        tracing::info!(archive = %archive_name, "resolved release");

        fs::create_dir_all(&self.config.output_dir)?;
        let archive_path = self.archive_path(&identifier);
        let archive = Archiver::new(&self.config.staging_dir)
            .with_excludes(&self.config.exclude)?
            .create(&archive_path)?;
        tracing::info!(
            path = %archive.path.display(),
            files = archive.file_count,
            bytes = archive.size,
            "archive written"
        );

        let manifest = ArchiveManifest::read(&archive.path)?;
        out.write_all(manifest.render_table().as_bytes())?;

        let (branch, upload) = if self.uploader.target().is_none() {
            let request = self.request(&identifier, "", &archive, &archive_name);
            (None, self.uploader.upload(&request)?)
        } else {
            let branch = resolver.branch()?;
            tracing::info!(branch = %branch, "resolved upload branch");
            let request = self.request(&identifier, &branch, &archive, &archive_name);
            let outcome = self.uploader.upload(&request)?;
            write_upload_report(out, &outcome, &archive_name)?;
            (Some(branch), outcome)
        };

        Ok(PipelineSummary {
            identifier,
            archive_name,
            archive,
            manifest,
            branch,
            upload,
        })
    }

    fn request<'r>(
        &'r self,
        identifier: &'r ReleaseIdentifier,
        branch: &'r str,
        archive: &'r ArchiveSummary,
        file_name: &'r str,
    ) -> UploadRequest<'r> {
        UploadRequest {
            project: &identifier.project,
            branch,
            default_branch: &self.config.default_branch,
            archive_path: &archive.path,
            file_name,
        }
    }
}

fn write_upload_report<W: Write>(
    out: &mut W,
    outcome: &UploadOutcome,
    archive_name: &str,
) -> io::Result<()> {
    match outcome {
        UploadOutcome::Skipped => return Ok(()),
        UploadOutcome::Http { body, .. } => writeln!(out, "{}", body)?,
        UploadOutcome::Ftp { remote_dir, bytes } if remote_dir.is_empty() => {
            writeln!(out, "Stored {} bytes", bytes)?
        }
        UploadOutcome::Ftp { remote_dir, bytes } => {
            writeln!(out, "Stored {} bytes in {}", bytes, remote_dir)?
        }
    }
    writeln!(out, "Uploaded as '{}'", archive_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::env::{FTP_HOSTNAME, FTP_PASSWORD, FTP_USERNAME, IS_DEBUG_BUILD};
    use crate::version::ToolInvocationError;
    use cwd_exec::ExitState;

    struct BrokenVcs;

    impl Vcs for BrokenVcs {
        fn short_hash(&self) -> Result<String, GitError> {
            Err(self.failure())
        }
        fn branch(&self) -> Result<String, GitError> {
            Err(self.failure())
        }
        fn commit_count(&self) -> Result<u64, GitError> {
            Err(self.failure())
        }
    }

    impl BrokenVcs {
        fn failure(&self) -> GitError {
            GitError::Tool(ToolInvocationError {
                command: "git rev-list --count --first-parent HEAD".to_string(),
                status: ExitState::Code(128),
                stderr: "fatal: not a git repository".to_string(),
            })
        }
    }

    #[test]
    fn test_git_exit_code_forwarded() {
        let dir = tempfile::TempDir::new().unwrap();
        let version_file = dir.path().join("product.version");
        fs::write(&version_file, "1.2.3\n").unwrap();
        let config = ReleaseConfig {
            version_file,
            ..ReleaseConfig::default()
        };
        let env = EnvSnapshot::empty();

        let err = ReleasePipeline::new(&config, &env, &BrokenVcs)
            .unwrap()
            .identifier()
            .unwrap_err();

        assert_eq!(err.exit_code(), 128);
    }

    #[test]
    fn test_other_errors_exit_one() {
        let err = ReleaseError::Io(io::Error::new(io::ErrorKind::Other, "boom"));
        assert_eq!(err.exit_code(), GENERAL_FAILURE_CODE);
    }

    #[test]
    fn test_incomplete_upload_config_rejected_up_front() {
        let config = ReleaseConfig::default();
        let env = EnvSnapshot::from_pairs([(FTP_HOSTNAME, "ftp.example.org"), (FTP_USERNAME, "u")]);

        let err = ReleasePipeline::new(&config, &env, &BrokenVcs).err().unwrap();
        assert!(matches!(err, ReleaseError::Config(ConfigError::MissingVariable { .. })));
        assert_eq!(err.exit_code(), GENERAL_FAILURE_CODE);
    }

    #[test]
    fn test_without_upload_overrides_env() {
        let config = ReleaseConfig::default();
        let env = EnvSnapshot::from_pairs([
            (FTP_USERNAME, "u"),
            (FTP_PASSWORD, "p"),
            (IS_DEBUG_BUILD, "1"),
        ]);

        let pipeline = ReleasePipeline::new(&config, &env, &BrokenVcs).unwrap();
        assert_eq!(pipeline.upload_target().kind(), "http");
        assert!(pipeline.without_upload().upload_target().is_none());
    }

    #[test]
    fn test_upload_report_lines() {
        let mut out = Vec::new();
        write_upload_report(
            &mut out,
            &UploadOutcome::Http {
                status: 200,
                body: "OK".to_string(),
            },
            "a.zip",
        )
        .unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "OK\nUploaded as 'a.zip'\n");

        let mut out = Vec::new();
        write_upload_report(
            &mut out,
            &UploadOutcome::Ftp {
                remote_dir: "branch/accelerator-x".to_string(),
                bytes: 10,
            },
            "a.zip",
        )
        .unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Stored 10 bytes in branch/accelerator-x\nUploaded as 'a.zip'\n"
        );
    }
}

//! Release Lane - build packaging and release upload
//!
//! Zips a staging directory into an archive named after the product
//! version and git metadata, prints the archive manifest, and uploads the
//! archive over HTTP or FTP depending on which variables the environment
//! provides.

pub mod archive;
pub mod config;
pub mod pipeline;
pub mod report;
pub mod upload;
pub mod version;

pub use archive::{ArchiveError, ArchiveSummary, Archiver};
pub use config::{ConfigError, EnvSnapshot, LoadedConfig, ReleaseConfig};
pub use pipeline::{PipelineSummary, ReleaseError, ReleasePipeline, ReleaseResult};
pub use report::{ArchiveManifest, ArchiveManifestEntry, ReportError};
pub use upload::{UploadError, UploadOutcome, UploadTarget, Uploader};
pub use version::{GitCli, Platform, ProductVersion, ReleaseIdentifier, Vcs, VersionResolver};

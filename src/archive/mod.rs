//! Release archive creation
//!
//! Walks the staging root and writes every regular file into a single
//! deflate-compressed zip. Member paths are relative to the staging root,
//! `/` separated, in sorted order. Directories never become entries.
//!
//! The archive is written next to its destination as `<name>.partial` and
//! renamed into place once finished; on failure the partial file is removed.

mod exclude;

pub use exclude::{ExcludeError, ExcludeRules};

use chrono::{DateTime, Datelike, Local, Timelike};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{self, BufReader, Read, Write};
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Suffix of the in-progress archive file
pub const PARTIAL_SUFFIX: &str = "partial";

/// Errors for archive creation
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("Staging directory not found: {}", .0.display())]
    StagingRootMissing(PathBuf),

    #[error("Cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot write archive {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Walk error: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Exclude rules error: {0}")]
    Exclude(#[from] ExcludeError),

    #[error("Path is not within staging root: {}", .0.display())]
    PathNotInStaging(PathBuf),

    #[error("Path is not valid UTF-8: {}", .0.display())]
    NonUtf8Path(PathBuf),
}

/// A file selected for the archive
#[derive(Debug, Clone)]
struct StagedFile {
    source: PathBuf,
    modified: SystemTime,
    mode: Option<u32>,
    size: u64,
}

/// Outcome of writing an archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveSummary {
    /// Final archive path
    pub path: PathBuf,
    /// Number of file members
    pub file_count: usize,
    /// Archive size in bytes
    pub size: u64,
    /// SHA-256 of the archive bytes
    pub sha256: String,
}

/// Builds the release zip from a staging root
pub struct Archiver {
    staging_root: PathBuf,
    exclude: ExcludeRules,
}

impl Archiver {
    pub fn new(staging_root: impl Into<PathBuf>) -> Self {
        Self {
            staging_root: staging_root.into(),
            exclude: ExcludeRules::default(),
        }
    }

    /// Skip members matching any of `patterns`
    pub fn with_excludes<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self, ArchiveError> {
        self.exclude = ExcludeRules::new(patterns)?;
        Ok(self)
    }

    pub fn staging_root(&self) -> &Path {
        &self.staging_root
    }

    /// Collect regular files keyed by member path
    fn collect_files(&self) -> Result<BTreeMap<String, StagedFile>, ArchiveError> {
        if !self.staging_root.is_dir() {
            return Err(ArchiveError::StagingRootMissing(self.staging_root.clone()));
        }

        let mut files = BTreeMap::new();

        for entry in WalkDir::new(&self.staging_root)
            .follow_links(false)
            .sort_by(|a, b| a.file_name().cmp(b.file_name()))
        {
            let entry = entry?;
            let path = entry.path();

            // Symlinked files are archived by content; directories only contribute files
            let metadata = fs::metadata(path).map_err(|source| ArchiveError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            if !metadata.is_file() {
                continue;
            }

            let member = member_path(&self.staging_root, path)?;
            if self.exclude.is_excluded(&member) {
                tracing::debug!(member, "excluded");
                continue;
            }

            let modified = metadata.modified().map_err(|source| ArchiveError::Read {
                path: path.to_path_buf(),
                source,
            })?;

            files.insert(
                member,
                StagedFile {
                    source: path.to_path_buf(),
                    modified,
                    mode: unix_mode(&metadata),
                    size: metadata.len(),
                },
            );
        }

        Ok(files)
    }

    /// Write the archive to `dest` and return its summary
    pub fn create(&self, dest: &Path) -> Result<ArchiveSummary, ArchiveError> {
        let files = self.collect_files()?;
        let partial = partial_path(dest);

        tracing::info!(
            staging = %self.staging_root.display(),
            files = files.len(),
            archive = %dest.display(),
            "creating archive"
        );

        if let Err(e) = write_zip(&partial, &files) {
            let _ = fs::remove_file(&partial);
            return Err(e);
        }

        fs::rename(&partial, dest).map_err(|source| {
            let _ = fs::remove_file(&partial);
            ArchiveError::Write {
                path: dest.to_path_buf(),
                source,
            }
        })?;

        let (size, sha256) = digest_file(dest).map_err(|source| ArchiveError::Read {
            path: dest.to_path_buf(),
            source,
        })?;

        Ok(ArchiveSummary {
            path: dest.to_path_buf(),
            file_count: files.len(),
            size,
            sha256,
        })
    }
}

fn write_zip(path: &Path, files: &BTreeMap<String, StagedFile>) -> Result<(), ArchiveError> {
    let write_err = |source: io::Error| ArchiveError::Write {
        path: path.to_path_buf(),
        source,
    };

    let file = File::create(path).map_err(write_err)?;
    let mut zip = ZipWriter::new(file);

    for (member, staged) in files {
        let mut options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(zip_timestamp(staged.modified))
            .large_file(needs_zip64(staged.size));
        if let Some(mode) = staged.mode {
            options = options.unix_permissions(mode);
        }

        let source = File::open(&staged.source).map_err(|source| ArchiveError::Read {
            path: staged.source.clone(),
            source,
        })?;

        zip.start_file(member.as_str(), options)?;
        copy_member(&mut BufReader::new(source), &mut zip, &staged.source, path)?;
    }

    let file = zip.finish()?;
    file.sync_all().map_err(write_err)?;
    Ok(())
}

/// Members this large need zip64 headers
fn needs_zip64(len: u64) -> bool {
    len >= u64::from(u32::MAX)
}

/// Copy one member's bytes, blaming `source` for read errors and `dest` for write errors
fn copy_member<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    source: &Path,
    dest: &Path,
) -> Result<u64, ArchiveError> {
    let mut buf = [0u8; 64 * 1024];
    let mut total = 0;
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(source_err) => {
                return Err(ArchiveError::Read {
                    path: source.to_path_buf(),
                    source: source_err,
                })
            }
        };
        writer.write_all(&buf[..n]).map_err(|source| ArchiveError::Write {
            path: dest.to_path_buf(),
            source,
        })?;
        total += n as u64;
    }
}

/// Archive member path for `path` under `root`
fn member_path(root: &Path, path: &Path) -> Result<String, ArchiveError> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| ArchiveError::PathNotInStaging(path.to_path_buf()))?;

    let mut parts = Vec::new();
    for component in rel.components() {
        match component {
            Component::Normal(part) => {
                let part = part
                    .to_str()
                    .ok_or_else(|| ArchiveError::NonUtf8Path(path.to_path_buf()))?;
                parts.push(part);
            }
            _ => return Err(ArchiveError::PathNotInStaging(path.to_path_buf())),
        }
    }

    if parts.is_empty() {
        return Err(ArchiveError::PathNotInStaging(path.to_path_buf()));
    }
    Ok(parts.join("/"))
}

/// `<dest>.partial`
fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    PathBuf::from(name)
}

/// Local modification time as a zip timestamp.
///
/// Zip timestamps cover 1980..=2107; anything outside falls back to
/// 1980-01-01 00:00:00.
fn zip_timestamp(modified: SystemTime) -> zip::DateTime {
    let local: DateTime<Local> = modified.into();
    u16::try_from(local.year())
        .ok()
        .and_then(|year| {
            zip::DateTime::from_date_and_time(
                year,
                local.month() as u8,
                local.day() as u8,
                local.hour() as u8,
                local.minute() as u8,
                local.second() as u8,
            )
            .ok()
        })
        .unwrap_or_default()
}

#[cfg(unix)]
fn unix_mode(metadata: &fs::Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(metadata.permissions().mode() & 0o777)
}

#[cfg(not(unix))]
fn unix_mode(_metadata: &fs::Metadata) -> Option<u32> {
    None
}

/// Size and SHA-256 of a file
fn digest_file(path: &Path) -> io::Result<(u64, String)> {
    let mut hasher = Sha256::new();
    let mut reader = BufReader::new(File::open(path)?);
    let size = io::copy(&mut reader, &mut hasher)?;
    Ok((size, hex::encode(hasher.finalize())))
}

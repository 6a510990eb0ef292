//! Archive manifest report
//!
//! Re-opens a finished archive read-only and lists its file members with
//! CRC32, modification time and uncompressed size.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use zip::ZipArchive;

/// Timestamp layout used in the table
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Errors reading an archive back
#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("Cannot open archive {}: {source}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot read archive {}: {source}", path.display())]
    Zip {
        path: PathBuf,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One file member of the archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifestEntry {
    /// Member path inside the archive
    pub path: String,
    pub crc32: u32,
    pub modified: NaiveDateTime,
    /// Uncompressed size in bytes
    pub size: u64,
}

/// File members of one archive, in archive order
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub archive: PathBuf,
    pub entries: Vec<ArchiveManifestEntry>,
}

impl ArchiveManifest {
    /// Read the member list from an archive on disk. Directory entries are skipped.
    pub fn read(path: &Path) -> Result<Self, ReportError> {
        let zip_err = |source| ReportError::Zip {
            path: path.to_path_buf(),
            source,
        };

        let file = File::open(path).map_err(|source| ReportError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let mut archive = ZipArchive::new(BufReader::new(file)).map_err(zip_err)?;

        let mut entries = Vec::with_capacity(archive.len());
        for i in 0..archive.len() {
            let member = archive.by_index_raw(i).map_err(zip_err)?;
            if member.is_dir() {
                continue;
            }
            entries.push(ArchiveManifestEntry {
                path: member.name().to_string(),
                crc32: member.crc32(),
                modified: member
                    .last_modified()
                    .and_then(naive_timestamp)
                    .unwrap_or_else(zip_epoch),
                size: member.size(),
            });
        }

        Ok(Self {
            archive: path.to_path_buf(),
            entries,
        })
    }

    /// Header row followed by one line per member
    pub fn render_table(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "{:<33} {:<10} {:>21} {:>12}",
            "File Name", "CRC32", "Modified      ", "Size"
        );
        for entry in &self.entries {
            let _ = writeln!(
                out,
                "{:<33} {:<10} {:>21} {:>12}",
                entry.path,
                entry.crc32,
                entry.modified.format(TIMESTAMP_FORMAT).to_string(),
                entry.size
            );
        }
        out
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Total uncompressed size of all members
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    pub fn find_entry(&self, path: &str) -> Option<&ArchiveManifestEntry> {
        self.entries.iter().find(|e| e.path == path)
    }
}

fn naive_timestamp(dt: zip::DateTime) -> Option<NaiveDateTime> {
    NaiveDate::from_ymd_opt(dt.year().into(), dt.month().into(), dt.day().into())?.and_hms_opt(
        dt.hour().into(),
        dt.minute().into(),
        dt.second().into(),
    )
}

/// 1980-01-01 00:00:00, the earliest zip timestamp
fn zip_epoch() -> NaiveDateTime {
    NaiveDate::from_ymd_opt(1980, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default()
}

//! Release identity
//!
//! Combines the product version file with git metadata into a
//! [`ReleaseIdentifier`], which names the archive:
//! `<project>-<major>.<minor>.<patch>-git<count>-<hash>-<platform>[-debug].zip`

mod git;

pub use git::{GitCli, GitError, ToolInvocationError, Vcs};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Archive file extension
pub const ARCHIVE_EXTENSION: &str = "zip";

fn version_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(\d+)\.(\d+)\.(\d+)(.*)").expect("version pattern is valid")
    })
}

/// Errors reading the product version
#[derive(Debug, thiserror::Error)]
pub enum VersionError {
    #[error("Cannot read version file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Could not determine product version from {0:?}")]
    Parse(String),
}

/// `major.minor.patch` from the product version file; any trailing tag is dropped.
///
/// Components keep the digits exactly as written (`01.02.003` stays
/// `01.02.003`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductVersion {
    pub major: String,
    pub minor: String,
    pub patch: String,
}

impl ProductVersion {
    pub fn new(major: impl Into<String>, minor: impl Into<String>, patch: impl Into<String>) -> Self {
        Self {
            major: major.into(),
            minor: minor.into(),
            patch: patch.into(),
        }
    }

    /// Parse the start of `text` as `<major>.<minor>.<patch><tag>`
    pub fn parse(text: &str) -> Result<Self, VersionError> {
        let caps = version_pattern()
            .captures(text)
            .ok_or_else(|| VersionError::Parse(text.to_string()))?;

        Ok(Self::new(&caps[1], &caps[2], &caps[3]))
    }

    pub fn from_file(path: &Path) -> Result<Self, VersionError> {
        let contents = fs::read_to_string(path).map_err(|source| VersionError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents)
    }
}

impl fmt::Display for ProductVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Platform tag embedded in archive names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    Windows,
    Mac,
    Unknown,
}

impl Platform {
    /// Platform this binary was built for
    pub fn current() -> Self {
        Self::from_os(std::env::consts::OS)
    }

    pub fn from_os(os: &str) -> Self {
        match os {
            "linux" => Platform::Linux,
            "windows" => Platform::Windows,
            "macos" => Platform::Mac,
            _ => Platform::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linux => "linux",
            Platform::Windows => "windows",
            Platform::Mac => "mac",
            Platform::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one release build. Built once per run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseIdentifier {
    pub project: String,
    pub version: ProductVersion,
    /// First-parent commit count of HEAD
    pub commit_count: u64,
    /// Abbreviated HEAD hash
    pub short_hash: String,
    pub platform: Platform,
    pub debug: bool,
}

impl ReleaseIdentifier {
    /// `<project>-<version>-git<count>-<hash>-<platform>[-debug]`
    pub fn file_stem(&self) -> String {
        let mut stem = format!(
            "{}-{}-git{}-{}-{}",
            self.project, self.version, self.commit_count, self.short_hash, self.platform
        );
        if self.debug {
            stem.push_str("-debug");
        }
        stem
    }

    /// File stem plus `.zip`
    pub fn archive_file_name(&self) -> String {
        format!("{}.{}", self.file_stem(), ARCHIVE_EXTENSION)
    }
}

/// Errors resolving the release identity
#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Git(#[from] GitError),
}

/// Derives the [`ReleaseIdentifier`] and upload branch for a run
pub struct VersionResolver<'a> {
    vcs: &'a dyn Vcs,
    project: &'a str,
    version_file: &'a Path,
    platform: Platform,
    debug: bool,
    ci_branch: Option<&'a str>,
}

impl<'a> VersionResolver<'a> {
    pub fn new(vcs: &'a dyn Vcs, project: &'a str, version_file: &'a Path) -> Self {
        Self {
            vcs,
            project,
            version_file,
            platform: Platform::current(),
            debug: false,
            ci_branch: None,
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Branch name that takes precedence over asking git
    pub fn with_ci_branch(mut self, branch: Option<&'a str>) -> Self {
        self.ci_branch = branch;
        self
    }

    /// Read the version file, then query git for count and hash.
    ///
    /// The version file is checked first so a malformed version never
    /// touches git.
    pub fn resolve(&self) -> Result<ReleaseIdentifier, ResolveError> {
        let version = ProductVersion::from_file(self.version_file)?;
        let commit_count = self.vcs.commit_count()?;
        let short_hash = self.vcs.short_hash()?;

        let identifier = ReleaseIdentifier {
            project: self.project.to_string(),
            version,
            commit_count,
            short_hash,
            platform: self.platform,
            debug: self.debug,
        };
        tracing::debug!(?identifier, "resolved release identifier");
        Ok(identifier)
    }

    /// CI branch override if present, otherwise the checked-out branch
    pub fn branch(&self) -> Result<String, GitError> {
        match self.ci_branch {
            Some(branch) => {
                tracing::debug!(branch, "using CI branch override");
                Ok(branch.to_string())
            }
            None => self.vcs.branch(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    struct FixedVcs {
        calls: Cell<u32>,
    }

    impl FixedVcs {
        fn new() -> Self {
            Self { calls: Cell::new(0) }
        }
    }

    impl Vcs for FixedVcs {
        fn short_hash(&self) -> Result<String, GitError> {
            self.calls.set(self.calls.get() + 1);
            Ok("abcd123".to_string())
        }

        fn branch(&self) -> Result<String, GitError> {
            self.calls.set(self.calls.get() + 1);
            Ok("feature-x".to_string())
        }

        fn commit_count(&self) -> Result<u64, GitError> {
            self.calls.set(self.calls.get() + 1);
            Ok(42)
        }
    }

    fn sample_identifier(debug: bool) -> ReleaseIdentifier {
        ReleaseIdentifier {
            project: "accelerator".to_string(),
            version: ProductVersion::new("1", "2", "3"),
            commit_count: 42,
            short_hash: "abcd123".to_string(),
            platform: Platform::Linux,
            debug,
        }
    }

    #[test]
    fn test_parse_discards_tag() {
        let v = ProductVersion::parse("2.5.1-dev\n").unwrap();
        assert_eq!(v, ProductVersion::new("2", "5", "1"));
        assert_eq!(v.to_string(), "2.5.1");
    }

    #[test]
    fn test_parse_plain_version() {
        let v = ProductVersion::parse("10.0.17").unwrap();
        assert_eq!(v, ProductVersion::new("10", "0", "17"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        for bad in ["v1.2", "1.2", "", "1.2.x", " 1.2.3"] {
            let err = ProductVersion::parse(bad).unwrap_err();
            assert!(matches!(err, VersionError::Parse(_)), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_parse_keeps_leading_zeros() {
        let v = ProductVersion::parse("01.02.003-beta").unwrap();
        assert_eq!(v.to_string(), "01.02.003");
    }

    #[test]
    fn test_parse_accepts_wide_components() {
        let v = ProductVersion::parse("99999999999.0.0").unwrap();
        assert_eq!(v.major, "99999999999");
        assert_eq!(v.to_string(), "99999999999.0.0");
    }

    #[test]
    fn test_archive_file_name_keeps_version_digits() {
        let identifier = ReleaseIdentifier {
            version: ProductVersion::parse("01.02.003").unwrap(),
            ..sample_identifier(false)
        };
        assert_eq!(
            identifier.archive_file_name(),
            "accelerator-01.02.003-git42-abcd123-linux.zip"
        );
    }

    #[test]
    fn test_archive_file_name() {
        assert_eq!(
            sample_identifier(false).archive_file_name(),
            "accelerator-1.2.3-git42-abcd123-linux.zip"
        );
    }

    #[test]
    fn test_archive_file_name_debug() {
        assert_eq!(
            sample_identifier(true).archive_file_name(),
            "accelerator-1.2.3-git42-abcd123-linux-debug.zip"
        );
    }

    #[test]
    fn test_platform_tags() {
        assert_eq!(Platform::from_os("linux").as_str(), "linux");
        assert_eq!(Platform::from_os("windows").as_str(), "windows");
        assert_eq!(Platform::from_os("macos").as_str(), "mac");
        assert_eq!(Platform::from_os("freebsd").as_str(), "unknown");
    }

    #[test]
    fn test_resolver_builds_identifier() {
        let dir = TempDir::new().unwrap();
        let version_file = dir.path().join("product.version");
        fs::write(&version_file, "1.2.3-rc1\n").unwrap();
        let vcs = FixedVcs::new();

        let identifier = VersionResolver::new(&vcs, "accelerator", &version_file)
            .with_platform(Platform::Linux)
            .with_debug(true)
            .resolve()
            .unwrap();

        assert_eq!(identifier, sample_identifier(true));
    }

    #[test]
    fn test_malformed_version_skips_git() {
        let dir = TempDir::new().unwrap();
        let version_file = dir.path().join("product.version");
        fs::write(&version_file, "v1.2").unwrap();
        let vcs = FixedVcs::new();

        let err = VersionResolver::new(&vcs, "accelerator", &version_file)
            .resolve()
            .unwrap_err();

        assert!(matches!(err, ResolveError::Version(VersionError::Parse(_))));
        assert_eq!(vcs.calls.get(), 0);
    }

    #[test]
    fn test_missing_version_file() {
        let dir = TempDir::new().unwrap();
        let vcs = FixedVcs::new();
        let missing = dir.path().join("product.version");

        let err = VersionResolver::new(&vcs, "accelerator", &missing)
            .resolve()
            .unwrap_err();
        assert!(matches!(err, ResolveError::Version(VersionError::Read { .. })));
    }

    #[test]
    fn test_ci_branch_override_skips_git() {
        let vcs = FixedVcs::new();
        let path = PathBuf::from("unused");
        let resolver =
            VersionResolver::new(&vcs, "accelerator", &path).with_ci_branch(Some("release-2"));

        assert_eq!(resolver.branch().unwrap(), "release-2");
        assert_eq!(vcs.calls.get(), 0);
    }

    #[test]
    fn test_branch_falls_back_to_git() {
        let vcs = FixedVcs::new();
        let path = PathBuf::from("unused");
        let resolver = VersionResolver::new(&vcs, "accelerator", &path);

        assert_eq!(resolver.branch().unwrap(), "feature-x");
    }
}

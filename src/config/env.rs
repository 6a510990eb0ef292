//! Environment snapshot
//!
//! The recognized environment variables are read once at startup into an
//! [`EnvSnapshot`]. Components receive the snapshot instead of reading the
//! process environment themselves. Empty values count as unset.

use std::collections::BTreeMap;
use std::fmt;

/// Branch name provided by Travis CI
pub const TRAVIS_BRANCH: &str = "TRAVIS_BRANCH";

/// Branch name provided by AppVeyor
pub const APPVEYOR_REPO_BRANCH: &str = "APPVEYOR_REPO_BRANCH";

/// `"1"` marks a debug build
pub const IS_DEBUG_BUILD: &str = "is_debug_build";

/// Upload user name (HTTP and FTP)
pub const FTP_USERNAME: &str = "ftp_username";

/// Upload password (HTTP and FTP)
pub const FTP_PASSWORD: &str = "ftp_password";

/// FTP server, `host` or `host:port`; selects the FTP transport
pub const FTP_HOSTNAME: &str = "ftp_hostname";

/// Remote base directory for FTP uploads
pub const FTP_DIRECTORY: &str = "ftp_directory";

/// CI branch overrides, in precedence order
pub const CI_BRANCH_VARS: &[&str] = &[TRAVIS_BRANCH, APPVEYOR_REPO_BRANCH];

/// Every variable the release pipeline reads
pub const RECOGNIZED_VARS: &[&str] = &[
    TRAVIS_BRANCH,
    APPVEYOR_REPO_BRANCH,
    IS_DEBUG_BUILD,
    FTP_USERNAME,
    FTP_PASSWORD,
    FTP_HOSTNAME,
    FTP_DIRECTORY,
];

/// Keys whose values never appear in Debug output
const SECRET_VARS: &[&str] = &[FTP_PASSWORD];

/// Recognized environment variables captured at one point in time
#[derive(Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: BTreeMap<String, String>,
}

impl EnvSnapshot {
    /// Capture the recognized variables from the process environment
    pub fn from_process() -> Self {
        Self::from_pairs(
            RECOGNIZED_VARS
                .iter()
                .filter_map(|key| std::env::var(key).ok().map(|value| (*key, value))),
        )
    }

    /// Build a snapshot from explicit pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .filter(|(_, v)| !v.is_empty())
            .collect();
        Self { vars }
    }

    /// Empty snapshot: no CI override, release build, no upload
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.vars.contains_key(key)
    }

    /// First CI-provided branch name, if any
    pub fn ci_branch(&self) -> Option<&str> {
        CI_BRANCH_VARS.iter().find_map(|key| self.get(key))
    }

    /// Whether `is_debug_build` is exactly `"1"`
    pub fn debug_build(&self) -> bool {
        self.get(IS_DEBUG_BUILD) == Some("1")
    }
}

impl fmt::Debug for EnvSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for (key, value) in &self.vars {
            if SECRET_VARS.contains(&key.as_str()) {
                map.entry(key, &"[REDACTED]");
            } else {
                map.entry(key, value);
            }
        }
        map.finish()
    }
}

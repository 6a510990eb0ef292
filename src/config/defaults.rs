//! Built-in release defaults (layer 1)
//!
//! The values every run starts from before a config file or CLI flags are
//! applied.

use serde::{Deserialize, Serialize};

/// Project name used in archive names and upload paths
pub const DEFAULT_PROJECT: &str = "accelerator";

/// Upload endpoint for the HTTP transport
pub const DEFAULT_ENDPOINT: &str = "https://builds.limetech.io/upload.php";

/// Branch uploaded without a per-branch subdirectory
pub const DEFAULT_BRANCH: &str = "master";

/// Built-in default configuration values
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuiltinDefaults {
    /// Project name (default: "accelerator")
    pub project: String,

    /// Version file, relative to the working directory (default: "../product.version")
    pub version_file: String,

    /// Staging root whose files become archive members (default: "package")
    pub staging_dir: String,

    /// Directory the archive is written to (default: ".")
    pub output_dir: String,

    /// Directory git queries run in (default: ".")
    pub repo_dir: String,

    /// HTTP upload endpoint
    pub endpoint: String,

    /// Default branch (default: "master")
    pub default_branch: String,
}

impl Default for BuiltinDefaults {
    fn default() -> Self {
        Self {
            project: DEFAULT_PROJECT.to_string(),
            version_file: "../product.version".to_string(),
            staging_dir: "package".to_string(),
            output_dir: ".".to_string(),
            repo_dir: ".".to_string(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            default_branch: DEFAULT_BRANCH.to_string(),
        }
    }
}

impl BuiltinDefaults {
    /// Convert to JSON Value for merging
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::json!({
            "project": self.project,
            "version_file": self.version_file,
            "staging_dir": self.staging_dir,
            "output_dir": self.output_dir,
            "repo_dir": self.repo_dir,
            "endpoint": self.endpoint,
            "default_branch": self.default_branch,
            "exclude": [],
        })
    }
}

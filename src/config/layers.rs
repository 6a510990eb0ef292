//! Layered release configuration
//!
//! Three layers are merged in order, later layers winning:
//! 1. Built-in defaults
//! 2. Config file (`release.toml` or `--config`)
//! 3. CLI flags
//!
//! Objects merge by key, arrays and scalars are replaced. The merged value
//! is then deserialized into [`ReleaseConfig`], rejecting unknown keys.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

use super::defaults::BuiltinDefaults;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "release.toml";

/// Which layer a value came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfigOrigin {
    Builtin,
    File,
    Cli,
}

/// A contributing layer with provenance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigSource {
    pub origin: ConfigOrigin,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// SHA-256 of the raw file bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

/// Resolved packaging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseConfig {
    pub project: String,
    pub version_file: PathBuf,
    pub staging_dir: PathBuf,
    pub output_dir: PathBuf,
    pub repo_dir: PathBuf,
    pub endpoint: String,
    pub default_branch: String,
    #[serde(default)]
    pub exclude: Vec<String>,
}

impl From<BuiltinDefaults> for ReleaseConfig {
    fn from(defaults: BuiltinDefaults) -> Self {
        Self {
            project: defaults.project,
            version_file: defaults.version_file.into(),
            staging_dir: defaults.staging_dir.into(),
            output_dir: defaults.output_dir.into(),
            repo_dir: defaults.repo_dir.into(),
            endpoint: defaults.endpoint,
            default_branch: defaults.default_branch,
            exclude: Vec::new(),
        }
    }
}

impl Default for ReleaseConfig {
    fn default() -> Self {
        BuiltinDefaults::default().into()
    }
}

impl ReleaseConfig {
    /// Merge the layers and validate the result.
    ///
    /// `file` is read when given explicitly (missing is an error); otherwise
    /// [`DEFAULT_CONFIG_FILE`] in `search_dir` is used if it exists.
    pub fn load(
        file: Option<&Path>,
        search_dir: &Path,
        cli_overrides: Value,
    ) -> Result<LoadedConfig, ConfigError> {
        let mut merged = BuiltinDefaults::default().to_value();
        let mut sources = vec![ConfigSource {
            origin: ConfigOrigin::Builtin,
            path: None,
            digest: None,
        }];

        let file = match file {
            Some(path) => Some(path.to_path_buf()),
            None => {
                let candidate = search_dir.join(DEFAULT_CONFIG_FILE);
                candidate.is_file().then_some(candidate)
            }
        };

        if let Some(path) = file {
            let (value, digest) = load_toml_file(&path)?;
            merge_into(&mut merged, value);
            sources.push(ConfigSource {
                origin: ConfigOrigin::File,
                path: Some(path),
                digest: Some(digest),
            });
        }

        if cli_overrides.as_object().is_some_and(|m| !m.is_empty()) {
            merge_into(&mut merged, cli_overrides);
            sources.push(ConfigSource {
                origin: ConfigOrigin::Cli,
                path: None,
                digest: None,
            });
        }

        let config = Self::from_value(merged)?;
        config.validate()?;

        Ok(LoadedConfig { config, sources })
    }

    fn from_value(value: Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value).map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.project.trim().is_empty() {
            return Err(ConfigError::Invalid("project must not be empty".to_string()));
        }
        if self.project.contains(['/', '\\']) {
            return Err(ConfigError::Invalid(format!(
                "project must not contain path separators: {}",
                self.project
            )));
        }
        if self.default_branch.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_branch must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Config plus the layers that produced it
#[derive(Debug, Clone)]
pub struct LoadedConfig {
    pub config: ReleaseConfig,
    pub sources: Vec<ConfigSource>,
}

/// Overlay `overlay` onto `base` in place.
///
/// Tables merge key by key; any other overlay value replaces the base.
pub fn merge_into(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base_map), Value::Object(overlay_map)) => {
            for (key, value) in overlay_map {
                match base_map.get_mut(&key) {
                    Some(existing) => merge_into(existing, value),
                    None => {
                        base_map.insert(key, value);
                    }
                }
            }
        }
        (slot, overlay) => *slot = overlay,
    }
}

fn load_toml_file(path: &Path) -> Result<(Value, String), ConfigError> {
    let bytes = fs::read(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let digest = hex::encode(Sha256::digest(&bytes));

    let contents = String::from_utf8(bytes).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: format!("Invalid UTF-8: {}", e),
    })?;

    // toml values deserialize straight into serde_json::Value
    let value: Value = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    Ok((value, digest))
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config {}: {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("{transport} upload selected but {variable} is not set")]
    MissingVariable {
        transport: &'static str,
        variable: &'static str,
    },
}

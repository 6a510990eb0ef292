//! Release configuration
//!
//! File and CLI settings are merged over built-in defaults into a
//! [`ReleaseConfig`]; secrets and CI hints come from an [`EnvSnapshot`]
//! captured once at startup.

mod defaults;
pub mod env;
mod layers;

pub use defaults::{BuiltinDefaults, DEFAULT_BRANCH, DEFAULT_ENDPOINT, DEFAULT_PROJECT};
pub use env::EnvSnapshot;
pub use layers::{
    merge_into, ConfigError, ConfigOrigin, ConfigSource, LoadedConfig, ReleaseConfig,
    DEFAULT_CONFIG_FILE,
};

//! Configuration management for the target
//!
//! Supports loading configuration from:
//! - Default values
//! - Config file passed with `--config` (JSON as written by Singer tooling, or TOML)
//! - Environment variables (TARGET_NDJSON_*)
//!
//! ## Example config file (config.json):
//! ```json
//! {
//!   "disable_collection": true,
//!   "destination_path": "./out"
//! }
//! ```
//!
//! Keys the target does not know about are ignored, so a config shared with
//! the tap can be passed through unchanged.

use config_crate::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the target
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// Skip the anonymous usage report sent at startup
    #[serde(default)]
    pub disable_collection: bool,

    /// Directory that receives the per-stream output files
    #[serde(default = "default_destination_path")]
    pub destination_path: PathBuf,
}

fn default_destination_path() -> PathBuf {
    PathBuf::from(".")
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            disable_collection: false,
            destination_path: default_destination_path(),
        }
    }
}

impl TargetConfig {
    /// Load configuration from defaults and the environment only
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(None)
    }

    /// Load configuration, layering a specific file over the defaults
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix("TARGET_NDJSON")
                .try_parsing(true)
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Get the output directory (resolves relative paths)
    pub fn output_dir(&self) -> PathBuf {
        if self.destination_path.is_absolute() {
            self.destination_path.clone()
        } else {
            std::env::current_dir()
                .unwrap_or_default()
                .join(&self.destination_path)
        }
    }
}

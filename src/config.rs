//! This module provides functionality for loading and handling the service configuration.
//!
//! It defines the `MemvaultConfig` struct, which holds the configuration parameters,
//! and a `load_config` function to load the configuration from a YAML file.
//!
//! Every field has a default, so a partial file (or no file at all) is valid.
//! Command-line flags and their environment variables override file values; see
//! [`crate::commands`].
//!
//! # Examples
//!
//! ```no_run
//! use memvault::config::{MemvaultConfig, load_config};
//!
//! let config: MemvaultConfig = load_config("/path/to/config.yaml").unwrap();
//! println!("{:?}", config);
//! ```

use std::{
    error::Error,
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::embedding::{ModelSpec, Pooling};

pub const DEFAULT_MODEL: &str = "BAAI/bge-small-zh-v1.5";
pub const DEFAULT_PORT: u16 = 8090;
pub const DEFAULT_TOP_K: usize = 5;

/// Represents the service configuration.
#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
#[serde(default)]
pub struct MemvaultConfig {
    /// Address the HTTP server binds to.
    pub host: String,

    /// Port the HTTP server listens on.
    pub port: u16,

    /// Root directory of the collection databases.
    pub data_dir: PathBuf,

    /// Root directory of the embedding model cache.
    pub model_dir: PathBuf,

    /// Hugging Face repository of the embedding model.
    pub model: String,

    // Model revision (branch, tag or commit).
    pub revision: String,

    // Sentence pooling strategy of the model.
    pub pooling: Pooling,

    // Result count used when a search request omits `top_k`.
    pub default_top_k: usize,
}

impl Default for MemvaultConfig {
    fn default() -> Self {
        let base = crate::data_dir().unwrap_or_else(|_| PathBuf::from(".memvault"));
        Self {
            host: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            data_dir: base.join("data"),
            model_dir: base.join("models"),
            model: DEFAULT_MODEL.to_string(),
            revision: "main".to_string(),
            pooling: Pooling::Cls,
            default_top_k: DEFAULT_TOP_K,
        }
    }
}

impl MemvaultConfig {
    /// Embedding model description derived from this configuration.
    pub fn model_spec(&self) -> ModelSpec {
        ModelSpec {
            model_id: self.model.clone(),
            revision: self.revision.clone(),
            cache_dir: self.model_dir.clone(),
            pooling: self.pooling,
        }
    }

    /// Create the data and model roots if they don't exist.
    pub fn ensure_dirs(&self) -> Result<(), Box<dyn Error>> {
        fs::create_dir_all(&self.data_dir)?;
        fs::create_dir_all(&self.model_dir)?;
        Ok(())
    }

    /// `host:port` for binding.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Loads the configuration from a YAML file.
///
/// # Returns
///
/// - `Ok(MemvaultConfig)`: The loaded configuration.
/// - `Err(Box<dyn Error>)`: An error occurred while reading the file or parsing the YAML.
pub fn load_config(file: impl AsRef<Path>) -> Result<MemvaultConfig, Box<dyn Error>> {
    let file = file.as_ref();
    debug!("Loading config from {}", file.display());
    let content = fs::read_to_string(file)?;
    let config: MemvaultConfig = serde_yaml::from_str(&content)?;
    Ok(config)
}

/// Load `file` if it exists, otherwise fall back to defaults.
pub fn load_or_default(file: impl AsRef<Path>) -> Result<MemvaultConfig, Box<dyn Error>> {
    let file = file.as_ref();
    if file.exists() {
        load_config(file)
    } else {
        debug!("No config at {}, using defaults", file.display());
        Ok(MemvaultConfig::default())
    }
}

/// Write `config` as YAML to `file`, creating parent directories.
pub fn write_config(config: &MemvaultConfig, file: impl AsRef<Path>) -> Result<(), Box<dyn Error>> {
    let file = file.as_ref();
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(file, serde_yaml::to_string(config)?)?;
    Ok(())
}

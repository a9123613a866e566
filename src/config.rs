//! Optional user configuration (`config.toml`).
//!
//! ```toml
//! profiles_dir = "/home/me/dotfiles/git-profiles"
//! state_dir = "/home/me/.local/state/git-profile"
//!
//! [git]
//! program = "git"
//! timeout_secs = 5
//! # config_file = "/home/me/.gitconfig-identity"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Longest allowed `git.timeout_secs`
pub const MAX_TIMEOUT_SECS: u64 = 3600;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    Validation { message: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub profiles_dir: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub git: GitSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GitSettings {
    /// Program used to read and write configuration
    pub program: String,
    /// Upper bound for a single git invocation
    pub timeout_secs: u64,
    /// Write to this file instead of the global configuration
    pub config_file: Option<PathBuf>,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            program: "git".to_string(),
            timeout_secs: 5,
            config_file: None,
        }
    }
}

impl GitSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    /// Load configuration from `path`.
    ///
    /// A missing file yields `Config::default()`.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.git.program.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "git.program must not be empty".to_string(),
            });
        }
        if !(1..=MAX_TIMEOUT_SECS).contains(&self.git.timeout_secs) {
            return Err(ConfigError::Validation {
                message: format!("git.timeout_secs must be between 1 and {}", MAX_TIMEOUT_SECS),
            });
        }
        Ok(())
    }
}

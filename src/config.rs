use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("The config file: {} is not found!", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read config file {}: {reason}", path.display())]
    Malformed { path: PathBuf, reason: String },

    #[error("{0}")]
    Invalid(String),
}

/// Target server, credentials and work list of one run
///
/// Built once from a JSON file; only the password may be replaced afterwards
/// (command line argument or form input).
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct UpdateConfig {
    /// Base address of the remote server
    pub url: String,

    /// Target database
    pub db: String,

    #[serde(default = "default_username")]
    pub username: String,

    /// May be empty, but is reported as missing in previews
    pub password: String,

    /// Technical module names; order is upgrade order, duplicates are kept
    pub modules_to_update: Vec<String>,

    /// Language code, optionally followed by a display label: `"vi_VN (Vietnamese)"`
    #[serde(default)]
    pub language_to_update: String,

    /// File this config was read from, used to name log files
    #[serde(skip)]
    pub source_path: PathBuf,
}

fn default_username() -> String {
    UpdateConfig::DEFAULT_USERNAME.to_string()
}

impl UpdateConfig {
    pub const DEFAULT_USERNAME: &str = "admin";

    /// Read and parse the config file at `path`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let mut config: UpdateConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Malformed {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;

        config.source_path = path.to_path_buf();

        Ok(config)
    }

    pub fn override_password(&mut self, password: impl Into<String>) {
        self.password = password.into();
    }

    pub fn password_is_set(&self) -> bool {
        !self.password.is_empty()
    }

    /// Effective language code: the leading token of `language_to_update`
    pub fn language_code(&self) -> Option<&str> {
        self.language_to_update.split_whitespace().next()
    }

    /// Base name for log files, the config file name without extension
    pub fn log_stem(&self) -> String {
        self.source_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string())
    }

    /// Check the invariants that must hold before a run is attempted
    pub fn ensure_runnable(&self) -> Result<(), ConfigError> {
        if self.url.trim().is_empty() || self.db.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "Missing config for remote server URL and/or database name".to_string(),
            ));
        }

        if self.modules_to_update.is_empty() && self.language_code().is_none() {
            return Err(ConfigError::Invalid(
                "Please input modules name (one per line) or language to update!".to_string(),
            ));
        }

        Ok(())
    }
}

/// Split free text (one module per line or comma separated) into module names
pub fn parse_module_list(text: &str) -> Vec<String> {
    text.split(['\n', ','])
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(String::from)
        .collect()
}

//! Configuration management for FileApi.
//!
//! This module provides TOML-based configuration file loading and saving.
//! The default configuration path is `~/.config/fileapi/config.toml`.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::units;

/// Configuration validation errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("storage root must not be empty")]
    EmptyRoot,

    #[error("remote backend requires a host")]
    MissingRemoteHost,

    #[error("remote port must be greater than 0")]
    InvalidPort,

    #[error("remote timeout must be between 1 and 300 seconds, got {0}")]
    InvalidTimeout(u64),

    #[error("chunk_size must be between 1 and 16777216 bytes, got {0}")]
    InvalidChunkSize(usize),

    #[error("invalid size limit for {field}: {value}")]
    InvalidSizeLimit { field: &'static str, value: String },

    #[error("log_level must be one of: trace, debug, info, warn, error; got {0}")]
    InvalidLogLevel(String),
}

/// Valid log level values for tracing configuration.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Largest accepted download chunk (16MB).
const MAX_CHUNK_SIZE: usize = 16 * 1024 * 1024;

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    /// Sandbox root and backend selection.
    pub storage: StorageConfig,

    /// FTP connection parameters, used by the remote backend.
    pub remote: RemoteConfig,

    /// Upload limits.
    pub upload: UploadConfig,

    /// Download streaming settings.
    pub download: DownloadConfig,

    /// Logging settings.
    pub logging: LoggingConfig,

    /// Message template overrides keyed by message name.
    pub messages: HashMap<String, String>,
}

/// Which storage backend performs write operations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Local,
    Remote,
}

/// Sandbox root and backend selection.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory every operation is confined to.
    pub root: PathBuf,

    /// Backend used for writes.
    pub backend: BackendKind,
}

/// FTP connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RemoteConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,

    /// Remote directory that corresponds to the storage root.
    pub root: String,

    /// Connect timeout in seconds.
    pub timeout_secs: u64,
}

/// Upload limits, as human sizes (`2M`, `1G`). Empty means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct UploadConfig {
    pub max_file_size: String,
    pub max_post_size: String,
}

/// Download streaming settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DownloadConfig {
    /// Bytes written per chunk (default: 8KB).
    pub chunk_size: usize,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Logging level (trace, debug, info, warn, error).
    pub level: String,

    /// Optional log file; logs go to stderr when unset.
    pub file: Option<PathBuf>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            backend: BackendKind::Local,
        }
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 21,
            user: "anonymous".to_string(),
            password: String::new(),
            root: "/".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_size: "2M".to_string(),
            max_post_size: "8M".to_string(),
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            chunk_size: crate::download::DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Returns the default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fileapi")
        .join("config.toml")
}

/// Returns the default storage root.
fn default_root() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fileapi")
}

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables take precedence over config file values.
    /// Supported variables:
    /// - FILEAPI_ROOT: Override the storage root
    /// - FILEAPI_LOG_LEVEL: Override log level (trace, debug, info, warn, error)
    pub fn apply_env_overrides(&mut self) {
        if let Ok(root) = std::env::var("FILEAPI_ROOT") {
            if !root.is_empty() {
                tracing::info!("Overriding storage root from environment: {}", root);
                self.storage.root = PathBuf::from(root);
            }
        }

        if let Ok(level) = std::env::var("FILEAPI_LOG_LEVEL") {
            if !level.is_empty() {
                tracing::info!("Overriding log_level from environment: {}", level);
                self.logging.level = level;
            }
        }
    }

    /// Validate the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.root.as_os_str().is_empty() {
            return Err(ConfigError::EmptyRoot);
        }

        if self.storage.backend == BackendKind::Remote {
            if self.remote.host.is_empty() {
                return Err(ConfigError::MissingRemoteHost);
            }
            if self.remote.port == 0 {
                return Err(ConfigError::InvalidPort);
            }
            if self.remote.timeout_secs == 0 || self.remote.timeout_secs > 300 {
                return Err(ConfigError::InvalidTimeout(self.remote.timeout_secs));
            }
        }

        if self.download.chunk_size == 0 || self.download.chunk_size > MAX_CHUNK_SIZE {
            return Err(ConfigError::InvalidChunkSize(self.download.chunk_size));
        }

        for (field, value) in [
            ("max_file_size", &self.upload.max_file_size),
            ("max_post_size", &self.upload.max_post_size),
        ] {
            if !value.trim().is_empty() && units::size_to_num(value).is_err() {
                return Err(ConfigError::InvalidSizeLimit {
                    field,
                    value: value.clone(),
                });
            }
        }

        let level = self.logging.level.to_lowercase();
        if !VALID_LOG_LEVELS.contains(&level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.logging.level.clone()));
        }

        Ok(())
    }

    /// Effective upload limit in bytes, optionally capped by `custom`.
    pub fn max_upload(&self, custom: u64) -> crate::Result<u64> {
        units::max_upload(custom, &self.upload.max_file_size, &self.upload.max_post_size)
    }

    /// Load configuration from a file.
    ///
    /// If the file does not exist, returns the default configuration.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))
    }

    /// Load configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(default_config_path())
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        toml::from_str(toml_str)
            .map_err(|e| anyhow::anyhow!("Invalid TOML configuration: {}", format_toml_error(&e)))
    }

    /// Save configuration to a file.
    ///
    /// Creates parent directories if they don't exist.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let contents = self.to_toml()?;
        fs::write(path, contents)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::debug!("Configuration saved to {:?}", path);
        Ok(())
    }

    /// Serialize configuration to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")
    }
}

/// Format a TOML deserialization error for user-friendly display.
fn format_toml_error(error: &toml::de::Error) -> String {
    let mut msg = error.message().to_string();

    if let Some(span) = error.span() {
        msg.push_str(&format!(" (at position {}..{})", span.start, span.end));
    }

    msg
}

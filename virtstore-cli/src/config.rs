//! Configuration management for the CLI.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use virtstore_common::LogFormat;

use crate::cli::Args;

/// Location read when `--config` is not given.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/virtstore/virtstore.yaml";

/// Main configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Connection settings
    pub connection: ConnectionConfig,
    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(anyhow::anyhow!("Config file not found: {}", path.display()));
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load the explicit file, or the default location if it exists.
    ///
    /// A missing explicit file is an error. A missing default file yields
    /// the built-in defaults.
    pub fn resolve(explicit: Option<&str>) -> Result<(Self, Option<String>)> {
        match explicit {
            Some(path) => Ok((Self::load(path)?, Some(path.to_string()))),
            None if Path::new(DEFAULT_CONFIG_PATH).exists() => Ok((
                Self::load(DEFAULT_CONFIG_PATH)?,
                Some(DEFAULT_CONFIG_PATH.to_string()),
            )),
            None => Ok((Self::default(), None)),
        }
    }

    /// Apply CLI argument overrides to the configuration.
    pub fn with_cli_overrides(mut self, args: &Args) -> Self {
        if let Some(ref uri) = args.uri {
            self.connection.uri = uri.clone();
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }

        if args.log_json {
            self.logging.format = LogFormat::Json;
        }

        self
    }
}

/// Connection configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Libvirt connection URI
    pub uri: String,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            uri: "qemu:///system".to_string(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Level or filter directive
    pub level: String,
    /// Output format (pretty, json)
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

//! Configuration module for tdlink-bridge.
//!
//! Handles loading configuration from the TOML file and CLI overrides.

pub mod file;

use crate::config::file::FileConfig;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("validation error: {0}")]
    ValidationError(String),
}

/// Configuration loader that handles the complete loading process.
pub struct ConfigLoader {
    config_path: PathBuf,
    engine_override: Option<String>,
}

impl ConfigLoader {
    /// Create a new config loader.
    pub fn new(config_path: impl AsRef<Path>, engine_override: Option<String>) -> Self {
        Self {
            config_path: config_path.as_ref().to_path_buf(),
            engine_override,
        }
    }

    /// Read, override and validate the configuration.
    pub fn load(&self) -> Result<FileConfig, ConfigError> {
        let config_content = std::fs::read_to_string(&self.config_path)?;
        self.load_str(&config_content)
    }

    fn load_str(&self, content: &str) -> Result<FileConfig, ConfigError> {
        let mut file_config: FileConfig = toml::from_str(content)?;

        if let Some(command) = &self.engine_override {
            file_config.engine.command = command.clone();
        }

        validate(&file_config)?;
        Ok(file_config)
    }
}

fn validate(config: &FileConfig) -> Result<(), ConfigError> {
    if config.engine.command.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "engine command must not be empty".to_string(),
        ));
    }
    if config.client.catch_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "client catch_timeout_secs must be positive".to_string(),
        ));
    }
    if let Some(log) = &config.log
        && log.file.is_some()
        && log.max_file_size == 0
    {
        return Err(ConfigError::ValidationError(
            "log max_file_size must be positive".to_string(),
        ));
    }
    if let Some(proxy) = &config.proxy
        && (proxy.server.is_empty() || proxy.port == 0)
    {
        return Err(ConfigError::ValidationError(format!(
            "invalid proxy address {}:{}",
            proxy.server, proxy.port
        )));
    }
    Ok(())
}

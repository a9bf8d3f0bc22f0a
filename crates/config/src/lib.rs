//! Configuration management for the dix settlement core
//!
//! This crate provides the explicit configuration value threaded into every
//! component at construction:
//! - Multiple config formats (TOML, YAML, JSON)
//! - Environment variable overrides (`DIX_` prefix)
//! - Config validation that reports every problem at once
//! - Presets for mainnet, devnet and local environments

mod config;
mod loader;
mod validation;

pub use config::*;
pub use loader::*;
pub use validation::*;

use dix_types::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    LoadError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Config validation failed: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Config library error: {0}")]
    ConfigLibError(#[from] ::config::ConfigError),

    #[error("TOML parse error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl ConfigError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Config
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;

//! Configuration loading from files and the environment

use crate::{AppConfig, ConfigError, Result};
use config::{Config, Environment, File, FileFormat};
use std::path::Path;

/// Default environment variable prefix, e.g. `DIX_LEDGER__RPC_URL`
pub const ENV_PREFIX: &str = "DIX";

/// On-disk configuration formats, picked by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Toml,
    Yaml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(ConfigFormat::Toml),
            Some("yaml") | Some("yml") => Ok(ConfigFormat::Yaml),
            Some("json") => Ok(ConfigFormat::Json),
            Some(other) => Err(ConfigError::LoadError(format!(
                "unsupported config extension: {other}"
            ))),
            None => Err(ConfigError::LoadError(format!(
                "{} has no extension",
                path.display()
            ))),
        }
    }

    fn file_format(self) -> FileFormat {
        match self {
            ConfigFormat::Toml => FileFormat::Toml,
            ConfigFormat::Yaml => FileFormat::Yaml,
            ConfigFormat::Json => FileFormat::Json,
        }
    }
}

/// Loads an [`AppConfig`]. Missing keys take the section defaults.
pub struct ConfigLoader;

impl ConfigLoader {
    pub fn from_file(path: &Path) -> Result<AppConfig> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content, format)
    }

    pub fn parse(content: &str, format: ConfigFormat) -> Result<AppConfig> {
        let config: AppConfig = match format {
            ConfigFormat::Toml => toml::from_str(content)?,
            ConfigFormat::Yaml => serde_yaml::from_str(content)?,
            ConfigFormat::Json => serde_json::from_str(content)?,
        };
        Ok(config)
    }

    pub fn from_env() -> Result<AppConfig> {
        Self::from_env_with_prefix(ENV_PREFIX)
    }

    /// Sections and keys are separated by a double underscore so that keys
    /// may contain single underscores: `DIX_LEDGER__RPC_URL`.
    pub fn from_env_with_prefix(prefix: &str) -> Result<AppConfig> {
        let config = Config::builder().add_source(env_source(prefix)).build()?;
        Ok(config.try_deserialize()?)
    }

    /// `path` overlaid with `<env_prefix>_*` variables, key by key
    pub fn from_file_with_env(path: &Path, env_prefix: &str) -> Result<AppConfig> {
        let format = ConfigFormat::from_path(path)?;
        let config = Config::builder()
            .add_source(File::from(path).format(format.file_format()).required(true))
            .add_source(env_source(env_prefix))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

fn env_source(prefix: &str) -> Environment {
    Environment::with_prefix(prefix)
        .prefix_separator("_")
        .separator("__")
}

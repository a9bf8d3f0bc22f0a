//! Configuration validation

use crate::{AppConfig, ConfigError, Result};
use dix_types::TokenRegistry;

/// Validation error details
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate the entire application configuration, reporting every problem
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let mut errors = Vec::new();

    if let Err(e) = validate_log_level(&config.network.log_level) {
        errors.push(e);
    }

    // Ledger
    if let Err(e) = validate_url(&config.ledger.rpc_url) {
        errors.push(ValidationError::new("ledger.rpc_url", e));
    }

    if config.ledger.confirm_timeout_secs == 0 {
        errors.push(ValidationError::new(
            "ledger.confirm_timeout_secs",
            "must be greater than 0",
        ));
    }

    if config.ledger.poll_interval_ms == 0 {
        errors.push(ValidationError::new(
            "ledger.poll_interval_ms",
            "must be greater than 0",
        ));
    }

    // Registry
    if config.registry.namespace_tag.trim().is_empty() {
        errors.push(ValidationError::new(
            "registry.namespace_tag",
            "namespace tag is required",
        ));
    }

    if let Some(endpoint) = &config.registry.endpoint {
        if let Err(e) = validate_url(endpoint) {
            errors.push(ValidationError::new("registry.endpoint", e));
        }
    }

    if let Some(program_id) = &config.registry.program_id {
        if !dix_types::is_valid_address(program_id) {
            errors.push(ValidationError::new(
                "registry.program_id",
                format!("'{program_id}' is not a valid address"),
            ));
        }
    }

    // Storage
    if config.storage.db_path.trim().is_empty() {
        errors.push(ValidationError::new(
            "storage.db_path",
            "database path is required",
        ));
    }

    // Tokens
    errors.extend(validate_tokens(config));

    if !errors.is_empty() {
        let error_msg = errors
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(ConfigError::ValidationError(error_msg));
    }

    Ok(())
}

fn validate_tokens(config: &AppConfig) -> Vec<ValidationError> {
    let builtin = TokenRegistry::builtin();
    let mut errors = Vec::new();

    for (idx, key) in config.tokens.allowed.iter().enumerate() {
        if !builtin.contains(key) {
            errors.push(ValidationError::new(
                format!("tokens.allowed[{idx}]"),
                format!("unknown token '{key}'"),
            ));
        }
    }

    let default_token = &config.tokens.default_token;
    if !builtin.contains(default_token) {
        errors.push(ValidationError::new(
            "tokens.default_token",
            format!("unknown token '{default_token}'"),
        ));
    } else if !config.tokens.allowed.is_empty() && !config.tokens.allowed.contains(default_token) {
        errors.push(ValidationError::new(
            "tokens.default_token",
            format!("'{default_token}' is not in tokens.allowed"),
        ));
    }

    errors
}

/// Validate a URL
pub fn validate_url(url: &str) -> std::result::Result<(), String> {
    if url.is_empty() {
        return Err("URL cannot be empty".to_string());
    }

    // Basic URL validation - check for scheme
    if !url.starts_with("http://")
        && !url.starts_with("https://")
        && !url.starts_with("ws://")
        && !url.starts_with("wss://")
    {
        return Err("URL must start with http://, https://, ws://, or wss://".to_string());
    }

    Ok(())
}

fn validate_log_level(level: &str) -> std::result::Result<(), ValidationError> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::new(
            "network.log_level",
            format!(
                "invalid log level '{level}', must be one of: trace, debug, info, warn, error"
            ),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(config: &AppConfig) -> String {
        match validate_config(config) {
            Err(ConfigError::ValidationError(msg)) => msg,
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
        assert!(validate_config(&AppConfig::mainnet()).is_ok());
        assert!(validate_config(&AppConfig::devnet()).is_ok());
        assert!(validate_config(&AppConfig::local()).is_ok());
    }

    #[test]
    fn test_reports_every_problem() {
        let mut config = AppConfig::devnet();
        config.network.log_level = "loud".to_string();
        config.ledger.confirm_timeout_secs = 0;
        config.registry.namespace_tag = String::new();

        let msg = message(&config);
        assert!(msg.contains("network.log_level"));
        assert!(msg.contains("ledger.confirm_timeout_secs"));
        assert!(msg.contains("registry.namespace_tag"));
        assert_eq!(msg.matches("; ").count(), 2);
    }

    #[test]
    fn test_registry_endpoint_must_be_url() {
        let mut config = AppConfig::devnet();
        config.registry.endpoint = Some("devnet".to_string());
        assert!(message(&config).contains("registry.endpoint"));

        config.registry.endpoint = Some("https://api.devnet.solana.com".to_string());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_token_restrictions() {
        let mut config = AppConfig::devnet();
        config.tokens.allowed = vec!["usdc".to_string(), "doge".to_string()];
        assert!(message(&config).contains("tokens.allowed[1]"));

        config.tokens.allowed = vec!["usdt".to_string()];
        config.tokens.default_token = "usdc".to_string();
        assert!(message(&config).contains("not in tokens.allowed"));

        config.tokens.default_token = "usdt".to_string();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_url() {
        assert!(validate_url("https://api.devnet.solana.com").is_ok());
        assert!(validate_url("ws://127.0.0.1:8900").is_ok());
        assert!(validate_url("").is_err());
        assert!(validate_url("api.devnet.solana.com").is_err());
    }
}

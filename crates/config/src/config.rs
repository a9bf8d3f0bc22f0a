//! Core configuration structures for the dix settlement core

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MAINNET_RPC: &str = "https://api.mainnet-beta.solana.com";
pub const DEVNET_RPC: &str = "https://api.devnet.solana.com";
pub const LOCAL_RPC: &str = "http://127.0.0.1:8899";

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Ledger client configuration
    #[serde(default)]
    pub ledger: LedgerConfig,

    /// Username registry configuration
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Local persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Accepted tokens
    #[serde(default)]
    pub tokens: TokenConfig,
}

/// Network environment configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Environment type (mainnet, devnet, local)
    #[serde(default = "default_environment")]
    pub environment: Environment,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Environment types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Mainnet,
    Devnet,
    Local,
}

/// Ledger RPC and confirmation polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// RPC endpoint URL
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,

    /// Upper bound on waiting for a submitted transfer to confirm
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,

    /// Delay between confirmation status polls
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl LedgerConfig {
    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Username registry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Registry endpoint; without one, only cached usernames resolve
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Address of the registry program, when the ledger needs it
    #[serde(default)]
    pub program_id: Option<String>,

    /// Namespace tag the registry derives lookup keys from
    #[serde(default = "default_namespace_tag")]
    pub namespace_tag: String,
}

/// Local persistence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file, or `:memory:`
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl StorageConfig {
    pub fn is_in_memory(&self) -> bool {
        self.db_path == ":memory:"
    }
}

/// Token acceptance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenConfig {
    /// Accepted token keys; empty accepts every built-in token
    #[serde(default)]
    pub allowed: Vec<String>,

    /// Token used when a caller does not name one
    #[serde(default = "default_token")]
    pub default_token: String,
}

// Default value functions
fn default_environment() -> Environment {
    Environment::Devnet
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_rpc_url() -> String {
    DEVNET_RPC.to_string()
}

fn default_confirm_timeout_secs() -> u64 {
    30
}

fn default_poll_interval_ms() -> u64 {
    200
}

fn default_namespace_tag() -> String {
    "alias".to_string()
}

fn default_db_path() -> String {
    "dix.db".to_string()
}

fn default_token() -> String {
    "usdc".to_string()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            environment: default_environment(),
            log_level: default_log_level(),
        }
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            program_id: None,
            namespace_tag: default_namespace_tag(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            allowed: Vec::new(),
            default_token: default_token(),
        }
    }
}

impl AppConfig {
    pub fn mainnet() -> Self {
        Self::for_environment(Environment::Mainnet, MAINNET_RPC)
    }

    pub fn devnet() -> Self {
        Self::for_environment(Environment::Devnet, DEVNET_RPC)
    }

    /// Local validator, in-memory storage, verbose logging
    pub fn local() -> Self {
        let mut config = Self::for_environment(Environment::Local, LOCAL_RPC);
        config.network.log_level = "debug".to_string();
        config.storage.db_path = ":memory:".to_string();
        config
    }

    fn for_environment(environment: Environment, rpc_url: &str) -> Self {
        Self {
            network: NetworkConfig {
                environment,
                ..Default::default()
            },
            ledger: LedgerConfig {
                rpc_url: rpc_url.to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

//! dix: username-addressed payments and rotating savings pools
//!
//! [`Dix`] wires the settlement core together from an
//! [`AppConfig`](dix_config::AppConfig): payment intents that never pay
//! twice, cache-then-registry username resolution, and rotating pools
//! where members take turns receiving everyone's contribution.
//!
//! The ledger and registry are supplied by the embedding application as
//! [`LedgerClient`](dix_settlement::LedgerClient) and
//! [`RegistryClient`](dix_resolver::RegistryClient) implementations.
//!
//! # Example
//!
//! ```no_run
//! use dix::{AppConfig, Dix};
//! use dix_settlement::MockLedger;
//! use dix_types::AddressSigner;
//! use std::sync::Arc;
//!
//! # async fn run() -> dix::Result<()> {
//! dix::init_tracing("info")?;
//!
//! let dix = Dix::open(AppConfig::local(), Arc::new(MockLedger::new()), None).await?;
//! let signer = AddressSigner::new("11111111111111111111111111111111");
//! let outcome = dix.pay(&signer, "alice", 1_500_000, Some("usdc")).await?;
//! println!("{:?}", outcome.intent().status);
//! # Ok(())
//! # }
//! ```

mod client;
mod error;

pub use client::Dix;
pub use error::{DixError, Result};

pub use dix_config::{AppConfig, ConfigLoader};
pub use dix_metrics::init_tracing;
pub use dix_pool::{Contribution, PoolView};
pub use dix_resolver::Resolution;
pub use dix_settlement::{IntentTransition, PayOutcome};
pub use dix_types::ErrorKind;

/// Initialize logging from a loaded configuration's log level
pub fn init_tracing_from_config(config: &AppConfig) -> Result<()> {
    Ok(init_tracing(&config.network.log_level)?)
}

//! Metrics and logging for the dix settlement core
//!
//! Prometheus counters for intents, settlements, alias lookups and pool
//! lifecycle, plus `tracing` subscriber setup with correlation ids.
//!
//! # Example
//!
//! ```no_run
//! use dix_metrics::{init_tracing, MetricsCollector};
//!
//! init_tracing("info").unwrap();
//!
//! let collector = MetricsCollector::new();
//! collector.record_intent_created();
//! println!("{}", collector.export_metrics().unwrap());
//! ```

pub mod collector;
pub mod metrics;
pub mod tracing;

pub use collector::{LookupSource, MetricsCollector, MetricsError, PoolEvent, SettlementFlow};
pub use tracing::{init_tracing, init_tracing_with_metrics, CorrelationId, MetricsLayer, OperationSpan};

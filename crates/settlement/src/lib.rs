//! Intent lifecycle and ledger settlement
//!
//! A payment request becomes a durable [`Intent`](dix_types::Intent) before
//! anything touches the ledger, then moves `pending -> sent -> done` or ends
//! in `fail`. Intent ids are deterministic per (from, to, amount, second),
//! so a retried request finds its earlier intent instead of paying twice.

pub mod coordinator;
pub mod error;
pub mod ledger;
pub mod sqlite_store;
pub mod store;

pub use coordinator::*;
pub use error::*;
pub use ledger::*;
pub use sqlite_store::*;
pub use store::*;

//! Rotating savings pools
//!
//! Members join in order, then take turns as the round's winner: every other
//! member pays the fixed contribution to the winner, the winner claims, and
//! the pool moves to the next round until everyone has been paid out once.

pub mod engine;
pub mod error;
pub mod sqlite_store;
pub mod store;

pub use engine::*;
pub use error::*;
pub use sqlite_store::*;
pub use store::*;

//! Username resolution
//!
//! Usernames resolve through a local write-through cache first and the
//! authoritative registry second. Cache entries never expire.

pub mod cache;
pub mod error;
pub mod registry;
pub mod resolver;
pub mod sqlite_cache;

pub use cache::*;
pub use error::*;
pub use registry::*;
pub use resolver::*;
pub use sqlite_cache::*;

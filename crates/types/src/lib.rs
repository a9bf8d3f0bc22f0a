pub mod clock;
pub mod error;
pub mod intent;
pub mod lock;
pub mod pool;
pub mod recipient;
pub mod signer;
pub mod token;

pub use clock::*;
pub use error::*;
pub use intent::*;
pub use lock::*;
pub use pool::*;
pub use recipient::*;
pub use signer::*;
pub use token::*;

/// Length of the hex-encoded intent identifier
pub const INTENT_ID_LEN: usize = 16;

/// Length of the hex-encoded pool identifier
pub const POOL_ID_LEN: usize = 12;

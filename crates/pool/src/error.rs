use dix_resolver::ResolveError;
use dix_settlement::SettlementError;
use dix_types::{ErrorKind, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("pool not found: {0}")]
    PoolNotFound(String),

    #[error("token not supported: {0}")]
    UnsupportedToken(String),

    #[error("contribution must be greater than zero")]
    InvalidContribution,

    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("invalid payout address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("pool is not open")]
    PoolNotOpen,

    #[error("pool is not active")]
    PoolNotActive,

    #[error("{0} is already a member")]
    AlreadyMember(String),

    #[error("need at least 2 members, have {count}")]
    InsufficientMembers { count: usize },

    #[error("{0} is not a member")]
    NotMember(String),

    #[error("{0} already paid this round")]
    AlreadyPaid(String),

    #[error("no winner for round {0}")]
    NoWinnerForRound(u32),

    #[error("not your turn (winner: {winner})")]
    NotYourTurn { winner: String },

    #[error("not everyone paid yet: {}", .unpaid.join(", "))]
    NotAllPaid { unpaid: Vec<String> },

    #[error("pool moved past round {round} before the contribution was recorded")]
    RoundAdvanced { round: u32 },

    #[error("winner resolution failed: {0}")]
    Resolution(#[from] ResolveError),

    #[error("contribution settlement failed: {0}")]
    Settlement(#[from] SettlementError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl PoolError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PoolError::PoolNotFound(_) => ErrorKind::NotFound,
            PoolError::UnsupportedToken(_)
            | PoolError::InvalidContribution
            | PoolError::InvalidUsername(_)
            | PoolError::InvalidAddress { .. }
            | PoolError::PoolNotOpen
            | PoolError::PoolNotActive
            | PoolError::InsufficientMembers { .. }
            | PoolError::NotMember(_)
            | PoolError::NoWinnerForRound(_) => ErrorKind::Validation,
            PoolError::AlreadyMember(_)
            | PoolError::AlreadyPaid(_)
            | PoolError::NotYourTurn { .. }
            | PoolError::NotAllPaid { .. }
            | PoolError::RoundAdvanced { .. } => ErrorKind::Conflict,
            PoolError::Resolution(e) => e.kind(),
            PoolError::Settlement(e) => e.kind(),
            PoolError::Store(e) => e.kind(),
        }
    }
}

use dix_config::ConfigError;
use dix_metrics::MetricsError;
use dix_pool::PoolError;
use dix_resolver::ResolveError;
use dix_settlement::SettlementError;
use dix_types::{ErrorKind, StoreError};
use thiserror::Error;

/// Any error a [`Dix`](crate::Dix) operation can return
#[derive(Debug, Error)]
pub enum DixError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Settlement(#[from] SettlementError),

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),
}

impl DixError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DixError::Config(e) => e.kind(),
            DixError::Resolve(e) => e.kind(),
            DixError::Settlement(e) => e.kind(),
            DixError::Pool(e) => e.kind(),
            DixError::Store(e) => e.kind(),
            DixError::Metrics(e) => e.kind(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

pub type Result<T> = std::result::Result<T, DixError>;

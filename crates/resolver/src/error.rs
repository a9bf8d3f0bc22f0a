use dix_types::{ErrorKind, StoreError};
use thiserror::Error;

use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("username not found: {0}")]
    UsernameNotFound(String),

    #[error("no registry configured; cannot resolve uncached username {0}")]
    RegistryUnavailable(String),

    #[error("invalid resolver configuration: {0}")]
    InvalidConfig(String),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("alias cache error: {0}")]
    Cache(#[from] StoreError),
}

impl ResolveError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResolveError::InvalidUsername(_) => ErrorKind::Validation,
            ResolveError::UsernameNotFound(_) => ErrorKind::NotFound,
            ResolveError::RegistryUnavailable(_) | ResolveError::InvalidConfig(_) => {
                ErrorKind::Config
            }
            ResolveError::Registry(_) => ErrorKind::External,
            ResolveError::Cache(e) => e.kind(),
        }
    }
}

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Coarse classification callers use to decide what to do with an error
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad input or wrong state; never retried automatically
    Validation,

    /// Caller acted on a stale view; re-query status
    Conflict,

    /// Unknown intent, pool or username
    NotFound,

    /// Ledger or registry failure; may be transient
    External,

    /// Confirmation polling exceeded its budget
    Timeout,

    /// Missing or invalid configuration
    Config,

    /// Local persistence failure
    Storage,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Conflict => "conflict",
            ErrorKind::NotFound => "not_found",
            ErrorKind::External => "external",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Config => "config",
            ErrorKind::Storage => "storage",
        }
    }

    /// Whether re-invoking the same operation may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, ErrorKind::External | ErrorKind::Timeout)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} status: {value}")]
pub struct UnknownStatus {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownStatus {
    pub fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// Errors shared by every persistent store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("duplicate record: {0}")]
    DuplicateId(String),

    #[error("invalid transition for {id}: {from} -> {to}")]
    InvalidTransition {
        id: String,
        from: String,
        to: String,
    },

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("connection error: {0}")]
    ConnectionError(String),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::NotFound(_) => ErrorKind::NotFound,
            StoreError::DuplicateId(_) | StoreError::InvalidTransition { .. } => {
                ErrorKind::Conflict
            }
            StoreError::DatabaseError(_)
            | StoreError::SerializationError(_)
            | StoreError::ConnectionError(_) => ErrorKind::Storage,
        }
    }
}

impl From<UnknownStatus> for StoreError {
    fn from(e: UnknownStatus) -> Self {
        StoreError::SerializationError(e.to_string())
    }
}

/// Result of an insert-only-if-absent write
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome<T> {
    Inserted,
    Existing(T),
}

impl<T> InsertOutcome<T> {
    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        assert!(ErrorKind::External.is_retryable());
        assert!(ErrorKind::Timeout.is_retryable());
        assert!(!ErrorKind::Validation.is_retryable());
        assert!(!ErrorKind::Conflict.is_retryable());
        assert!(!ErrorKind::NotFound.is_retryable());
    }

    #[test]
    fn test_store_error_kinds() {
        assert_eq!(StoreError::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            StoreError::InvalidTransition {
                id: "x".into(),
                from: "done".into(),
                to: "sent".into(),
            }
            .kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            StoreError::DatabaseError("disk".into()).kind(),
            ErrorKind::Storage
        );
    }
}

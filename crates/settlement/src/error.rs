use dix_resolver::ResolveError;
use dix_types::{ErrorKind, StoreError};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::ledger::LedgerError;

/// Step of the pay pipeline an error came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayStage {
    Resolve,
    Validate,
    Submit,
    Confirm,
    /// Persisting a step of an intent that already exists
    Record,
}

impl PayStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            PayStage::Resolve => "resolve",
            PayStage::Validate => "validate",
            PayStage::Submit => "submit",
            PayStage::Confirm => "confirm",
            PayStage::Record => "record",
        }
    }
}

impl fmt::Display for PayStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum SettlementError {
    #[error("invalid username: {0}")]
    InvalidUsername(String),

    #[error("invalid address {address}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("amount must be greater than zero")]
    ZeroAmount,

    #[error("token not supported: {0}")]
    UnsupportedToken(String),

    #[error("recipient resolution failed: {0}")]
    ResolutionFailed(#[source] ResolveError),

    #[error("ledger submission failed: {0}")]
    SubmitFailed(#[source] LedgerError),

    #[error("confirmation timed out after {0:?}")]
    ConfirmationTimeout(Duration),

    #[error("ledger reported transfer failure: {0}")]
    ConfirmationFailed(String),

    #[error("could not record progress of intent {intent_id}: {source}")]
    RecordFailed {
        intent_id: String,
        #[source]
        source: StoreError,
    },

    #[error("intent not found: {0}")]
    IntentNotFound(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl SettlementError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SettlementError::InvalidUsername(_)
            | SettlementError::InvalidAddress { .. }
            | SettlementError::ZeroAmount
            | SettlementError::UnsupportedToken(_) => ErrorKind::Validation,
            SettlementError::ResolutionFailed(e) => e.kind(),
            SettlementError::SubmitFailed(_) | SettlementError::ConfirmationFailed(_) => {
                ErrorKind::External
            }
            SettlementError::ConfirmationTimeout(_) => ErrorKind::Timeout,
            SettlementError::IntentNotFound(_) => ErrorKind::NotFound,
            SettlementError::RecordFailed { source, .. } => source.kind(),
            SettlementError::Store(e) => e.kind(),
        }
    }

    /// Pipeline stage that failed, `None` for errors outside the pipeline.
    ///
    /// Every error with a stage was raised after the intent row was written.
    pub fn stage(&self) -> Option<PayStage> {
        match self {
            SettlementError::InvalidUsername(_)
            | SettlementError::InvalidAddress { .. }
            | SettlementError::ResolutionFailed(_) => Some(PayStage::Resolve),
            SettlementError::ZeroAmount | SettlementError::UnsupportedToken(_) => {
                Some(PayStage::Validate)
            }
            SettlementError::SubmitFailed(_) => Some(PayStage::Submit),
            SettlementError::ConfirmationTimeout(_) | SettlementError::ConfirmationFailed(_) => {
                Some(PayStage::Confirm)
            }
            SettlementError::RecordFailed { .. } => Some(PayStage::Record),
            SettlementError::IntentNotFound(_) | SettlementError::Store(_) => None,
        }
    }
}

impl From<ResolveError> for SettlementError {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::InvalidUsername(name) => SettlementError::InvalidUsername(name),
            other => SettlementError::ResolutionFailed(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kinds_follow_taxonomy() {
        assert_eq!(SettlementError::ZeroAmount.kind(), ErrorKind::Validation);
        assert_eq!(
            SettlementError::ConfirmationTimeout(Duration::from_secs(30)).kind(),
            ErrorKind::Timeout
        );
        assert_eq!(
            SettlementError::from(ResolveError::UsernameNotFound("bob".into())).kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            SettlementError::SubmitFailed(LedgerError::Rpc("down".into())).kind(),
            ErrorKind::External
        );
    }

    #[test]
    fn test_invalid_username_is_lifted() {
        let err = SettlementError::from(ResolveError::InvalidUsername("a!".into()));
        assert!(matches!(err, SettlementError::InvalidUsername(_)));
        assert_eq!(err.stage(), Some(PayStage::Resolve));
    }

    #[test]
    fn test_record_failure_keeps_store_kind() {
        let err = SettlementError::RecordFailed {
            intent_id: "abc".into(),
            source: StoreError::DatabaseError("disk full".into()),
        };
        assert_eq!(err.stage(), Some(PayStage::Record));
        assert_eq!(err.kind(), ErrorKind::Storage);

        let before_insert = SettlementError::Store(StoreError::DatabaseError("locked".into()));
        assert_eq!(before_insert.stage(), None);
    }
}

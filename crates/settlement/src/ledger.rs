use async_trait::async_trait;
use dix_types::{Signer, TokenInfo};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::debug;

use crate::error::SettlementError;

// ═══════════════════════════════════════════════════════════════════════════
// LEDGER CLIENT
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("transfer rejected: {0}")]
    Rejected(String),

    #[error("unknown settlement reference: {0}")]
    UnknownRef(String),
}

/// A single value transfer between two resolved accounts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transfer {
    pub from: String,
    pub to: String,
    pub amount: u64,
    pub token: TokenInfo,
}

/// Opaque handle the ledger returns for a submitted transfer
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettlementRef(pub String);

impl SettlementRef {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SettlementRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Failed { reason: String },
}

/// External ledger. Submission is at-least-once from the caller's view;
/// the core never resubmits on its own.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    async fn submit(
        &self,
        transfer: &Transfer,
        signer: &dyn Signer,
    ) -> Result<SettlementRef, LedgerError>;

    async fn status(&self, reference: &SettlementRef) -> Result<TransferStatus, LedgerError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// SETTLER
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmPolicy {
    pub timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for ConfirmPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            poll_interval: Duration::from_millis(200),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled {
    pub reference: SettlementRef,

    /// Wall time from submission to confirmation
    pub elapsed: Duration,
}

/// Submit-then-confirm against a [`LedgerClient`], shared by direct
/// payments and pool contributions.
#[derive(Clone)]
pub struct Settler {
    ledger: Arc<dyn LedgerClient>,
    policy: ConfirmPolicy,
}

impl Settler {
    pub fn new(ledger: Arc<dyn LedgerClient>, policy: ConfirmPolicy) -> Self {
        Self { ledger, policy }
    }

    pub fn policy(&self) -> ConfirmPolicy {
        self.policy
    }

    pub async fn submit(
        &self,
        transfer: &Transfer,
        signer: &dyn Signer,
    ) -> Result<SettlementRef, SettlementError> {
        self.ledger
            .submit(transfer, signer)
            .await
            .map_err(SettlementError::SubmitFailed)
    }

    /// Poll until the ledger confirms, reports failure, or the policy
    /// timeout elapses. Transient status errors keep polling.
    pub async fn confirm(&self, reference: &SettlementRef) -> Result<(), SettlementError> {
        let poll = async {
            loop {
                match self.ledger.status(reference).await {
                    Ok(TransferStatus::Confirmed) => return Ok(()),
                    Ok(TransferStatus::Failed { reason }) => {
                        return Err(SettlementError::ConfirmationFailed(reason))
                    }
                    Ok(TransferStatus::Pending) => {}
                    Err(e) => {
                        debug!(reference = %reference, error = %e, "status poll failed");
                    }
                }
                tokio::time::sleep(self.policy.poll_interval).await;
            }
        };

        tokio::time::timeout(self.policy.timeout, poll)
            .await
            .unwrap_or(Err(SettlementError::ConfirmationTimeout(self.policy.timeout)))
    }

    pub async fn settle(
        &self,
        transfer: &Transfer,
        signer: &dyn Signer,
    ) -> Result<Settled, SettlementError> {
        let started = Instant::now();
        let reference = self.submit(transfer, signer).await?;
        self.confirm(&reference).await?;

        Ok(Settled {
            reference,
            elapsed: started.elapsed(),
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// MOCK LEDGER
// ═══════════════════════════════════════════════════════════════════════════

/// How the mock ledger answers status polls for new submissions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfirmMode {
    Immediate,
    Never,
    Fail(String),
}

struct MockLedgerState {
    submissions: Vec<Transfer>,
    statuses: HashMap<String, TransferStatus>,
    reject_with: Option<String>,
    confirm_mode: ConfirmMode,
    submit_delay: Duration,
}

/// Ledger that records submissions in memory, for testing
pub struct MockLedger {
    state: Arc<Mutex<MockLedgerState>>,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockLedgerState {
                submissions: Vec::new(),
                statuses: HashMap::new(),
                reject_with: None,
                confirm_mode: ConfirmMode::Immediate,
                submit_delay: Duration::ZERO,
            })),
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, MockLedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reject every submission with `reason`, or accept again with `None`
    pub fn reject_submissions(&self, reason: Option<&str>) {
        self.state().reject_with = reason.map(str::to_string);
    }

    pub fn set_confirm_mode(&self, mode: ConfirmMode) {
        self.state().confirm_mode = mode;
    }

    /// Hold each submission for `delay` before answering
    pub fn set_submit_delay(&self, delay: Duration) {
        self.state().submit_delay = delay;
    }

    /// Force the status of an existing reference
    pub fn set_status(&self, reference: &SettlementRef, status: TransferStatus) {
        self.state().statuses.insert(reference.0.clone(), status);
    }

    pub fn submissions(&self) -> Vec<Transfer> {
        self.state().submissions.clone()
    }

    pub fn submission_count(&self) -> usize {
        self.state().submissions.len()
    }
}

#[async_trait]
impl LedgerClient for MockLedger {
    async fn submit(
        &self,
        transfer: &Transfer,
        signer: &dyn Signer,
    ) -> Result<SettlementRef, LedgerError> {
        let delay = self.state().submit_delay;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        if let Some(reason) = &state.reject_with {
            return Err(LedgerError::Rejected(reason.clone()));
        }
        if signer.address() != transfer.from {
            return Err(LedgerError::Rejected("signer does not own source account".into()));
        }

        state.submissions.push(transfer.clone());
        let reference = SettlementRef(format!("sig-{}", state.submissions.len()));
        let status = match &state.confirm_mode {
            ConfirmMode::Immediate => TransferStatus::Confirmed,
            ConfirmMode::Never => TransferStatus::Pending,
            ConfirmMode::Fail(reason) => TransferStatus::Failed {
                reason: reason.clone(),
            },
        };
        state.statuses.insert(reference.0.clone(), status);

        Ok(reference)
    }

    async fn status(&self, reference: &SettlementRef) -> Result<TransferStatus, LedgerError> {
        self.state()
            .statuses
            .get(&reference.0)
            .cloned()
            .ok_or_else(|| LedgerError::UnknownRef(reference.0.clone()))
    }
}

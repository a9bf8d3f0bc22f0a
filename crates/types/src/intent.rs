use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::{UnknownStatus, INTENT_ID_LEN};

/// Lifecycle of a payment intent.
///
/// Legal moves are `Pending -> Sent -> Done`, `Pending -> Fail` and
/// `Sent -> Fail`. `Fail` and `Done` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntentStatus {
    Pending,
    Sent,
    Fail,
    Done,
}

impl IntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntentStatus::Pending => "pending",
            IntentStatus::Sent => "sent",
            IntentStatus::Fail => "fail",
            IntentStatus::Done => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, IntentStatus::Fail | IntentStatus::Done)
    }

    /// Whether `self -> next` is a forward move of the state machine
    pub fn can_transition_to(&self, next: IntentStatus) -> bool {
        matches!(
            (self, next),
            (IntentStatus::Pending, IntentStatus::Sent)
                | (IntentStatus::Pending, IntentStatus::Fail)
                | (IntentStatus::Sent, IntentStatus::Done)
                | (IntentStatus::Sent, IntentStatus::Fail)
        )
    }

    /// Statuses from which `self` may be entered
    pub fn predecessors(&self) -> &'static [IntentStatus] {
        match self {
            IntentStatus::Pending => &[],
            IntentStatus::Sent => &[IntentStatus::Pending],
            IntentStatus::Fail => &[IntentStatus::Pending, IntentStatus::Sent],
            IntentStatus::Done => &[IntentStatus::Sent],
        }
    }
}

impl fmt::Display for IntentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntentStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(IntentStatus::Pending),
            "sent" => Ok(IntentStatus::Sent),
            "fail" => Ok(IntentStatus::Fail),
            "done" => Ok(IntentStatus::Done),
            other => Err(UnknownStatus::new("intent", other)),
        }
    }
}

/// A durable record of one requested payment and its outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    /// Deterministic id, see [`intent_id`]
    pub id: String,

    /// Paying account address
    pub from: String,

    /// Recipient exactly as the caller gave it (username or address)
    pub to: String,

    /// Address actually targeted, once known
    pub to_resolved: Option<String>,

    /// Amount in the token's smallest unit
    pub amount: u64,

    /// Token registry key, e.g. `usdc`
    pub token: String,

    /// Opaque handle returned by the ledger on submission
    pub settlement_ref: Option<String>,

    /// Unix seconds
    pub created_at: u64,

    pub status: IntentStatus,
}

impl Intent {
    /// Build a fresh `pending` intent for the given request
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        amount: u64,
        token: impl Into<String>,
        created_at: u64,
    ) -> Self {
        let from = from.into();
        let to = to.into();
        let id = intent_id(&from, &to, amount, created_at);

        Self {
            id,
            from,
            to,
            to_resolved: None,
            amount,
            token: token.into(),
            settlement_ref: None,
            created_at,
            status: IntentStatus::Pending,
        }
    }

    /// Short prefix used in log lines
    pub fn short_id(&self) -> &str {
        &self.id[..self.id.len().min(8)]
    }
}

/// Deterministic intent id: the same four inputs within the same second
/// always yield the same id.
pub fn intent_id(from: &str, to: &str, amount: u64, created_at: u64) -> String {
    let digest = Sha256::digest(format!("{from}:{to}:{amount}:{created_at}").as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(INTENT_ID_LEN);
    id
}

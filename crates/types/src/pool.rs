use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::{UnknownStatus, POOL_ID_LEN};

/// Lifecycle of a rotating savings pool: `Open -> Active -> Done`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolStatus {
    Open,
    Active,
    Done,
}

impl PoolStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PoolStatus::Open => "open",
            PoolStatus::Active => "active",
            PoolStatus::Done => "done",
        }
    }

    pub fn can_transition_to(&self, next: PoolStatus) -> bool {
        matches!(
            (self, next),
            (PoolStatus::Open, PoolStatus::Active) | (PoolStatus::Active, PoolStatus::Done)
        )
    }
}

impl fmt::Display for PoolStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(PoolStatus::Open),
            "active" => Ok(PoolStatus::Active),
            "done" => Ok(PoolStatus::Done),
            other => Err(UnknownStatus::new("pool", other)),
        }
    }
}

/// A rotating savings group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pool {
    pub id: String,
    pub name: String,
    pub token: String,

    /// Fixed per-round amount every non-winner pays, in smallest units
    pub contribution: u64,

    /// Usernames in join order; index 0 is the creator
    pub members: Vec<String>,

    /// 0 while open, then 1..=N while active
    pub round: u32,

    pub status: PoolStatus,
    pub created_at: u64,
}

impl Pool {
    pub fn new(
        name: impl Into<String>,
        token: impl Into<String>,
        contribution: u64,
        creator: impl Into<String>,
        created_at: u64,
    ) -> Self {
        let name = name.into();
        let creator = creator.into();
        let id = pool_id(&name, &creator, created_at);

        Self {
            id,
            name,
            token: token.into(),
            contribution,
            members: vec![creator],
            round: 0,
            status: PoolStatus::Open,
            created_at,
        }
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    pub fn is_member(&self, username: &str) -> bool {
        self.members.iter().any(|m| m == username)
    }

    /// Whether every member has had their payout round
    pub fn is_last_round(&self) -> bool {
        self.round as usize >= self.members.len()
    }
}

/// One member's state within one pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolMember {
    pub pool_id: String,
    pub username: String,

    /// Payout address, if the member supplied one
    pub pubkey: Option<String>,

    /// Paid for the current round; reset each round
    pub paid: bool,

    /// Received their payout round
    pub claimed: bool,

    /// 0-based join rank
    pub order: u32,
}

impl PoolMember {
    pub fn new(
        pool_id: impl Into<String>,
        username: impl Into<String>,
        pubkey: Option<String>,
        order: u32,
    ) -> Self {
        Self {
            pool_id: pool_id.into(),
            username: username.into(),
            pubkey: pubkey.filter(|p| !p.is_empty()),
            paid: false,
            claimed: false,
            order,
        }
    }
}

/// Deterministic pool id over (name, creator, creation second)
pub fn pool_id(name: &str, creator: &str, created_at: u64) -> String {
    let digest = Sha256::digest(format!("{name}:{creator}:{created_at}").as_bytes());
    let mut id = hex::encode(digest);
    id.truncate(POOL_ID_LEN);
    id
}

/// The payee of `round`: the member whose `order == round - 1`
pub fn round_winner(members: &[PoolMember], round: u32) -> Option<&PoolMember> {
    let order = round.checked_sub(1)?;
    members.iter().find(|m| m.order == order)
}

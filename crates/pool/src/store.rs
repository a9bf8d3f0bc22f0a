use async_trait::async_trait;
use dix_types::{InsertOutcome, Pool, PoolMember, PoolStatus, StoreError};
use std::collections::HashMap;
use tokio::sync::RwLock;

// ═══════════════════════════════════════════════════════════════════════════
// STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════

/// Durable pools and their members.
///
/// Every write that touches more than one row is atomic.
#[async_trait]
pub trait PoolStore: Send + Sync {
    /// Insert a new pool together with its creator at order 0, unless a pool
    /// with the same id already exists
    async fn create_pool(&self, pool: &Pool) -> Result<InsertOutcome<Pool>, StoreError>;

    async fn get_pool(&self, id: &str) -> Result<Option<Pool>, StoreError>;

    /// Most recently created first
    async fn list_pools(&self, limit: usize) -> Result<Vec<Pool>, StoreError>;

    /// Append a member at the next join order and add them to the pool's
    /// member list
    async fn add_member(
        &self,
        pool_id: &str,
        username: &str,
        pubkey: Option<String>,
    ) -> Result<PoolMember, StoreError>;

    async fn get_member(&self, pool_id: &str, username: &str)
        -> Result<Option<PoolMember>, StoreError>;

    /// Members ordered by join order
    async fn list_members(&self, pool_id: &str) -> Result<Vec<PoolMember>, StoreError>;

    /// Set `paid` for `username` if the pool is active in `round` and the
    /// member has not paid yet. Returns whether the flag flipped.
    async fn mark_paid(&self, pool_id: &str, username: &str, round: u32)
        -> Result<bool, StoreError>;

    async fn mark_claimed(&self, pool_id: &str, username: &str) -> Result<(), StoreError>;

    /// Move the pool to `round` / `status`, optionally clearing every
    /// member's `paid` flag, in one step
    async fn save_round(
        &self,
        pool_id: &str,
        round: u32,
        status: PoolStatus,
        reset_paid: bool,
    ) -> Result<Pool, StoreError>;
}

/// Statuses a pool may be in when a round is saved with `status`
pub(crate) fn round_predecessors(status: PoolStatus) -> &'static [PoolStatus] {
    match status {
        PoolStatus::Open => &[],
        PoolStatus::Active => &[PoolStatus::Open, PoolStatus::Active],
        PoolStatus::Done => &[PoolStatus::Active],
    }
}

pub(crate) fn invalid_round(pool: &Pool, status: PoolStatus) -> StoreError {
    StoreError::InvalidTransition {
        id: pool.id.clone(),
        from: pool.status.to_string(),
        to: status.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct Tables {
    pools: HashMap<String, Pool>,
    order: Vec<String>,
    members: HashMap<String, Vec<PoolMember>>,
}

#[derive(Debug, Default)]
pub struct InMemoryPoolStore {
    tables: RwLock<Tables>,
}

impl InMemoryPoolStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PoolStore for InMemoryPoolStore {
    async fn create_pool(&self, pool: &Pool) -> Result<InsertOutcome<Pool>, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.pools.get(&pool.id) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        let creator = pool
            .members
            .first()
            .ok_or_else(|| StoreError::SerializationError("pool has no creator".into()))?;
        let members = vec![PoolMember::new(&pool.id, creator, None, 0)];

        tables.pools.insert(pool.id.clone(), pool.clone());
        tables.order.push(pool.id.clone());
        tables.members.insert(pool.id.clone(), members);
        Ok(InsertOutcome::Inserted)
    }

    async fn get_pool(&self, id: &str) -> Result<Option<Pool>, StoreError> {
        Ok(self.tables.read().await.pools.get(id).cloned())
    }

    async fn list_pools(&self, limit: usize) -> Result<Vec<Pool>, StoreError> {
        let tables = self.tables.read().await;
        let mut pools: Vec<(usize, &Pool)> = tables
            .order
            .iter()
            .enumerate()
            .filter_map(|(seq, id)| tables.pools.get(id).map(|p| (seq, p)))
            .collect();

        pools.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });

        Ok(pools
            .into_iter()
            .take(limit)
            .map(|(_, p)| p.clone())
            .collect())
    }

    async fn add_member(
        &self,
        pool_id: &str,
        username: &str,
        pubkey: Option<String>,
    ) -> Result<PoolMember, StoreError> {
        let mut tables = self.tables.write().await;
        let Tables { pools, members, .. } = &mut *tables;

        let pool = pools
            .get_mut(pool_id)
            .ok_or_else(|| StoreError::NotFound(pool_id.to_string()))?;
        let roster = members.entry(pool_id.to_string()).or_default();
        if roster.iter().any(|m| m.username == username) {
            return Err(StoreError::DuplicateId(format!("{pool_id}/{username}")));
        }

        let member = PoolMember::new(pool_id, username, pubkey, roster.len() as u32);
        roster.push(member.clone());
        pool.members.push(username.to_string());

        Ok(member)
    }

    async fn get_member(
        &self,
        pool_id: &str,
        username: &str,
    ) -> Result<Option<PoolMember>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .members
            .get(pool_id)
            .and_then(|roster| roster.iter().find(|m| m.username == username))
            .cloned())
    }

    async fn list_members(&self, pool_id: &str) -> Result<Vec<PoolMember>, StoreError> {
        let mut roster = self
            .tables
            .read()
            .await
            .members
            .get(pool_id)
            .cloned()
            .unwrap_or_default();
        roster.sort_by_key(|m| m.order);
        Ok(roster)
    }

    async fn mark_paid(
        &self,
        pool_id: &str,
        username: &str,
        round: u32,
    ) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let Tables { pools, members, .. } = &mut *tables;

        let in_round = pools
            .get(pool_id)
            .is_some_and(|p| p.status == PoolStatus::Active && p.round == round);
        if !in_round {
            return Ok(false);
        }

        match members
            .get_mut(pool_id)
            .and_then(|roster| roster.iter_mut().find(|m| m.username == username))
        {
            Some(member) if !member.paid => {
                member.paid = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_claimed(&self, pool_id: &str, username: &str) -> Result<(), StoreError> {
        let mut tables = self.tables.write().await;
        let member = tables
            .members
            .get_mut(pool_id)
            .and_then(|roster| roster.iter_mut().find(|m| m.username == username))
            .ok_or_else(|| StoreError::NotFound(format!("{pool_id}/{username}")))?;
        member.claimed = true;
        Ok(())
    }

    async fn save_round(
        &self,
        pool_id: &str,
        round: u32,
        status: PoolStatus,
        reset_paid: bool,
    ) -> Result<Pool, StoreError> {
        let mut tables = self.tables.write().await;
        let Tables { pools, members, .. } = &mut *tables;

        let pool = pools
            .get_mut(pool_id)
            .ok_or_else(|| StoreError::NotFound(pool_id.to_string()))?;
        if !round_predecessors(status).contains(&pool.status) {
            return Err(invalid_round(pool, status));
        }

        pool.round = round;
        pool.status = status;
        if reset_paid {
            for member in members.get_mut(pool_id).into_iter().flatten() {
                member.paid = false;
            }
        }

        Ok(pool.clone())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

use dix_resolver::AliasResolver;
use dix_settlement::{SettlementError, Settler, Transfer};
use dix_types::{
    decode_address, is_username, round_winner, Clock, InsertOutcome, KeyedLocks, Pool,
    PoolMember, PoolStatus, Signer, TokenRegistry,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::PoolError;
use crate::store::PoolStore;

/// A pool together with its members and the current round's winner
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolView {
    pub pool: Pool,
    pub members: Vec<PoolMember>,
    pub winner: Option<PoolMember>,
}

/// A confirmed contribution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contribution {
    pub pool_id: String,
    pub round: u32,
    pub payer: String,
    pub winner: String,
    pub reference: String,
    pub elapsed: Duration,
}

/// Result of a create call that did not error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolCreation {
    /// Inserted by this call
    Created(Pool),

    /// Same name and creator in the same second; the stored pool is returned
    Existing(Pool),
}

impl PoolCreation {
    pub fn pool(&self) -> &Pool {
        match self {
            PoolCreation::Created(pool) | PoolCreation::Existing(pool) => pool,
        }
    }

    pub fn into_pool(self) -> Pool {
        match self {
            PoolCreation::Created(pool) | PoolCreation::Existing(pool) => pool,
        }
    }

    pub fn is_existing(&self) -> bool {
        matches!(self, PoolCreation::Existing(_))
    }
}

/// What a contributor saw before paying
struct RoundSnapshot {
    pool: Pool,
    winner: PoolMember,
}

// ═══════════════════════════════════════════════════════════════════════════
// ENGINE
// ═══════════════════════════════════════════════════════════════════════════

/// Runs rotating savings pools: `open -> active -> done`.
///
/// Claims and round changes for a pool are serialized on that pool's lock.
/// A contribution is serialized per (pool, payer) for its whole
/// check-submit-mark sequence and only touches the pool lock around the
/// check and the mark, so members of one pool can pay concurrently.
pub struct RotatingPoolEngine<S: PoolStore> {
    store: Arc<S>,
    resolver: Arc<AliasResolver>,
    settler: Settler,
    tokens: TokenRegistry,
    clock: Arc<dyn Clock>,
    locks: KeyedLocks,
}

impl<S: PoolStore> RotatingPoolEngine<S> {
    pub fn new(
        store: Arc<S>,
        resolver: Arc<AliasResolver>,
        settler: Settler,
        tokens: TokenRegistry,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            resolver,
            settler,
            tokens,
            clock,
            locks: KeyedLocks::new(),
        }
    }

    pub async fn create_pool(
        &self,
        name: &str,
        token: &str,
        contribution: u64,
        creator: &str,
    ) -> Result<PoolCreation, PoolError> {
        let creator = normalize(creator)?;
        self.tokens
            .require(token)
            .map_err(|e| PoolError::UnsupportedToken(e.0))?;
        if contribution == 0 {
            return Err(PoolError::InvalidContribution);
        }

        let pool = Pool::new(name, token, contribution, creator, self.clock.now());
        match self.store.create_pool(&pool).await? {
            InsertOutcome::Inserted => {
                info!(
                    pool_id = %pool.id,
                    name = %pool.name,
                    token = %pool.token,
                    contribution = pool.contribution,
                    "pool created"
                );
                Ok(PoolCreation::Created(pool))
            }
            InsertOutcome::Existing(existing) => {
                info!(pool_id = %existing.id, "pool already exists");
                Ok(PoolCreation::Existing(existing))
            }
        }
    }

    /// Add `username` at the next join order. An empty `pubkey` means the
    /// member will be paid at their resolved username.
    pub async fn join_pool(
        &self,
        pool_id: &str,
        username: &str,
        pubkey: Option<String>,
    ) -> Result<PoolMember, PoolError> {
        let username = normalize(username)?;
        let pubkey = pubkey.filter(|p| !p.is_empty());
        if let Some(address) = &pubkey {
            decode_address(address).map_err(|e| PoolError::InvalidAddress {
                address: address.clone(),
                reason: e.to_string(),
            })?;
        }

        let _guard = self.locks.lock(&pool_key(pool_id)).await;

        let pool = self.load_pool(pool_id).await?;
        if pool.status != PoolStatus::Open {
            return Err(PoolError::PoolNotOpen);
        }
        if pool.is_member(&username) {
            return Err(PoolError::AlreadyMember(username));
        }

        let member = self.store.add_member(pool_id, &username, pubkey).await?;
        info!(pool_id = %pool_id, username = %member.username, order = member.order, "member joined");
        Ok(member)
    }

    pub async fn start_pool(&self, pool_id: &str) -> Result<Pool, PoolError> {
        let _guard = self.locks.lock(&pool_key(pool_id)).await;

        let pool = self.load_pool(pool_id).await?;
        if pool.status != PoolStatus::Open {
            return Err(PoolError::PoolNotOpen);
        }
        if pool.member_count() < 2 {
            return Err(PoolError::InsufficientMembers {
                count: pool.member_count(),
            });
        }

        let pool = self
            .store
            .save_round(pool_id, 1, PoolStatus::Active, true)
            .await?;
        info!(pool_id = %pool_id, members = pool.member_count(), "pool started");
        Ok(pool)
    }

    /// Pay this round's contribution from `payer` to the round's winner and
    /// mark `payer` paid once the ledger confirms.
    ///
    /// A failed or timed-out settlement leaves `payer` unpaid, so the call
    /// can be repeated.
    pub async fn contribute(
        &self,
        pool_id: &str,
        payer: &str,
        signer: &dyn Signer,
    ) -> Result<Contribution, PoolError> {
        let payer = normalize(payer)?;
        let _payer_guard = self
            .locks
            .lock(&format!("contribute:{pool_id}:{payer}"))
            .await;

        let RoundSnapshot { pool, winner } = {
            let _guard = self.locks.lock(&pool_key(pool_id)).await;
            self.round_snapshot(pool_id, &payer).await?
        };

        let to = match &winner.pubkey {
            Some(address) => address.clone(),
            None => self.resolver.resolve(&winner.username).await?,
        };
        let token = self
            .tokens
            .require(&pool.token)
            .map_err(|e| SettlementError::UnsupportedToken(e.0))?
            .clone();

        let transfer = Transfer {
            from: signer.address().to_string(),
            to,
            amount: pool.contribution,
            token,
        };

        debug!(pool_id = %pool_id, round = pool.round, payer = %payer, winner = %winner.username, "submitting contribution");
        let settled = match self.settler.settle(&transfer, signer).await {
            Ok(settled) => settled,
            Err(e) => {
                warn!(
                    pool_id = %pool_id,
                    round = pool.round,
                    payer = %payer,
                    stage = ?e.stage(),
                    error = %e,
                    "contribution failed"
                );
                return Err(e.into());
            }
        };

        let marked = {
            let _guard = self.locks.lock(&pool_key(pool_id)).await;
            self.store.mark_paid(pool_id, &payer, pool.round).await?
        };
        if !marked {
            warn!(
                pool_id = %pool_id,
                round = pool.round,
                payer = %payer,
                reference = %settled.reference,
                "contribution confirmed after the round moved on"
            );
            return Err(PoolError::RoundAdvanced { round: pool.round });
        }

        info!(
            pool_id = %pool_id,
            round = pool.round,
            payer = %payer,
            winner = %winner.username,
            reference = %settled.reference,
            "contribution recorded"
        );

        Ok(Contribution {
            pool_id: pool_id.to_string(),
            round: pool.round,
            payer,
            winner: winner.username,
            reference: settled.reference.0,
            elapsed: settled.elapsed,
        })
    }

    async fn round_snapshot(&self, pool_id: &str, payer: &str) -> Result<RoundSnapshot, PoolError> {
        let pool = self.load_pool(pool_id).await?;
        if pool.status != PoolStatus::Active {
            return Err(PoolError::PoolNotActive);
        }

        let members = self.store.list_members(pool_id).await?;
        let member = members
            .iter()
            .find(|m| m.username == payer)
            .ok_or_else(|| PoolError::NotMember(payer.to_string()))?;
        if member.paid {
            return Err(PoolError::AlreadyPaid(payer.to_string()));
        }

        let winner = round_winner(&members, pool.round)
            .cloned()
            .ok_or(PoolError::NoWinnerForRound(pool.round))?;

        Ok(RoundSnapshot { pool, winner })
    }

    /// The round's winner takes the pot once every other member has paid;
    /// the pool then moves to the next round or finishes.
    pub async fn claim(&self, pool_id: &str, username: &str) -> Result<Pool, PoolError> {
        let username = normalize(username)?;
        let _guard = self.locks.lock(&pool_key(pool_id)).await;

        let pool = self.load_pool(pool_id).await?;
        if pool.status != PoolStatus::Active {
            return Err(PoolError::PoolNotActive);
        }

        let members = self.store.list_members(pool_id).await?;
        let winner = round_winner(&members, pool.round)
            .ok_or(PoolError::NoWinnerForRound(pool.round))?;
        if winner.username != username {
            return Err(PoolError::NotYourTurn {
                winner: winner.username.clone(),
            });
        }

        let unpaid: Vec<String> = members
            .iter()
            .filter(|m| m.username != username && !m.paid)
            .map(|m| m.username.clone())
            .collect();
        if !unpaid.is_empty() {
            return Err(PoolError::NotAllPaid { unpaid });
        }

        self.store.mark_claimed(pool_id, &username).await?;
        info!(pool_id = %pool_id, round = pool.round, winner = %username, "round claimed");

        self.advance_locked(pool).await
    }

    /// Move to the next round, or finish the pool after its last round.
    /// Only reached from a successful claim, with the pool lock held.
    async fn advance_locked(&self, pool: Pool) -> Result<Pool, PoolError> {
        if pool.status != PoolStatus::Active {
            return Err(PoolError::PoolNotActive);
        }

        if pool.is_last_round() {
            let done = self
                .store
                .save_round(&pool.id, pool.round, PoolStatus::Done, false)
                .await?;
            info!(pool_id = %done.id, rounds = done.round, "pool completed");
            return Ok(done);
        }

        let next = self
            .store
            .save_round(&pool.id, pool.round + 1, PoolStatus::Active, true)
            .await?;
        info!(pool_id = %next.id, round = next.round, "round advanced");
        Ok(next)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn pool_status(&self, pool_id: &str) -> Result<PoolView, PoolError> {
        let pool = self.load_pool(pool_id).await?;
        let members = self.store.list_members(pool_id).await?;
        let winner = match pool.status {
            PoolStatus::Active => round_winner(&members, pool.round).cloned(),
            _ => None,
        };

        Ok(PoolView {
            pool,
            members,
            winner,
        })
    }

    pub async fn list_pools(&self, limit: usize) -> Result<Vec<Pool>, PoolError> {
        Ok(self.store.list_pools(limit).await?)
    }

    async fn load_pool(&self, pool_id: &str) -> Result<Pool, PoolError> {
        self.store
            .get_pool(pool_id)
            .await?
            .ok_or_else(|| PoolError::PoolNotFound(pool_id.to_string()))
    }
}

fn pool_key(pool_id: &str) -> String {
    format!("pool:{pool_id}")
}

fn normalize(username: &str) -> Result<String, PoolError> {
    let username = username.to_lowercase();
    if is_username(&username) {
        Ok(username)
    } else {
        Err(PoolError::InvalidUsername(username))
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryPoolStore;
    use dix_resolver::{InMemoryAliasCache, MockRegistry, RegistryClient};
    use dix_settlement::{ConfirmMode, ConfirmPolicy, MockLedger};
    use dix_types::{encode_address, AddressSigner, ErrorKind, ManualClock, ADDRESS_BYTES};

    const NOW: u64 = 1_700_000_000;

    fn address(seed: u8) -> String {
        encode_address(&[seed; ADDRESS_BYTES])
    }

    fn signer(username: &str) -> AddressSigner {
        match username {
            "alice" => AddressSigner::new(address(1)),
            "bob" => AddressSigner::new(address(2)),
            _ => AddressSigner::new(address(3)),
        }
    }

    struct Harness {
        engine: Arc<RotatingPoolEngine<InMemoryPoolStore>>,
        ledger: Arc<MockLedger>,
    }

    fn harness() -> Harness {
        let registry: Arc<dyn RegistryClient> = Arc::new(
            MockRegistry::new()
                .with_owner("alice", &address(1))
                .with_owner("bob", &address(2))
                .with_owner("carol", &address(3)),
        );
        let resolver =
            AliasResolver::new(Arc::new(InMemoryAliasCache::new()), Some(registry), "alias")
                .unwrap();
        let ledger = Arc::new(MockLedger::new());
        let settler = Settler::new(
            ledger.clone(),
            ConfirmPolicy {
                timeout: Duration::from_millis(50),
                poll_interval: Duration::from_millis(5),
            },
        );

        let engine = RotatingPoolEngine::new(
            Arc::new(InMemoryPoolStore::new()),
            Arc::new(resolver),
            settler,
            TokenRegistry::builtin(),
            Arc::new(ManualClock::new(NOW)),
        );

        Harness {
            engine: Arc::new(engine),
            ledger,
        }
    }

    async fn started_trip(h: &Harness) -> Pool {
        let pool = h
            .engine
            .create_pool("trip", "usdc", 1_000, "alice")
            .await
            .unwrap()
            .into_pool();
        h.engine.join_pool(&pool.id, "bob", None).await.unwrap();
        h.engine.join_pool(&pool.id, "carol", None).await.unwrap();
        h.engine.start_pool(&pool.id).await.unwrap()
    }

    async fn pay_round(h: &Harness, pool_id: &str, payers: &[&str]) {
        for payer in payers {
            h.engine
                .contribute(pool_id, payer, &signer(payer))
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_three_member_rotation_completes() {
        let h = harness();
        let pool = started_trip(&h).await;
        assert_eq!((pool.round, pool.status), (1, PoolStatus::Active));

        let view = h.engine.pool_status(&pool.id).await.unwrap();
        assert_eq!(view.winner.unwrap().username, "alice");

        pay_round(&h, &pool.id, &["bob", "carol"]).await;
        let pool2 = h.engine.claim(&pool.id, "alice").await.unwrap();
        assert_eq!(pool2.round, 2);

        let view = h.engine.pool_status(&pool.id).await.unwrap();
        assert_eq!(view.winner.unwrap().username, "bob");
        assert!(view.members.iter().all(|m| !m.paid));
        assert!(view.members[0].claimed);

        pay_round(&h, &pool.id, &["alice", "carol"]).await;
        h.engine.claim(&pool.id, "bob").await.unwrap();

        pay_round(&h, &pool.id, &["alice", "bob"]).await;
        let done = h.engine.claim(&pool.id, "carol").await.unwrap();
        assert_eq!(done.status, PoolStatus::Done);
        assert_eq!(done.round, 3);

        let view = h.engine.pool_status(&pool.id).await.unwrap();
        assert!(view.members.iter().all(|m| m.claimed));
        assert!(view.winner.is_none());

        // every member was paid out exactly once, by the other two
        let transfers = h.ledger.submissions();
        assert_eq!(transfers.len(), 6);
        for seed in 1..=3 {
            assert_eq!(
                transfers.iter().filter(|t| t.to == address(seed)).count(),
                2
            );
        }
        assert!(transfers.iter().all(|t| t.amount == 1_000));
    }

    #[tokio::test]
    async fn test_create_pool_validation() {
        let h = harness();

        assert!(matches!(
            h.engine.create_pool("trip", "doge", 1_000, "alice").await,
            Err(PoolError::UnsupportedToken(_))
        ));
        assert!(matches!(
            h.engine.create_pool("trip", "usdc", 0, "alice").await,
            Err(PoolError::InvalidContribution)
        ));
        assert!(matches!(
            h.engine.create_pool("trip", "usdc", 10, "a!").await,
            Err(PoolError::InvalidUsername(_))
        ));
        assert!(h.engine.list_pools(10).await.unwrap().is_empty());

        // same inputs in the same second land on the same pool
        let first = h
            .engine
            .create_pool("trip", "usdc", 10, "Alice")
            .await
            .unwrap();
        let second = h
            .engine
            .create_pool("trip", "usdc", 10, "alice")
            .await
            .unwrap();
        assert!(matches!(first, PoolCreation::Created(_)));
        assert!(second.is_existing());
        assert_eq!(second.pool(), first.pool());

        let first = first.into_pool();
        assert_eq!(first.members, vec!["alice"]);
        assert_eq!(h.engine.list_pools(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_join_and_start_rules() {
        let h = harness();
        let pool = h
            .engine
            .create_pool("trip", "usdc", 1_000, "alice")
            .await
            .unwrap()
            .into_pool();

        let err = h.engine.start_pool(&pool.id).await.unwrap_err();
        assert!(matches!(err, PoolError::InsufficientMembers { count: 1 }));
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = h
            .engine
            .join_pool(&pool.id, "alice", None)
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::AlreadyMember(_)));
        assert_eq!(err.kind(), ErrorKind::Conflict);

        assert!(matches!(
            h.engine
                .join_pool(&pool.id, "bob", Some("not-an-address".into()))
                .await,
            Err(PoolError::InvalidAddress { .. })
        ));
        assert!(matches!(
            h.engine.join_pool("missing", "bob", None).await,
            Err(PoolError::PoolNotFound(_))
        ));

        let bob = h.engine.join_pool(&pool.id, "bob", None).await.unwrap();
        assert_eq!(bob.order, 1);
        h.engine.start_pool(&pool.id).await.unwrap();

        assert!(matches!(
            h.engine.join_pool(&pool.id, "carol", None).await,
            Err(PoolError::PoolNotOpen)
        ));
        assert!(matches!(
            h.engine.start_pool(&pool.id).await,
            Err(PoolError::PoolNotOpen)
        ));
    }

    #[tokio::test]
    async fn test_round_gating() {
        let h = harness();
        let pool = started_trip(&h).await;

        h.engine
            .contribute(&pool.id, "bob", &signer("bob"))
            .await
            .unwrap();

        let err = h
            .engine
            .contribute(&pool.id, "bob", &signer("bob"))
            .await
            .unwrap_err();
        assert!(matches!(err, PoolError::AlreadyPaid(_)));

        let err = h.engine.claim(&pool.id, "alice").await.unwrap_err();
        assert!(matches!(err, PoolError::NotAllPaid { ref unpaid } if unpaid == &["carol"]));

        let err = h.engine.claim(&pool.id, "bob").await.unwrap_err();
        assert!(matches!(err, PoolError::NotYourTurn { ref winner } if winner == "alice"));

        assert!(matches!(
            h.engine.contribute(&pool.id, "dave", &signer("dave")).await,
            Err(PoolError::NotMember(_))
        ));
        assert_eq!(h.ledger.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_contribution_before_start_is_rejected() {
        let h = harness();
        let pool = h
            .engine
            .create_pool("trip", "usdc", 1_000, "alice")
            .await
            .unwrap()
            .into_pool();
        h.engine.join_pool(&pool.id, "bob", None).await.unwrap();

        assert!(matches!(
            h.engine.contribute(&pool.id, "bob", &signer("bob")).await,
            Err(PoolError::PoolNotActive)
        ));
        assert!(matches!(
            h.engine.claim(&pool.id, "alice").await,
            Err(PoolError::PoolNotActive)
        ));
    }

    #[tokio::test]
    async fn test_failed_contribution_can_be_retried() {
        let h = harness();
        let pool = started_trip(&h).await;
        h.ledger.set_confirm_mode(ConfirmMode::Never);

        let err = h
            .engine
            .contribute(&pool.id, "bob", &signer("bob"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PoolError::Settlement(SettlementError::ConfirmationTimeout(_))
        ));
        assert_eq!(err.kind(), ErrorKind::Timeout);

        let bob = &h.engine.pool_status(&pool.id).await.unwrap().members[1];
        assert!(!bob.paid);

        h.ledger.set_confirm_mode(ConfirmMode::Immediate);
        let contribution = h
            .engine
            .contribute(&pool.id, "bob", &signer("bob"))
            .await
            .unwrap();
        assert_eq!(contribution.winner, "alice");
        assert_eq!(contribution.round, 1);
        assert_eq!(h.ledger.submission_count(), 2);
    }

    #[tokio::test]
    async fn test_stored_pubkey_is_the_payout_address() {
        let h = harness();
        let pool = h
            .engine
            .create_pool("trip", "usdc", 1_000, "alice")
            .await
            .unwrap()
            .into_pool();
        h.engine
            .join_pool(&pool.id, "bob", Some(address(42)))
            .await
            .unwrap();
        h.engine.start_pool(&pool.id).await.unwrap();

        pay_round(&h, &pool.id, &["bob"]).await;
        h.engine.claim(&pool.id, "alice").await.unwrap();
        pay_round(&h, &pool.id, &["alice"]).await;

        let transfers = h.ledger.submissions();
        assert_eq!(transfers[0].to, address(1));
        assert_eq!(transfers[1].to, address(42));
    }

    #[tokio::test]
    async fn test_concurrent_contributions_pay_once() {
        let h = harness();
        let pool = started_trip(&h).await;
        h.ledger.set_submit_delay(Duration::from_millis(10));

        let calls = (0..6).map(|_| {
            let engine = h.engine.clone();
            let pool_id = pool.id.clone();
            tokio::spawn(async move { engine.contribute(&pool_id, "bob", &signer("bob")).await })
        });
        let results: Vec<_> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, PoolError::AlreadyPaid(_))));
        assert_eq!(h.ledger.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_claims_advance_once() {
        let h = harness();
        let pool = started_trip(&h).await;
        pay_round(&h, &pool.id, &["bob", "carol"]).await;

        let calls = (0..4).map(|_| {
            let engine = h.engine.clone();
            let pool_id = pool.id.clone();
            tokio::spawn(async move { engine.claim(&pool_id, "alice").await })
        });
        let results: Vec<_> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let view = h.engine.pool_status(&pool.id).await.unwrap();
        assert_eq!(view.pool.round, 2);
    }

    #[tokio::test]
    async fn test_rounds_only_advance_through_claim() {
        let h = harness();
        let pool = started_trip(&h).await;

        // nobody has paid: the winner cannot claim, the round stays put
        let err = h.engine.claim(&pool.id, "alice").await.unwrap_err();
        assert!(matches!(err, PoolError::NotAllPaid { ref unpaid } if unpaid == &["bob", "carol"]));
        pay_round(&h, &pool.id, &["bob"]).await;
        assert!(matches!(
            h.engine.claim(&pool.id, "alice").await,
            Err(PoolError::NotAllPaid { .. })
        ));
        assert!(matches!(
            h.engine.claim(&pool.id, "bob").await,
            Err(PoolError::NotYourTurn { .. })
        ));

        let view = h.engine.pool_status(&pool.id).await.unwrap();
        assert_eq!((view.pool.round, view.pool.status), (1, PoolStatus::Active));
        assert!(view.members.iter().all(|m| !m.claimed));

        pay_round(&h, &pool.id, &["carol"]).await;
        let next = h.engine.claim(&pool.id, "alice").await.unwrap();
        assert_eq!((next.round, next.status), (2, PoolStatus::Active));
        assert_eq!(h.ledger.submission_count(), 2);
    }
}

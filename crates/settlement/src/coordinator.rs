use dix_resolver::AliasResolver;
use dix_types::{
    decode_address, Clock, InsertOutcome, Intent, IntentStatus, RecipientRef, Signer,
    StoreError, TokenRegistry,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::error::SettlementError;
use crate::ledger::{Settler, Transfer};
use crate::store::{IntentStore, IntentTransition, IntentUpdate};

/// Result of a pay call that did not error
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PayOutcome {
    /// Submitted and confirmed by this call
    Settled { intent: Intent, elapsed: Duration },

    /// An intent with the same id already existed; nothing was submitted
    Duplicate { intent: Intent },
}

impl PayOutcome {
    pub fn intent(&self) -> &Intent {
        match self {
            PayOutcome::Settled { intent, .. } | PayOutcome::Duplicate { intent } => intent,
        }
    }

    pub fn into_intent(self) -> Intent {
        match self {
            PayOutcome::Settled { intent, .. } | PayOutcome::Duplicate { intent } => intent,
        }
    }

    pub fn is_duplicate(&self) -> bool {
        matches!(self, PayOutcome::Duplicate { .. })
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// COORDINATOR
// ═══════════════════════════════════════════════════════════════════════════

/// Drives payment intents through `pending -> sent -> done | fail`.
///
/// The intent row is written before any external call, and every later
/// outcome is recorded on it. The coordinator never resubmits on its own:
/// a retried call with the same inputs in the same second short-circuits
/// on the existing intent.
pub struct SettlementCoordinator<S: IntentStore> {
    store: Arc<S>,
    resolver: Arc<AliasResolver>,
    settler: Settler,
    tokens: TokenRegistry,
    clock: Arc<dyn Clock>,
}

impl<S: IntentStore> SettlementCoordinator<S> {
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
        }
    }

    pub fn settler(&self) -> &Settler {
        &self.settler
    }

    pub fn tokens(&self) -> &TokenRegistry {
        &self.tokens
    }

    /// Pay `amount` of `token` from the signer's account to `to`, a
    /// username or a raw address.
    pub async fn pay(
        &self,
        signer: &dyn Signer,
        to: &str,
        amount: u64,
        token: &str,
    ) -> Result<PayOutcome, SettlementError> {
        let intent = Intent::new(signer.address(), to, amount, token, self.clock.now());

        if let InsertOutcome::Existing(existing) = self.store.insert_if_absent(&intent).await? {
            info!(
                intent_id = %existing.id,
                status = %existing.status,
                "duplicate intent, not resubmitting"
            );
            return Ok(PayOutcome::Duplicate { intent: existing });
        }

        info!(
            intent_id = %intent.id,
            to = %intent.to,
            amount = intent.amount,
            token = %intent.token,
            "intent created"
        );

        self.drive(&intent, signer).await
    }

    async fn drive(&self, intent: &Intent, signer: &dyn Signer) -> Result<PayOutcome, SettlementError> {
        let id = intent.id.as_str();

        let resolved = match self.resolve_recipient(&intent.to).await {
            Ok(address) => address,
            Err(e) => return Err(self.fail(id, None, e).await),
        };

        if intent.amount == 0 {
            return Err(self.fail(id, Some(resolved), SettlementError::ZeroAmount).await);
        }

        let token = match self.tokens.require(&intent.token) {
            Ok(token) => token.clone(),
            Err(e) => {
                let err = SettlementError::UnsupportedToken(e.0);
                return Err(self.fail(id, Some(resolved), err).await);
            }
        };

        let transfer = Transfer {
            from: intent.from.clone(),
            to: resolved.clone(),
            amount: intent.amount,
            token,
        };

        let started = Instant::now();
        let reference = match self.settler.submit(&transfer, signer).await {
            Ok(reference) => reference,
            Err(e) => return Err(self.fail(id, Some(resolved), e).await),
        };

        self.store
            .advance(
                id,
                IntentUpdate::new(IntentStatus::Sent, self.clock.now())
                    .with_resolved(resolved)
                    .with_settlement_ref(reference.as_str()),
            )
            .await
            .map_err(|e| record_failed(id, e))?;
        info!(intent_id = %id, reference = %reference, "intent sent");

        if let Err(e) = self.settler.confirm(&reference).await {
            return Err(self.fail(id, None, e).await);
        }

        let intent = self
            .store
            .advance(id, IntentUpdate::new(IntentStatus::Done, self.clock.now()))
            .await
            .map_err(|e| record_failed(id, e))?;
        let elapsed = started.elapsed();
        info!(intent_id = %id, elapsed_ms = elapsed.as_millis() as u64, "intent done");

        Ok(PayOutcome::Settled { intent, elapsed })
    }

    async fn resolve_recipient(&self, to: &str) -> Result<String, SettlementError> {
        match RecipientRef::classify(to) {
            RecipientRef::Username(username) => Ok(self.resolver.resolve(&username).await?),
            RecipientRef::Address(address) => match decode_address(&address) {
                Ok(_) => Ok(address),
                Err(e) => Err(SettlementError::InvalidAddress {
                    address,
                    reason: e.to_string(),
                }),
            },
        }
    }

    /// Record `error` as the intent's terminal failure and hand it back.
    ///
    /// A store error while recording is logged; the caller still sees the
    /// original failure.
    async fn fail(
        &self,
        id: &str,
        resolved: Option<String>,
        error: SettlementError,
    ) -> SettlementError {
        let mut update =
            IntentUpdate::new(IntentStatus::Fail, self.clock.now()).with_details(error.to_string());
        if let Some(address) = resolved {
            update = update.with_resolved(address);
        }

        match self.store.advance(id, update).await {
            Ok(_) => warn!(
                intent_id = %id,
                stage = ?error.stage(),
                error = %error,
                "intent failed"
            ),
            Err(store_err) => error!(
                intent_id = %id,
                error = %error,
                store_error = %store_err,
                "could not record intent failure"
            ),
        }

        error
    }

    // ═══════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════

    pub async fn get_intent(&self, id: &str) -> Result<Intent, SettlementError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| SettlementError::IntentNotFound(id.to_string()))
    }

    pub async fn list_intents(&self, limit: usize) -> Result<Vec<Intent>, SettlementError> {
        Ok(self.store.list_recent(limit).await?)
    }

    pub async fn history(&self, id: &str) -> Result<Vec<IntentTransition>, SettlementError> {
        self.get_intent(id).await?;
        Ok(self.store.history(id).await?)
    }

    /// Intents still `pending` or `sent` that were created more than
    /// `older_than_secs` ago. Diagnosis only; nothing is resubmitted.
    pub async fn list_unsettled(&self, older_than_secs: u64) -> Result<Vec<Intent>, SettlementError> {
        let cutoff = self.clock.now().saturating_sub(older_than_secs);
        Ok(self.store.list_unsettled(cutoff).await?)
    }
}

fn record_failed(id: &str, source: StoreError) -> SettlementError {
    error!(intent_id = %id, error = %source, "could not record intent progress");
    SettlementError::RecordFailed {
        intent_id: id.to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{ConfirmMode, ConfirmPolicy, MockLedger};
    use crate::error::PayStage;
    use crate::store::InMemoryIntentStore;
    use dix_resolver::{InMemoryAliasCache, MockRegistry, RegistryClient, ResolveError};
    use dix_types::{encode_address, AddressSigner, ErrorKind, ManualClock, ADDRESS_BYTES};

    const NOW: u64 = 1_700_000_000;

    fn address(seed: u8) -> String {
        encode_address(&[seed; ADDRESS_BYTES])
    }

    struct Harness {
        coordinator: Arc<SettlementCoordinator<InMemoryIntentStore>>,
        store: Arc<InMemoryIntentStore>,
        ledger: Arc<MockLedger>,
        clock: Arc<ManualClock>,
        signer: AddressSigner,
    }

    fn harness() -> Harness {
        let registry: Arc<dyn RegistryClient> =
            Arc::new(MockRegistry::new().with_owner("alice", &address(1)));
        let resolver =
            AliasResolver::new(Arc::new(InMemoryAliasCache::new()), Some(registry), "alias")
                .unwrap();
        let ledger = Arc::new(MockLedger::new());
        let clock = Arc::new(ManualClock::new(NOW));
        let settler = Settler::new(
            ledger.clone(),
            ConfirmPolicy {
                timeout: Duration::from_millis(50),
                poll_interval: Duration::from_millis(5),
            },
        );

        let store = Arc::new(InMemoryIntentStore::new());
        let coordinator = SettlementCoordinator::new(
            store.clone(),
            Arc::new(resolver),
            settler,
            TokenRegistry::builtin(),
            clock.clone(),
        );

        Harness {
            coordinator: Arc::new(coordinator),
            store,
            ledger,
            clock,
            signer: AddressSigner::new(address(9)),
        }
    }

    #[tokio::test]
    async fn test_pay_username_settles() {
        let h = harness();

        let outcome = h
            .coordinator
            .pay(&h.signer, "alice", 1_500_000, "usdc")
            .await
            .unwrap();

        let intent = outcome.intent();
        assert!(!outcome.is_duplicate());
        assert_eq!(intent.status, IntentStatus::Done);
        assert_eq!(intent.to, "alice");
        assert_eq!(intent.to_resolved, Some(address(1)));
        assert_eq!(intent.settlement_ref.as_deref(), Some("sig-1"));
        assert_eq!(intent.created_at, NOW);

        let transfers = h.ledger.submissions();
        assert_eq!(transfers[0].to, address(1));
        assert_eq!(transfers[0].from, address(9));
    }

    #[tokio::test]
    async fn test_pay_is_idempotent_within_a_second() {
        let h = harness();

        let first = h
            .coordinator
            .pay(&h.signer, "alice", 100, "usdc")
            .await
            .unwrap();
        let second = h
            .coordinator
            .pay(&h.signer, "alice", 100, "usdc")
            .await
            .unwrap();

        assert!(second.is_duplicate());
        assert_eq!(first.intent().id, second.intent().id);
        assert_eq!(h.ledger.submission_count(), 1);

        // next second is a new intent
        h.clock.advance(1);
        let third = h
            .coordinator
            .pay(&h.signer, "alice", 100, "usdc")
            .await
            .unwrap();
        assert_ne!(third.intent().id, first.intent().id);
        assert_eq!(h.ledger.submission_count(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_identical_pays_submit_once() {
        let h = harness();
        h.ledger.set_submit_delay(Duration::from_millis(10));

        let calls = (0..8).map(|_| {
            let coordinator = h.coordinator.clone();
            let signer = h.signer.clone();
            tokio::spawn(async move { coordinator.pay(&signer, "alice", 42, "usdc").await })
        });
        let outcomes: Vec<PayOutcome> = futures::future::join_all(calls)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(outcomes.iter().filter(|o| !o.is_duplicate()).count(), 1);
        assert_eq!(h.ledger.submission_count(), 1);
        assert_eq!(h.coordinator.list_intents(10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_username_fails_without_resolution() {
        let h = harness();

        let err = h
            .coordinator
            .pay(&h.signer, "nosuchuser", 50, "usdc")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SettlementError::ResolutionFailed(ResolveError::UsernameNotFound(_))
        ));
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let intent = &h.coordinator.list_intents(1).await.unwrap()[0];
        assert_eq!(intent.status, IntentStatus::Fail);
        assert_eq!(intent.to_resolved, None);
        assert_eq!(h.ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_zero_amount_fails_after_resolution() {
        let h = harness();

        let err = h
            .coordinator
            .pay(&h.signer, "alice", 0, "usdc")
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::ZeroAmount));

        let intent = &h.coordinator.list_intents(1).await.unwrap()[0];
        assert_eq!(intent.status, IntentStatus::Fail);
        assert_eq!(intent.to_resolved, Some(address(1)));
        assert_eq!(h.ledger.submission_count(), 0);
    }

    #[tokio::test]
    async fn test_unsupported_token() {
        let h = harness();

        let err = h
            .coordinator
            .pay(&h.signer, &address(2), 10, "doge")
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::UnsupportedToken(ref t) if t == "doge"));
        assert_eq!(err.stage(), Some(crate::PayStage::Validate));

        let intent = &h.coordinator.list_intents(1).await.unwrap()[0];
        assert_eq!(intent.status, IntentStatus::Fail);
        assert_eq!(intent.to_resolved, Some(address(2)));
    }

    #[tokio::test]
    async fn test_raw_address_recipients() {
        let h = harness();

        let outcome = h
            .coordinator
            .pay(&h.signer, &address(3), 10, "usdt")
            .await
            .unwrap();
        assert_eq!(outcome.intent().to_resolved, Some(address(3)));

        // not username-shaped, and not an address either
        let err = h
            .coordinator
            .pay(&h.signer, "Alice", 10, "usdt")
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::InvalidAddress { .. }));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_submit_failure_keeps_resolution() {
        let h = harness();
        h.ledger.reject_submissions(Some("insufficient funds"));

        let err = h
            .coordinator
            .pay(&h.signer, "alice", 10, "usdc")
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::SubmitFailed(_)));
        assert!(err.kind().is_retryable());

        let intent = &h.coordinator.list_intents(1).await.unwrap()[0];
        assert_eq!(intent.status, IntentStatus::Fail);
        assert_eq!(intent.to_resolved, Some(address(1)));
        assert_eq!(intent.settlement_ref, None);
    }

    #[tokio::test]
    async fn test_confirmation_timeout_marks_sent_intent_failed() {
        let h = harness();
        h.ledger.set_confirm_mode(ConfirmMode::Never);

        let err = h
            .coordinator
            .pay(&h.signer, "alice", 10, "usdc")
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::ConfirmationTimeout(_)));

        let intent = &h.coordinator.list_intents(1).await.unwrap()[0];
        assert_eq!(intent.status, IntentStatus::Fail);
        assert_eq!(intent.settlement_ref.as_deref(), Some("sig-1"));

        let history = h.coordinator.history(&intent.id).await.unwrap();
        let moves: Vec<_> = history.iter().map(|t| (t.from, t.to)).collect();
        assert_eq!(
            moves,
            vec![
                (IntentStatus::Pending, IntentStatus::Sent),
                (IntentStatus::Sent, IntentStatus::Fail)
            ]
        );
        assert!(history[1].details.as_deref().unwrap().contains("timed out"));

        // retry in the same second is a no-op on the failed intent
        let retry = h
            .coordinator
            .pay(&h.signer, "alice", 10, "usdc")
            .await
            .unwrap();
        assert!(retry.is_duplicate());
        assert_eq!(retry.intent().status, IntentStatus::Fail);
        assert_eq!(h.ledger.submission_count(), 1);
    }

    #[tokio::test]
    async fn test_queries() {
        let h = harness();
        assert!(matches!(
            h.coordinator.get_intent("missing").await,
            Err(SettlementError::IntentNotFound(_))
        ));
        assert!(matches!(
            h.coordinator.history("missing").await,
            Err(SettlementError::IntentNotFound(_))
        ));

        // a settled intent and one left pending by a crash
        h.coordinator
            .pay(&h.signer, "alice", 10, "usdc")
            .await
            .unwrap();
        let stranded = Intent::new(address(9), "alice", 20, "usdc", NOW);
        h.store.insert_if_absent(&stranded).await.unwrap();

        assert!(h.coordinator.list_unsettled(60).await.unwrap().is_empty());

        h.clock.advance(120);
        let unsettled = h.coordinator.list_unsettled(60).await.unwrap();
        assert_eq!(unsettled, vec![stranded]);
        assert_eq!(h.ledger.submission_count(), 1);
    }

    /// Accepts inserts but refuses to record the `sent` step
    struct SentWriteFails(InMemoryIntentStore);

    #[async_trait::async_trait]
    impl IntentStore for SentWriteFails {
        async fn insert_if_absent(&self, intent: &Intent) -> Result<InsertOutcome<Intent>, StoreError> {
            self.0.insert_if_absent(intent).await
        }

        async fn advance(&self, id: &str, update: IntentUpdate) -> Result<Intent, StoreError> {
            if update.status == IntentStatus::Sent {
                return Err(StoreError::DatabaseError("disk I/O error".into()));
            }
            self.0.advance(id, update).await
        }

        async fn get(&self, id: &str) -> Result<Option<Intent>, StoreError> {
            self.0.get(id).await
        }

        async fn list_recent(&self, limit: usize) -> Result<Vec<Intent>, StoreError> {
            self.0.list_recent(limit).await
        }

        async fn list_unsettled(&self, created_before: u64) -> Result<Vec<Intent>, StoreError> {
            self.0.list_unsettled(created_before).await
        }

        async fn history(&self, id: &str) -> Result<Vec<IntentTransition>, StoreError> {
            self.0.history(id).await
        }
    }

    #[tokio::test]
    async fn test_store_failure_after_insert_reports_record_stage() {
        let registry: Arc<dyn RegistryClient> =
            Arc::new(MockRegistry::new().with_owner("alice", &address(1)));
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
        let coordinator = SettlementCoordinator::new(
            Arc::new(SentWriteFails(InMemoryIntentStore::new())),
            Arc::new(resolver),
            settler,
            TokenRegistry::builtin(),
            Arc::new(ManualClock::new(NOW)),
        );
        let signer = AddressSigner::new(address(9));

        let err = coordinator
            .pay(&signer, "alice", 10, "usdc")
            .await
            .unwrap_err();
        assert!(matches!(err, SettlementError::RecordFailed { .. }));
        assert_eq!(err.stage(), Some(PayStage::Record));
        assert_eq!(err.kind(), ErrorKind::Storage);

        // the intent row exists and is left for operator diagnosis
        let intent = &coordinator.list_intents(1).await.unwrap()[0];
        assert_eq!(intent.status, IntentStatus::Pending);
        assert_eq!(ledger.submission_count(), 1);
    }
}

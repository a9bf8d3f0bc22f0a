use dix_config::{validate_config, AppConfig, ConfigError, StorageConfig};
use dix_metrics::{LookupSource, MetricsCollector, OperationSpan, PoolEvent, SettlementFlow};
use dix_pool::{Contribution, PoolCreation, PoolView, RotatingPoolEngine, SqlitePoolStore};
use dix_resolver::{
    AliasResolver, RegistryClient, Resolution, ResolutionSource, ResolveError, SqliteAliasCache,
};
use dix_settlement::{
    ConfirmPolicy, IntentTransition, LedgerClient, PayOutcome, SettlementCoordinator, Settler,
    SqliteIntentStore,
};
use dix_types::{
    AliasEntry, Clock, Intent, IntentStatus, Pool, PoolMember, PoolStatus, Signer, StoreError,
    SystemClock, TokenRegistry,
};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::{info, Instrument};

use crate::error::{DixError, Result};

/// The settlement core: payments, username resolution and rotating pools
/// over one SQLite database.
pub struct Dix {
    config: AppConfig,
    resolver: Arc<AliasResolver>,
    coordinator: SettlementCoordinator<SqliteIntentStore>,
    engine: RotatingPoolEngine<SqlitePoolStore>,
    metrics: MetricsCollector,
}

impl Dix {
    /// Validate `config`, open its database and wire every component.
    ///
    /// `registry` is required when `config.registry.endpoint` is set. Without
    /// one, only usernames already in the cache resolve.
    pub async fn open(
        config: AppConfig,
        ledger: Arc<dyn LedgerClient>,
        registry: Option<Arc<dyn RegistryClient>>,
    ) -> Result<Self> {
        Self::open_with_clock(config, ledger, registry, Arc::new(SystemClock)).await
    }

    pub async fn open_with_clock(
        config: AppConfig,
        ledger: Arc<dyn LedgerClient>,
        registry: Option<Arc<dyn RegistryClient>>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        validate_config(&config)?;
        if let (Some(endpoint), None) = (&config.registry.endpoint, &registry) {
            return Err(ConfigError::ValidationError(format!(
                "registry.endpoint: {endpoint} is configured but no registry client was supplied"
            ))
            .into());
        }

        let tokens = TokenRegistry::restricted(&config.tokens.allowed)
            .map_err(|e| ConfigError::ValidationError(format!("tokens.allowed: {e}")))?;

        let db = connect(&config.storage).await?;
        let cache = SqliteAliasCache::from_pool(db.clone()).await?;
        let intents = SqliteIntentStore::from_pool(db.clone()).await?;
        let pools = SqlitePoolStore::from_pool(db).await?;

        let resolver = Arc::new(AliasResolver::new(
            Arc::new(cache),
            registry,
            config.registry.namespace_tag.clone(),
        )?);
        let settler = Settler::new(
            ledger,
            ConfirmPolicy {
                timeout: config.ledger.confirm_timeout(),
                poll_interval: config.ledger.poll_interval(),
            },
        );

        let coordinator = SettlementCoordinator::new(
            Arc::new(intents),
            resolver.clone(),
            settler.clone(),
            tokens.clone(),
            clock.clone(),
        );
        let engine =
            RotatingPoolEngine::new(Arc::new(pools), resolver.clone(), settler, tokens, clock);

        info!(
            environment = ?config.network.environment,
            db_path = %config.storage.db_path,
            registry = resolver.has_registry(),
            "dix opened"
        );

        Ok(Self {
            config,
            resolver,
            coordinator,
            engine,
            metrics: MetricsCollector::new(),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn tokens(&self) -> &TokenRegistry {
        self.coordinator.tokens()
    }

    pub fn metrics(&self) -> MetricsCollector {
        self.metrics
    }

    /// Prometheus text exposition of every recorded metric
    pub fn export_metrics(&self) -> Result<String> {
        Ok(self.metrics.export_metrics()?)
    }

    fn observe<T>(&self, operation: &str, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            self.metrics.record_error(operation, e.kind());
        }
        result
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PAYMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Pay `amount` to a username or raw address. `token` defaults to the
    /// configured default token.
    pub async fn pay(
        &self,
        signer: &dyn Signer,
        to: &str,
        amount: u64,
        token: Option<&str>,
    ) -> Result<PayOutcome> {
        let token = token.unwrap_or(self.config.tokens.default_token.as_str());
        let span = OperationSpan::new("pay", to).span();

        let result = self
            .coordinator
            .pay(signer, to, amount, token)
            .instrument(span)
            .await;

        match &result {
            Ok(PayOutcome::Settled { elapsed, .. }) => {
                self.metrics.record_intent_created();
                self.metrics.record_intent_status(IntentStatus::Done);
                self.metrics.record_settlement(SettlementFlow::Payment, *elapsed);
            }
            Ok(PayOutcome::Duplicate { .. }) => self.metrics.record_intent_duplicate(),
            Err(e) => {
                if let Some(stage) = e.stage() {
                    self.metrics.record_intent_created();
                    self.metrics.record_intent_failure(stage.as_str());
                }
            }
        }

        self.observe("pay", result.map_err(DixError::from))
    }

    pub async fn get_intent(&self, id: &str) -> Result<Intent> {
        let result = self.coordinator.get_intent(id).await;
        self.observe("get_intent", result.map_err(DixError::from))
    }

    /// Most recent intents first
    pub async fn list_intents(&self, limit: usize) -> Result<Vec<Intent>> {
        let result = self.coordinator.list_intents(limit).await;
        self.observe("list_intents", result.map_err(DixError::from))
    }

    pub async fn intent_history(&self, id: &str) -> Result<Vec<IntentTransition>> {
        let result = self.coordinator.history(id).await;
        self.observe("intent_history", result.map_err(DixError::from))
    }

    /// Intents still pending or sent after `older_than_secs`
    pub async fn list_unsettled(&self, older_than_secs: u64) -> Result<Vec<Intent>> {
        let result = self.coordinator.list_unsettled(older_than_secs).await;
        self.observe("list_unsettled", result.map_err(DixError::from))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ALIASES
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn resolve_alias(&self, username: &str) -> Result<Resolution> {
        let result = self.resolver.lookup(username).await;

        match &result {
            Ok(resolution) => self.metrics.record_alias_lookup(match resolution.source {
                ResolutionSource::Cache => LookupSource::Cache,
                ResolutionSource::Registry => LookupSource::Registry,
            }),
            Err(ResolveError::UsernameNotFound(_)) => {
                self.metrics.record_alias_lookup(LookupSource::Miss)
            }
            Err(_) => {}
        }

        self.observe("resolve_alias", result.map_err(DixError::from))
    }

    /// Register `username` for the signer's address; returns the registry's
    /// handle for the registration
    pub async fn register_alias(&self, username: &str, signer: &dyn Signer) -> Result<String> {
        let result = self.resolver.register(username, signer).await;
        if result.is_ok() {
            self.metrics.record_alias_registered();
        }
        self.observe("register_alias", result.map_err(DixError::from))
    }

    /// Cached usernames, ordered by username
    pub async fn list_aliases(&self) -> Result<Vec<AliasEntry>> {
        let result = self.resolver.list_aliases().await;
        self.observe("list_aliases", result.map_err(DixError::from))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // POOLS
    // ═══════════════════════════════════════════════════════════════════════════

    pub async fn create_pool(
        &self,
        name: &str,
        token: Option<&str>,
        contribution: u64,
        creator: &str,
    ) -> Result<Pool> {
        let token = token.unwrap_or(self.config.tokens.default_token.as_str());
        let result = self
            .engine
            .create_pool(name, token, contribution, creator)
            .await;
        if let Some(event) = result.as_ref().ok().and_then(creation_event) {
            self.metrics.record_pool_event(event);
        }
        let result = result.map(PoolCreation::into_pool);
        self.observe("create_pool", result.map_err(DixError::from))
    }

    pub async fn join_pool(
        &self,
        pool_id: &str,
        username: &str,
        pubkey: Option<String>,
    ) -> Result<PoolMember> {
        let result = self.engine.join_pool(pool_id, username, pubkey).await;
        if result.is_ok() {
            self.metrics.record_pool_event(PoolEvent::Joined);
        }
        self.observe("join_pool", result.map_err(DixError::from))
    }

    pub async fn start_pool(&self, pool_id: &str) -> Result<Pool> {
        let result = self.engine.start_pool(pool_id).await;
        if result.is_ok() {
            self.metrics.record_pool_event(PoolEvent::Started);
        }
        self.observe("start_pool", result.map_err(DixError::from))
    }

    pub async fn contribute_pool(
        &self,
        pool_id: &str,
        payer: &str,
        signer: &dyn Signer,
    ) -> Result<Contribution> {
        let span = OperationSpan::new("contribute_pool", pool_id).span();
        let result = self
            .engine
            .contribute(pool_id, payer, signer)
            .instrument(span)
            .await;

        if let Ok(contribution) = &result {
            self.metrics.record_pool_event(PoolEvent::Contribution);
            self.metrics
                .record_settlement(SettlementFlow::Contribution, contribution.elapsed);
        }
        self.observe("contribute_pool", result.map_err(DixError::from))
    }

    /// Winner claims the round; the pool advances or completes
    pub async fn claim_pool(&self, pool_id: &str, username: &str) -> Result<Pool> {
        let result = self.engine.claim(pool_id, username).await;
        if let Ok(pool) = &result {
            self.record_round_change(pool);
        }
        self.observe("claim_pool", result.map_err(DixError::from))
    }

    fn record_round_change(&self, pool: &Pool) {
        let event = match pool.status {
            PoolStatus::Done => PoolEvent::Completed,
            _ => PoolEvent::RoundAdvanced,
        };
        self.metrics.record_pool_event(event);
    }

    pub async fn pool_status(&self, pool_id: &str) -> Result<PoolView> {
        let result = self.engine.pool_status(pool_id).await;
        self.observe("pool_status", result.map_err(DixError::from))
    }

    /// Most recently created first
    pub async fn list_pools(&self, limit: usize) -> Result<Vec<Pool>> {
        let result = self.engine.list_pools(limit).await;
        self.observe("list_pools", result.map_err(DixError::from))
    }
}

/// A same-second repeat of a create returns the stored pool and is not a
/// new pool.
fn creation_event(creation: &PoolCreation) -> Option<PoolEvent> {
    match creation {
        PoolCreation::Created(_) => Some(PoolEvent::Created),
        PoolCreation::Existing(_) => None,
    }
}

/// Open the configured database. An in-memory database lives on a single
/// connection that is never recycled.
async fn connect(storage: &StorageConfig) -> Result<SqlitePool> {
    let pool = if storage.is_in_memory() {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
    } else {
        SqlitePoolOptions::new()
            .connect(&format!("sqlite:{}?mode=rwc", storage.db_path))
            .await
    };

    pool.map_err(|e| DixError::Store(StoreError::DatabaseError(e.to_string())))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_new_pools_count_as_created() {
        let pool = Pool::new("trip", "usdc", 1_000, "alice".to_string(), 1_700_000_000);

        assert_eq!(
            creation_event(&PoolCreation::Created(pool.clone())),
            Some(PoolEvent::Created)
        );
        assert_eq!(creation_event(&PoolCreation::Existing(pool)), None);
    }
}

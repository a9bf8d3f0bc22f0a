use async_trait::async_trait;
use dix_types::{InsertOutcome, Intent, IntentStatus, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;

// ═══════════════════════════════════════════════════════════════════════════
// CORE TYPES
// ═══════════════════════════════════════════════════════════════════════════

/// One recorded status change of an intent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentTransition {
    pub intent_id: String,
    pub from: IntentStatus,
    pub to: IntentStatus,
    pub at: u64,
    pub details: Option<String>,
}

/// A forward move of an intent, with the fields learned along the way.
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentUpdate {
    pub status: IntentStatus,
    pub at: u64,
    pub to_resolved: Option<String>,
    pub settlement_ref: Option<String>,
    pub details: Option<String>,
}

impl IntentUpdate {
    pub fn new(status: IntentStatus, at: u64) -> Self {
        Self {
            status,
            at,
            to_resolved: None,
            settlement_ref: None,
            details: None,
        }
    }

    pub fn with_resolved(mut self, address: impl Into<String>) -> Self {
        self.to_resolved = Some(address.into());
        self
    }

    pub fn with_settlement_ref(mut self, reference: impl Into<String>) -> Self {
        self.settlement_ref = Some(reference.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

pub(crate) fn invalid_transition(id: &str, from: IntentStatus, to: IntentStatus) -> StoreError {
    StoreError::InvalidTransition {
        id: id.to_string(),
        from: from.to_string(),
        to: to.to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// STORE TRAIT
// ═══════════════════════════════════════════════════════════════════════════

/// Durable intent records. Intents are never deleted.
#[async_trait]
pub trait IntentStore: Send + Sync {
    /// Insert `intent` unless its id already exists, atomically
    async fn insert_if_absent(&self, intent: &Intent) -> Result<InsertOutcome<Intent>, StoreError>;

    /// Move an intent forward and record the transition.
    ///
    /// Rejects with [`StoreError::InvalidTransition`] unless the stored
    /// status is a legal predecessor of `update.status`.
    async fn advance(&self, id: &str, update: IntentUpdate) -> Result<Intent, StoreError>;

    async fn get(&self, id: &str) -> Result<Option<Intent>, StoreError>;

    /// Most recent first
    async fn list_recent(&self, limit: usize) -> Result<Vec<Intent>, StoreError>;

    /// `pending` or `sent` intents created before `created_before`, oldest first
    async fn list_unsettled(&self, created_before: u64) -> Result<Vec<Intent>, StoreError>;

    async fn history(&self, id: &str) -> Result<Vec<IntentTransition>, StoreError>;
}

// ═══════════════════════════════════════════════════════════════════════════
// IN-MEMORY STORE
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct Tables {
    intents: HashMap<String, Intent>,
    /// Insertion order, to break `created_at` ties
    order: Vec<String>,
    transitions: Vec<IntentTransition>,
}

#[derive(Debug, Default)]
pub struct InMemoryIntentStore {
    tables: RwLock<Tables>,
}

impl InMemoryIntentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IntentStore for InMemoryIntentStore {
    async fn insert_if_absent(&self, intent: &Intent) -> Result<InsertOutcome<Intent>, StoreError> {
        let mut tables = self.tables.write().await;
        if let Some(existing) = tables.intents.get(&intent.id) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        tables.intents.insert(intent.id.clone(), intent.clone());
        tables.order.push(intent.id.clone());
        Ok(InsertOutcome::Inserted)
    }

    async fn advance(&self, id: &str, update: IntentUpdate) -> Result<Intent, StoreError> {
        let mut tables = self.tables.write().await;
        let intent = tables
            .intents
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let from = intent.status;
        if !from.can_transition_to(update.status) {
            return Err(invalid_transition(id, from, update.status));
        }

        intent.status = update.status;
        if let Some(resolved) = update.to_resolved {
            intent.to_resolved = Some(resolved);
        }
        if let Some(reference) = update.settlement_ref {
            intent.settlement_ref = Some(reference);
        }
        let updated = intent.clone();

        tables.transitions.push(IntentTransition {
            intent_id: id.to_string(),
            from,
            to: update.status,
            at: update.at,
            details: update.details,
        });

        Ok(updated)
    }

    async fn get(&self, id: &str) -> Result<Option<Intent>, StoreError> {
        Ok(self.tables.read().await.intents.get(id).cloned())
    }

    async fn list_recent(&self, limit: usize) -> Result<Vec<Intent>, StoreError> {
        let tables = self.tables.read().await;
        let mut intents: Vec<(usize, &Intent)> = tables
            .order
            .iter()
            .enumerate()
            .filter_map(|(seq, id)| tables.intents.get(id).map(|i| (seq, i)))
            .collect();

        intents.sort_by(|(seq_a, a), (seq_b, b)| {
            b.created_at.cmp(&a.created_at).then(seq_b.cmp(seq_a))
        });

        Ok(intents
            .into_iter()
            .take(limit)
            .map(|(_, i)| i.clone())
            .collect())
    }

    async fn list_unsettled(&self, created_before: u64) -> Result<Vec<Intent>, StoreError> {
        let tables = self.tables.read().await;
        let mut intents: Vec<Intent> = tables
            .order
            .iter()
            .filter_map(|id| tables.intents.get(id))
            .filter(|i| !i.status.is_terminal() && i.created_at < created_before)
            .cloned()
            .collect();

        intents.sort_by_key(|i| i.created_at);
        Ok(intents)
    }

    async fn history(&self, id: &str) -> Result<Vec<IntentTransition>, StoreError> {
        Ok(self
            .tables
            .read()
            .await
            .transitions
            .iter()
            .filter(|t| t.intent_id == id)
            .cloned()
            .collect())
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════

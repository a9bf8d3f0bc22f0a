use async_trait::async_trait;
use dix_types::{AliasEntry, StoreError};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

/// Durable username → owner mapping.
///
/// Written only after a successful registry resolution. Entries never
/// expire. Keys are lowercase usernames.
#[async_trait]
pub trait AliasCache: Send + Sync {
    async fn get(&self, username: &str) -> Result<Option<String>, StoreError>;

    /// Insert or overwrite the entry for `entry.username`
    async fn put(&self, entry: &AliasEntry) -> Result<(), StoreError>;

    /// Every cached entry, ordered by username
    async fn list(&self) -> Result<Vec<AliasEntry>, StoreError>;
}

#[derive(Debug, Default)]
pub struct InMemoryAliasCache {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemoryAliasCache {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AliasCache for InMemoryAliasCache {
    async fn get(&self, username: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.read().await.get(username).cloned())
    }

    async fn put(&self, entry: &AliasEntry) -> Result<(), StoreError> {
        self.entries
            .write()
            .await
            .insert(entry.username.clone(), entry.owner.clone());
        Ok(())
    }

    async fn list(&self) -> Result<Vec<AliasEntry>, StoreError> {
        Ok(self
            .entries
            .read()
            .await
            .iter()
            .map(|(username, owner)| AliasEntry {
                username: username.clone(),
                owner: owner.clone(),
            })
            .collect())
    }
}

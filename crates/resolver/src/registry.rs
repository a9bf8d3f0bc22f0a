use async_trait::async_trait;
use dix_types::{decode_address, encode_address, Signer, ADDRESS_BYTES};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Registry account layout: an 8-byte header followed by the owner address
pub const PAYLOAD_HEADER_LEN: usize = 8;
pub const MIN_PAYLOAD_LEN: usize = PAYLOAD_HEADER_LEN + ADDRESS_BYTES;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("registry unreachable: {0}")]
    Unreachable(String),

    #[error("registry rejected request: {0}")]
    Rejected(String),
}

/// Authoritative username registry.
///
/// Lookup keys are derived by the client from `namespace` and `username`;
/// the derivation belongs to the registry protocol.
#[async_trait]
pub trait RegistryClient: Send + Sync {
    /// Raw account payload bound to the username, `None` if no account exists
    async fn lookup(&self, namespace: &str, username: &str)
        -> Result<Option<Vec<u8>>, RegistryError>;

    /// Bind `username` to the signer's address; returns the registry's handle
    async fn register(
        &self,
        namespace: &str,
        username: &str,
        signer: &dyn Signer,
    ) -> Result<String, RegistryError>;
}

/// Extract the owner address from a registry payload.
///
/// Payloads shorter than header plus address are treated as absent.
pub fn parse_owner(payload: &[u8]) -> Option<String> {
    let bytes: &[u8; ADDRESS_BYTES] = payload
        .get(PAYLOAD_HEADER_LEN..MIN_PAYLOAD_LEN)?
        .try_into()
        .ok()?;
    Some(encode_address(bytes))
}

/// Build the payload a registry account holds for `owner`
pub fn owner_payload(owner: &str) -> Option<Vec<u8>> {
    let bytes = decode_address(owner).ok()?;
    let mut payload = vec![0u8; PAYLOAD_HEADER_LEN];
    payload.extend_from_slice(&bytes);
    Some(payload)
}

// ═══════════════════════════════════════════════════════════════════════════
// MOCK REGISTRY
// ═══════════════════════════════════════════════════════════════════════════

/// In-process registry for testing
#[derive(Default)]
pub struct MockRegistry {
    accounts: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    lookups: AtomicUsize,
    unreachable: AtomicBool,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `username` to `owner`, which must be a valid address
    pub fn with_owner(self, username: &str, owner: &str) -> Self {
        if let Some(payload) = owner_payload(owner) {
            self.insert_payload(username, payload);
        }
        self
    }

    pub fn insert_payload(&self, username: &str, payload: Vec<u8>) {
        self.accounts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(username.to_string(), payload);
    }

    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// Number of lookups that reached the registry
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn check_reachable(&self) -> Result<(), RegistryError> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(RegistryError::Unreachable("mock registry offline".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RegistryClient for MockRegistry {
    async fn lookup(
        &self,
        _namespace: &str,
        username: &str,
    ) -> Result<Option<Vec<u8>>, RegistryError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        self.check_reachable()?;

        Ok(self
            .accounts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(username)
            .cloned())
    }

    async fn register(
        &self,
        namespace: &str,
        username: &str,
        signer: &dyn Signer,
    ) -> Result<String, RegistryError> {
        self.check_reachable()?;

        let payload = owner_payload(signer.address())
            .ok_or_else(|| RegistryError::Rejected("signer address is malformed".into()))?;

        let mut accounts = self.accounts.lock().unwrap_or_else(|e| e.into_inner());
        if accounts.contains_key(username) {
            return Err(RegistryError::Rejected(format!(
                "{username} is already registered"
            )));
        }
        accounts.insert(username.to_string(), payload);

        Ok(format!("{namespace}-{username}-{}", accounts.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_owner_offsets() {
        let owner = encode_address(&[9u8; ADDRESS_BYTES]);
        let mut payload = owner_payload(&owner).unwrap();
        assert_eq!(payload.len(), MIN_PAYLOAD_LEN);
        assert_eq!(parse_owner(&payload), Some(owner.clone()));

        // trailing bytes after the address are ignored
        payload.extend_from_slice(&[1, 2, 3]);
        assert_eq!(parse_owner(&payload), Some(owner));
    }

    #[test]
    fn test_short_payload_is_absent() {
        assert_eq!(parse_owner(&[]), None);
        assert_eq!(parse_owner(&[0u8; MIN_PAYLOAD_LEN - 1]), None);
    }

    #[tokio::test]
    async fn test_mock_registry_counts_lookups() {
        let owner = encode_address(&[3u8; ADDRESS_BYTES]);
        let registry = MockRegistry::new().with_owner("alice", &owner);

        let found = registry.lookup("alias", "alice").await.unwrap();
        assert_eq!(found.as_deref().and_then(parse_owner), Some(owner));
        assert!(registry.lookup("alias", "bob").await.unwrap().is_none());
        assert_eq!(registry.lookup_count(), 2);

        registry.set_unreachable(true);
        assert!(matches!(
            registry.lookup("alias", "alice").await,
            Err(RegistryError::Unreachable(_))
        ));
    }
}

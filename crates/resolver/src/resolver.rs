use dix_types::{is_username, AliasEntry, Signer};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::AliasCache;
use crate::error::ResolveError;
use crate::registry::{parse_owner, RegistryClient};

/// Where a resolved address came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionSource {
    Cache,
    Registry,
}

impl ResolutionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResolutionSource::Cache => "cache",
            ResolutionSource::Registry => "registry",
        }
    }
}

impl fmt::Display for ResolutionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub username: String,
    pub address: String,
    pub source: ResolutionSource,
}

/// Cache-then-registry username resolver.
///
/// Without a registry client only cached usernames resolve; a miss is then
/// reported as [`ResolveError::RegistryUnavailable`].
pub struct AliasResolver {
    cache: Arc<dyn AliasCache>,
    registry: Option<Arc<dyn RegistryClient>>,
    namespace_tag: String,
}

impl AliasResolver {
    pub fn new(
        cache: Arc<dyn AliasCache>,
        registry: Option<Arc<dyn RegistryClient>>,
        namespace_tag: impl Into<String>,
    ) -> Result<Self, ResolveError> {
        let namespace_tag = namespace_tag.into();
        if namespace_tag.trim().is_empty() {
            return Err(ResolveError::InvalidConfig(
                "registry namespace tag is required".into(),
            ));
        }

        Ok(Self {
            cache,
            registry,
            namespace_tag,
        })
    }

    pub fn has_registry(&self) -> bool {
        self.registry.is_some()
    }

    /// Resolve a username to its owner address
    pub async fn resolve(&self, username: &str) -> Result<String, ResolveError> {
        Ok(self.lookup(username).await?.address)
    }

    /// Resolve a username, reporting which tier answered
    pub async fn lookup(&self, username: &str) -> Result<Resolution, ResolveError> {
        let username = normalize(username)?;

        if let Some(address) = self.cache.get(&username).await? {
            debug!(username = %username, "alias cache hit");
            return Ok(Resolution {
                username,
                address,
                source: ResolutionSource::Cache,
            });
        }

        let registry = self
            .registry
            .as_ref()
            .ok_or_else(|| ResolveError::RegistryUnavailable(username.clone()))?;

        let payload = registry.lookup(&self.namespace_tag, &username).await?;
        let address = payload
            .as_deref()
            .and_then(parse_owner)
            .ok_or_else(|| ResolveError::UsernameNotFound(username.clone()))?;

        self.cache
            .put(&AliasEntry {
                username: username.clone(),
                owner: address.clone(),
            })
            .await?;

        info!(username = %username, address = %address, "alias resolved from registry");

        Ok(Resolution {
            username,
            address,
            source: ResolutionSource::Registry,
        })
    }

    /// Register `username` for the signer's address.
    ///
    /// The cache is left alone; the binding is cached by the first
    /// resolution that reads it back from the registry.
    pub async fn register(
        &self,
        username: &str,
        signer: &dyn Signer,
    ) -> Result<String, ResolveError> {
        let username = normalize(username)?;
        let registry = self
            .registry
            .as_ref()
            .ok_or_else(|| ResolveError::RegistryUnavailable(username.clone()))?;

        let handle = registry
            .register(&self.namespace_tag, &username, signer)
            .await?;

        info!(
            username = %username,
            owner = %signer.address(),
            handle = %handle,
            "alias registered"
        );
        Ok(handle)
    }

    /// Cached usernames, ordered by username
    pub async fn list_aliases(&self) -> Result<Vec<AliasEntry>, ResolveError> {
        Ok(self.cache.list().await?)
    }
}

fn normalize(username: &str) -> Result<String, ResolveError> {
    let username = username.to_lowercase();
    if !is_username(&username) {
        return Err(ResolveError::InvalidUsername(username));
    }
    Ok(username)
}

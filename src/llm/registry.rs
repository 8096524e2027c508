//! Thread-safe directory of providers.
//!
//! Names are case-insensitive. Registration order is preserved for
//! iteration; re-registering a name keeps its original position but swaps
//! the provider (last writer wins). Every read hands back a snapshot, so
//! callers never hold an iterator over internal state.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::llm::provider::Provider;

#[derive(Default)]
struct RegistryInner {
    /// Lowercased names in first-registration order.
    order: Vec<String>,
    providers: HashMap<String, Arc<Provider>>,
}

/// Name → provider directory shared across orchestrations.
#[derive(Default)]
pub struct ProviderRegistry {
    inner: RwLock<RegistryInner>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under its own name. Last writer wins on a name
    /// collision; the name keeps its original iteration position.
    pub async fn register(&self, provider: Arc<Provider>) {
        let key = provider.name().to_lowercase();
        let mut inner = self.inner.write().await;
        if !inner.providers.contains_key(&key) {
            inner.order.push(key.clone());
        }
        tracing::debug!(provider = %provider.display_name(), "registered provider");
        inner.providers.insert(key, provider);
    }

    pub async fn get(&self, name: &str) -> Option<Arc<Provider>> {
        let inner = self.inner.read().await;
        inner.providers.get(&name.to_lowercase()).cloned()
    }

    /// Every provider, in registration order.
    pub async fn all(&self) -> Vec<Arc<Provider>> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|key| inner.providers.get(key).cloned())
            .collect()
    }

    /// Providers whose `is_configured` predicate holds, in registration order.
    pub async fn configured(&self) -> Vec<Arc<Provider>> {
        self.all()
            .await
            .into_iter()
            .filter(|p| p.is_configured())
            .collect()
    }

    /// The intersection with `names`, preserving registration order.
    pub async fn by_names(&self, names: &[String]) -> Vec<Arc<Provider>> {
        let wanted: Vec<String> = names.iter().map(|n| n.to_lowercase()).collect();
        self.all()
            .await
            .into_iter()
            .filter(|p| wanted.contains(&p.name().to_lowercase()))
            .collect()
    }

    pub async fn contains(&self, name: &str) -> bool {
        let inner = self.inner.read().await;
        inner.providers.contains_key(&name.to_lowercase())
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.providers.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

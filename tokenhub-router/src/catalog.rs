//! C1 — registry of models and provider adapters.
//!
//! Held behind its own lock, independent of engine construction, so
//! Selector and RouteEngine can share it without owning the engine itself.

use crate::models::Model;
use crate::providers::Provider;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Holds the Model registry and provider adapter handles behind one readers-writer lock.
#[derive(Default)]
pub struct Catalog {
    inner: RwLock<Inner>,
}

#[derive(Default)]
struct Inner {
    models: HashMap<String, Model>,
    adapters: HashMap<String, Arc<dyn Provider>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register_model(&self, model: Model) {
        self.inner.write().await.models.insert(model.id.clone(), model);
    }

    pub async fn register_adapter(&self, adapter: Arc<dyn Provider>) {
        let id = adapter.id().to_string();
        self.inner.write().await.adapters.insert(id, adapter);
    }

    /// Returns a defensive copy so callers can't mutate the registered entry.
    pub async fn lookup_model(&self, id: &str) -> Option<Model> {
        self.inner.read().await.models.get(id).cloned()
    }

    pub async fn lookup_adapter(&self, provider_id: &str) -> Option<Arc<dyn Provider>> {
        self.inner.read().await.adapters.get(provider_id).cloned()
    }

    /// Returns a snapshot of every registered model.
    pub async fn enumerate_models(&self) -> Vec<Model> {
        self.inner.read().await.models.values().cloned().collect()
    }

    pub async fn set_enabled(&self, model_id: &str, enabled: bool) -> bool {
        let mut inner = self.inner.write().await;
        match inner.models.get_mut(model_id) {
            Some(m) => {
                m.enabled = enabled;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::testing::MockProvider;

    fn model(id: &str, provider: &str, weight: i64, ctx: u64) -> Model {
        Model {
            id: id.to_string(),
            provider_id: provider.to_string(),
            weight,
            max_context_tokens: ctx,
            input_price_per_1k: 0.0,
            output_price_per_1k: 0.0,
            enabled: true,
        }
    }

    #[tokio::test]
    async fn lookup_returns_defensive_copy() {
        let catalog = Catalog::new();
        catalog.register_model(model("m1", "p1", 5, 4096)).await;
        let mut copy = catalog.lookup_model("m1").await.unwrap();
        copy.weight = 999;
        assert_eq!(catalog.lookup_model("m1").await.unwrap().weight, 5);
    }

    #[tokio::test]
    async fn unregistered_adapter_lookup_is_none() {
        let catalog = Catalog::new();
        catalog.register_adapter(Arc::new(MockProvider::new("p1"))).await;
        assert!(catalog.lookup_adapter("p1").await.is_some());
        assert!(catalog.lookup_adapter("p2").await.is_none());
    }

    #[tokio::test]
    async fn enumerate_models_is_a_snapshot() {
        let catalog = Catalog::new();
        catalog.register_model(model("a", "p1", 1, 4096)).await;
        catalog.register_model(model("b", "p1", 2, 4096)).await;
        let models = catalog.enumerate_models().await;
        assert_eq!(models.len(), 2);
    }
}

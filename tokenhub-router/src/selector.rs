//! C6 — policy-filtered eligibility + ordering, combining Scorer and Bandit.
//!
//! Filters the catalog down to eligible candidates (enabled, adapter
//! present, healthy, above any weight/context floor, within budget), then
//! orders them by either the deterministic Scorer or the Bandit, chosen by
//! [`crate::models::Policy::mode`].

use crate::bandit::Bandit;
use crate::catalog::Catalog;
use crate::health::HealthTracker;
use crate::models::{Message, Mode, Model, Policy, Request, SkipReason, TokenBucket};
use crate::scorer;
use rand::Rng;
use std::sync::Arc;

/// Invoked once per model dropped from consideration during eligibility
/// filtering, with the reason it was dropped.
pub type SkipRecorder = Arc<dyn Fn(&str, SkipReason) + Send + Sync>;

/// Which mechanism produced the ordered candidate list — drives the
/// `routed-weight-<w>` / `routed-score-<s>` reason tag on the final `Decision`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionMethod {
    Scorer,
    Bandit,
    WeightFallback,
}

pub struct Selected {
    pub models: Vec<Model>,
    pub method: SelectionMethod,
}

pub struct Selector {
    catalog: Arc<Catalog>,
    health: Arc<HealthTracker>,
    bandit: Option<Arc<Bandit>>,
    skip_recorder: Option<SkipRecorder>,
    /// The Scorer is a capability, like the Bandit — not configured by
    /// default. See DESIGN.md: "Scorer-enabled by default?" Open Question.
    scorer_enabled: bool,
}

impl Selector {
    pub fn new(catalog: Arc<Catalog>, health: Arc<HealthTracker>) -> Self {
        Self {
            catalog,
            health,
            bandit: None,
            skip_recorder: None,
            scorer_enabled: false,
        }
    }

    pub fn with_bandit(mut self, bandit: Arc<Bandit>) -> Self {
        self.bandit = Some(bandit);
        self
    }

    pub fn with_scorer_enabled(mut self) -> Self {
        self.scorer_enabled = true;
        self
    }

    pub fn with_skip_recorder(mut self, recorder: SkipRecorder) -> Self {
        self.skip_recorder = Some(recorder);
        self
    }

    fn record_skip(&self, model_id: &str, reason: SkipReason) {
        if let Some(recorder) = &self.skip_recorder {
            recorder(model_id, reason);
        }
    }

    /// Estimates the input token count for `request`: the caller's estimate
    /// if present, else `sum(len(content)) / 4` over its messages.
    pub fn estimate_tokens(request: &Request) -> u64 {
        if let Some(estimate) = request.estimated_tokens {
            return estimate;
        }
        let total_chars: usize = request.messages.iter().map(|m: &Message| m.content.len()).sum();
        (total_chars / 4) as u64
    }

    /// Produces the ordered candidate list for one request.
    pub async fn select<R: Rng>(
        &self,
        rng: &mut R,
        request: &Request,
        policy: &Policy,
    ) -> Selected {
        let tokens_needed = Self::estimate_tokens(request);
        let models = self.catalog.enumerate_models().await;

        let mut eligible = Vec::new();
        for model in models {
            if !model.enabled {
                self.record_skip(&model.id, SkipReason::Disabled);
                continue;
            }
            if self.catalog.lookup_adapter(&model.provider_id).await.is_none() {
                self.record_skip(&model.id, SkipReason::NoAdapter);
                continue;
            }
            if !self.health.is_available(&model.provider_id).await {
                self.record_skip(&model.id, SkipReason::Unhealthy);
                continue;
            }
            if let Some(min_weight) = policy.min_weight {
                if model.weight < min_weight {
                    self.record_skip(&model.id, SkipReason::BelowMinWeight);
                    continue;
                }
            }
            if tokens_needed > 0 {
                let required = (tokens_needed as f64 * 1.15).ceil() as u64;
                if model.max_context_tokens < required {
                    self.record_skip(&model.id, SkipReason::ContextTooSmall);
                    continue;
                }
            }
            if let Some(max_budget) = policy.max_budget_usd {
                let cost = model.estimated_cost_usd(tokens_needed, policy.estimated_output_tokens);
                if cost > max_budget {
                    self.record_skip(&model.id, SkipReason::OverBudget);
                    continue;
                }
            }
            eligible.push(model);
        }

        if eligible.is_empty() {
            return Selected {
                models: eligible,
                method: SelectionMethod::WeightFallback,
            };
        }

        if policy.mode == Mode::Thompson {
            if let Some(bandit) = &self.bandit {
                let bucket = TokenBucket::classify(tokens_needed);
                let ids: Vec<String> = eligible.iter().map(|m| m.id.clone()).collect();
                let ordered_ids = bandit.sample(rng, &ids, bucket).await;
                return Selected {
                    models: reorder_by_ids(eligible, &ordered_ids),
                    method: SelectionMethod::Bandit,
                };
            }
        }

        if self.scorer_enabled {
            let mut latencies = std::collections::HashMap::new();
            for provider_id in eligible
                .iter()
                .map(|m| m.provider_id.clone())
                .collect::<std::collections::HashSet<_>>()
            {
                let avg = self.health.avg_latency_ms(&provider_id).await;
                latencies.insert(provider_id, avg);
            }

            let models = scorer::order_candidates(
                &eligible,
                tokens_needed,
                policy.estimated_output_tokens,
                |provider| latencies.get(provider).copied().unwrap_or(0.0),
                policy.max_latency_ms,
                policy.mode,
            );
            return Selected {
                models,
                method: SelectionMethod::Scorer,
            };
        }

        eligible.sort_by(|a, b| b.weight.cmp(&a.weight).then_with(|| a.id.cmp(&b.id)));
        Selected {
            models: eligible,
            method: SelectionMethod::WeightFallback,
        }
    }
}

fn reorder_by_ids(models: Vec<Model>, ordered_ids: &[String]) -> Vec<Model> {
    let mut by_id: std::collections::HashMap<String, Model> =
        models.into_iter().map(|m| (m.id.clone(), m)).collect();
    ordered_ids
        .iter()
        .filter_map(|id| by_id.remove(id))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventBus;
    use crate::health::HealthConfig;
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

    async fn setup() -> (Arc<Catalog>, Arc<HealthTracker>) {
        let catalog = Arc::new(Catalog::new());
        let health = Arc::new(HealthTracker::new(HealthConfig::default(), Arc::new(EventBus::default())));
        catalog.register_adapter(Arc::new(MockProvider::new("p1"))).await;
        (catalog, health)
    }

    #[tokio::test]
    async fn weight_driven_selection_orders_highest_first() {
        let (catalog, health) = setup().await;
        catalog.register_model(model("low", "p1", 1, 4096)).await;
        catalog.register_model(model("mid", "p1", 5, 4096)).await;
        catalog.register_model(model("high", "p1", 10, 4096)).await;

        let selector = Selector::new(catalog, health);
        let request = Request {
            messages: vec![Message::user("a")],
            ..Default::default()
        };
        let mut rng = rand::thread_rng();
        let selected = selector.select(&mut rng, &request, &Policy::default()).await;
        assert_eq!(selected.models[0].id, "high");
        assert_eq!(selected.method, SelectionMethod::WeightFallback);
    }

    #[tokio::test]
    async fn budget_exclusion_drops_expensive_model() {
        let (catalog, health) = setup().await;
        let mut expensive = model("expensive", "p1", 10, 4096);
        expensive.input_price_per_1k = 1.0;
        expensive.output_price_per_1k = 1.0;
        let mut cheap = model("cheap", "p1", 3, 4096);
        cheap.input_price_per_1k = 0.0001;
        cheap.output_price_per_1k = 0.0001;
        catalog.register_model(expensive).await;
        catalog.register_model(cheap).await;

        let selector = Selector::new(catalog, health);
        let request = Request {
            messages: vec![Message::user("hello")],
            ..Default::default()
        };
        let policy = Policy {
            max_budget_usd: Some(0.001),
            ..Default::default()
        };
        let mut rng = rand::thread_rng();
        let selected = selector.select(&mut rng, &request, &policy).await;
        assert_eq!(selected.models.len(), 1);
        assert_eq!(selected.models[0].id, "cheap");
    }

    #[tokio::test]
    async fn empty_request_disables_context_filter() {
        let (catalog, health) = setup().await;
        catalog.register_model(model("tiny", "p1", 1, 1)).await;
        let selector = Selector::new(catalog, health);
        let request = Request::default();
        let mut rng = rand::thread_rng();
        let selected = selector.select(&mut rng, &request, &Policy::default()).await;
        assert_eq!(selected.models.len(), 1);
    }
}

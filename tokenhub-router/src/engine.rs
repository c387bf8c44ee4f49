//! C12 — glue wiring C1–C10 into one owned, startable engine.
//!
//! `TokenHubRouter` is the one object a caller constructs and holds. It
//! follows a capability-injection pattern: [`crate::health::HealthTracker`]
//! and [`crate::bandit::Bandit`] are constructed here and passed into
//! [`crate::selector::Selector`]/[`crate::route_engine::RouteEngine`]/
//! [`crate::prober::HealthProber`] rather than reached for as singletons.

use crate::bandit::{Bandit, FetchRewardSummary};
use crate::catalog::Catalog;
use crate::directives::{parse_directives, strip_directives};
use crate::error::EngineError;
use crate::event_bus::EventBus;
use crate::health::{HealthConfig, HealthTracker};
use crate::models::{OrchestrationDirective, Policy, Request};
use crate::orchestrator::{Orchestrator, OrchestrationResult};
use crate::prober::{HealthProber, ProberConfig};
use crate::reward::{NoopRewardSink, RewardSink};
use crate::route_engine::{RouteEngine, RouteOutcome};
use crate::selector::Selector;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, RwLock};
use tokio::task::JoinHandle;

/// Tunables for the subsystems `TokenHubRouter` owns. Everything else
/// (models, adapters, probe targets) is registered after construction.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    pub health: HealthConfig,
    pub prober: ProberConfig,
    #[serde(with = "crate::common::duration_serde")]
    pub bandit_refresh_interval: Duration,
    /// Whether `Selector` consults the deterministic Scorer when
    /// `Policy.mode != thompson`. Defaults to `false`: an engine with no
    /// explicit configuration orders candidates by descending weight (the
    /// `routed-weight-<w>` reason tag in §8 scenario 1), the same ordering
    /// `Selector` falls back to when the Scorer isn't engaged. See
    /// DESIGN.md: "Scorer-enabled by default?"
    pub enable_scorer: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            health: HealthConfig::default(),
            prober: ProberConfig::default(),
            bandit_refresh_interval: Duration::from_secs(300),
            enable_scorer: false,
        }
    }
}

/// Owns the Catalog, HealthTracker, Bandit, EventBus, and HealthProber for
/// one routing deployment, and exposes `route_and_send`/`orchestrate` over
/// them. Callers register models and provider adapters into
/// [`TokenHubRouter::catalog`] before routing any request.
pub struct TokenHubRouter {
    catalog: Arc<Catalog>,
    health: Arc<HealthTracker>,
    event_bus: Arc<EventBus>,
    bandit: Arc<Bandit>,
    prober: Arc<HealthProber>,
    reward_sink: Arc<dyn RewardSink>,
    reward_fetch: Option<FetchRewardSummary>,
    config: EngineConfig,
    bandit_loop: RwLock<Option<(oneshot::Sender<()>, JoinHandle<()>)>>,
}

impl TokenHubRouter {
    /// An engine with no reward persistence and no bandit refresh source —
    /// suitable for `Policy.mode` values other than `thompson`, or for tests.
    pub fn new() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> TokenHubRouterBuilder {
        TokenHubRouterBuilder::default()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn health(&self) -> &Arc<HealthTracker> {
        &self.health
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    pub fn bandit(&self) -> &Arc<Bandit> {
        &self.bandit
    }

    pub fn prober(&self) -> &Arc<HealthProber> {
        &self.prober
    }

    fn build_selector(&self) -> Selector {
        let mut selector = Selector::new(self.catalog.clone(), self.health.clone()).with_bandit(self.bandit.clone());
        if self.config.enable_scorer {
            selector = selector.with_scorer_enabled();
        }
        selector
    }

    fn build_route_engine(&self) -> RouteEngine {
        RouteEngine::new(
            self.catalog.clone(),
            self.health.clone(),
            self.build_selector(),
            self.reward_sink.clone(),
        )
    }

    /// Routes one request against the current catalog.
    pub async fn route_and_send(
        &self,
        request_id: &str,
        request: &Request,
        policy: &Policy,
        deadline: Duration,
    ) -> Result<RouteOutcome, EngineError> {
        let mut rng = rand::thread_rng();
        self.build_route_engine()
            .route_and_send(&mut rng, request_id, request, policy, deadline)
            .await
    }

    /// Parses and strips any `@@tokenhub` directive from the first user
    /// message, folds recognized overrides into `base_policy`, then routes
    /// the stripped request.
    pub async fn route_with_directives(
        &self,
        request_id: &str,
        request: &Request,
        base_policy: &Policy,
        deadline: Duration,
    ) -> Result<RouteOutcome, EngineError> {
        let overrides = parse_directives(&request.messages);
        let mut policy = base_policy.clone();
        if let Some(mode) = overrides.mode {
            policy.mode = mode;
        }
        if let Some(budget) = overrides.budget {
            policy.max_budget_usd = Some(budget);
        }
        if let Some(latency) = overrides.latency {
            policy.max_latency_ms = Some(latency);
        }
        if let Some(min_weight) = overrides.min_weight {
            policy.min_weight = Some(min_weight);
        }
        let stripped = Request {
            messages: strip_directives(&request.messages),
            ..request.clone()
        };
        self.route_and_send(request_id, &stripped, &policy, deadline).await
    }

    /// Runs a durable-style multi-stage orchestration pipeline.
    pub async fn orchestrate(
        &self,
        request_id: &str,
        request: &Request,
        directive: &OrchestrationDirective,
        stage_deadline: Duration,
    ) -> Result<OrchestrationResult, EngineError> {
        let route_engine = self.build_route_engine();
        Orchestrator::new(&route_engine)
            .orchestrate(request_id, request, directive, stage_deadline)
            .await
    }

    /// Launches the HealthProber loop and, if a reward-summary fetch
    /// function was configured, the Bandit refresh loop. Idempotent calls
    /// re-launch both.
    pub async fn start(self: &Arc<Self>) {
        self.prober.start().await;

        if let Some(fetch) = self.reward_fetch.clone() {
            let (stop_tx, stop_rx) = oneshot::channel();
            let bandit = self.bandit.clone();
            let interval = self.config.bandit_refresh_interval;
            let handle = tokio::spawn(crate::bandit::refresh_loop(bandit, fetch, interval, stop_rx));
            *self.bandit_loop.write().await = Some((stop_tx, handle));
        }
    }

    /// Stops both loops cooperatively, joining their handles before returning.
    pub async fn stop(&self) {
        self.prober.stop().await;
        if let Some((stop_tx, handle)) = self.bandit_loop.write().await.take() {
            let _ = stop_tx.send(());
            let _ = handle.await;
        }
    }
}

impl Default for TokenHubRouter {
    fn default() -> Self {
        Self::new()
    }
}

/// Builds a [`TokenHubRouter`] with optional reward persistence and bandit
/// refresh wiring.
#[derive(Default)]
pub struct TokenHubRouterBuilder {
    config: EngineConfig,
    reward_sink: Option<Arc<dyn RewardSink>>,
    reward_fetch: Option<FetchRewardSummary>,
}

impl TokenHubRouterBuilder {
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_reward_sink(mut self, sink: Arc<dyn RewardSink>) -> Self {
        self.reward_sink = Some(sink);
        self
    }

    pub fn with_bandit_refresh(mut self, fetch: FetchRewardSummary) -> Self {
        self.reward_fetch = Some(fetch);
        self
    }

    pub fn build(self) -> TokenHubRouter {
        let event_bus = Arc::new(EventBus::default());
        let health = Arc::new(HealthTracker::new(self.config.health, event_bus.clone()));
        TokenHubRouter {
            catalog: Arc::new(Catalog::new()),
            prober: Arc::new(HealthProber::new(self.config.prober, health.clone())),
            health,
            event_bus,
            bandit: Arc::new(Bandit::new()),
            reward_sink: self.reward_sink.unwrap_or_else(|| Arc::new(NoopRewardSink)),
            reward_fetch: self.reward_fetch,
            config: self.config,
            bandit_loop: RwLock::new(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Message, Model};
    use crate::providers::testing::MockProvider;

    #[tokio::test]
    async fn routes_through_registered_catalog() {
        let router = TokenHubRouter::new();
        router
            .catalog()
            .register_adapter(Arc::new(MockProvider::new("p1")))
            .await;
        router
            .catalog()
            .register_model(Model {
                id: "m1".to_string(),
                provider_id: "p1".to_string(),
                weight: 5,
                max_context_tokens: 4096,
                input_price_per_1k: 0.0,
                output_price_per_1k: 0.0,
                enabled: true,
            })
            .await;

        let request = Request {
            messages: vec![Message::user("hi")],
            ..Default::default()
        };
        let outcome = router
            .route_and_send("req-1", &request, &Policy::default(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome.decision.model_id, "m1");
    }

    #[tokio::test]
    async fn directives_override_policy_before_routing() {
        let router = TokenHubRouter::new();
        router
            .catalog()
            .register_adapter(Arc::new(MockProvider::new("p1")))
            .await;
        router
            .catalog()
            .register_model(Model {
                id: "expensive".to_string(),
                provider_id: "p1".to_string(),
                weight: 10,
                max_context_tokens: 4096,
                input_price_per_1k: 1.0,
                output_price_per_1k: 1.0,
                enabled: true,
            })
            .await;

        let request = Request {
            messages: vec![Message::user("@@tokenhub budget=0.0001\nHello")],
            ..Default::default()
        };
        let result = router
            .route_with_directives("req-2", &request, &Policy::default(), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(EngineError::NoEligibleCandidates)));
    }

    #[tokio::test]
    async fn start_and_stop_without_bandit_refresh_is_a_noop() {
        let router = Arc::new(TokenHubRouter::new());
        router.start().await;
        router.stop().await;
    }

    #[tokio::test]
    async fn default_engine_tags_weight_driven_selection() {
        let router = TokenHubRouter::new();
        router
            .catalog()
            .register_adapter(Arc::new(MockProvider::new("p1")))
            .await;
        for (id, weight) in [("low", 1), ("mid", 5), ("high", 10)] {
            router
                .catalog()
                .register_model(Model {
                    id: id.to_string(),
                    provider_id: "p1".to_string(),
                    weight,
                    max_context_tokens: 4096,
                    input_price_per_1k: 0.0,
                    output_price_per_1k: 0.0,
                    enabled: true,
                })
                .await;
        }
        let request = Request {
            messages: vec![Message::user("x")],
            ..Default::default()
        };
        let outcome = router
            .route_and_send("req-1", &request, &Policy::default(), Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(outcome.decision.model_id, "high");
        assert_eq!(outcome.decision.reason, "routed-weight-10");
    }
}

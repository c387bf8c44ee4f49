//! # TokenHub Router
//!
//! An LLM request router and multi-model orchestrator. Given a
//! provider-agnostic [`Request`](models::Request) and a
//! [`Policy`](models::Policy), the engine selects among a registered catalog
//! of models bound to upstream providers, dispatches the chosen one, and
//! escalates through a disciplined fallback sequence on failure. On top of
//! this single-shot routing layer it builds multi-stage orchestration
//! pipelines — adversarial plan→critique→refine, N-way vote with a judge,
//! iterative self-refine — that compose many routed calls into one logical
//! result.
//!
//! ## Layout
//!
//! - [`catalog`] — registry of models and provider adapters (C1).
//! - [`health`] — per-provider three-state health machine (C2).
//! - [`prober`] — periodic liveness probing feeding [`health`] (C3).
//! - [`bandit`] — contextual Thompson sampler over `(model, token_bucket)` (C4).
//! - [`scorer`] — deterministic candidate scoring, used when the bandit isn't
//!   engaged (C5).
//! - [`selector`] — policy-filtered eligibility and ordering (C6).
//! - [`route_engine`] — single-shot route-and-send with escalation (C7).
//! - [`orchestrator`] — durable-style multi-stage pipelines (C8).
//! - [`reward`] — reward computation and logging (C9).
//! - [`event_bus`] — non-blocking in-process pub/sub (C10).
//! - [`directives`] — in-band policy override parsing (C11, parser half).
//! - [`engine`] — glue wiring C1–C10 into one owned [`TokenHubRouter`] (C12).
//! - [`activities`] — free-function bindings over [`engine`] shaped for
//!   registration as activities with an external durable-workflow host (C12).
//!
//! Provider adapter implementations (the HTTP plumbing to each vendor), the
//! HTTP/SSE transport, configuration loading, persistent storage, the
//! credential store, the metrics exporter, and the dashboard are external
//! collaborators outside this crate — see [`providers`] for the contract
//! they implement. `tokenhub-gateway` wires one illustrative adapter against
//! this engine.
//!
//! ## Quick start
//!
//! ```no_run
//! use tokenhub_router::engine::TokenHubRouter;
//! use tokenhub_router::models::{Message, Model, Policy, Request};
//! use tokenhub_router::providers::testing::MockProvider;
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let router = TokenHubRouter::new();
//! router.catalog().register_adapter(Arc::new(MockProvider::new("p1"))).await;
//! router.catalog().register_model(Model {
//!     id: "fast".to_string(),
//!     provider_id: "p1".to_string(),
//!     weight: 5,
//!     max_context_tokens: 4096,
//!     input_price_per_1k: 0.0,
//!     output_price_per_1k: 0.0,
//!     enabled: true,
//! }).await;
//!
//! let request = Request { messages: vec![Message::user("hello")], ..Default::default() };
//! let decision = router
//!     .route_and_send("req-1", &request, &Policy::default(), std::time::Duration::from_secs(30))
//!     .await
//!     .unwrap();
//! println!("{} routed to {}", decision.decision.reason, decision.decision.model_id);
//! # }
//! ```

pub mod activities;
pub mod bandit;
pub mod catalog;
pub mod common;
pub mod directives;
pub mod engine;
pub mod error;
pub mod event_bus;
pub mod health;
pub mod models;
pub mod orchestrator;
pub mod prober;
pub mod providers;
pub mod reward;
pub mod route_engine;
pub mod scorer;
pub mod selector;

pub use engine::TokenHubRouter;
pub use error::{EngineError, ProviderError};
pub use models::{Decision, Message, Model, Policy, Request, Role};

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

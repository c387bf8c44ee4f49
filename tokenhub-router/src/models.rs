//! Core data model: catalog entries, requests, policies, and the records the
//! engine produces while routing one.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A registered model bound to one upstream provider.
///
/// Immutable after registration except for `enabled` and the two price
/// fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub provider_id: String,
    /// Integer quality proxy; higher is better.
    pub weight: i64,
    pub max_context_tokens: u64,
    pub input_price_per_1k: f64,
    pub output_price_per_1k: f64,
    pub enabled: bool,
}

impl Model {
    pub fn estimated_cost_usd(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        (input_tokens as f64 / 1000.0) * self.input_price_per_1k
            + (output_tokens as f64 / 1000.0) * self.output_price_per_1k
    }
}

/// One message in a [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A provider-agnostic chat request.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Request {
    pub messages: Vec<Message>,
    /// Caller-supplied token estimate; used in place of the length heuristic when present.
    pub estimated_tokens: Option<u64>,
    /// Caller hint steering selection toward a specific model id.
    pub model_hint: Option<String>,
    /// Opaque parameters forwarded to the provider as-is.
    pub params: HashMap<String, serde_json::Value>,
    /// Optional structured-output schema forwarded to the provider; not validated by the engine.
    pub output_schema: Option<serde_json::Value>,
}

/// Routing mode selecting the scoring/sampling strategy and escalation defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    Normal,
    Cheap,
    HighConfidence,
    Planning,
    Adversarial,
    Thompson,
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Normal
    }
}

/// Caller-supplied routing constraints for one request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    pub mode: Mode,
    pub max_budget_usd: Option<f64>,
    pub max_latency_ms: Option<u64>,
    pub min_weight: Option<i64>,
    pub estimated_output_tokens: u64,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            mode: Mode::Normal,
            max_budget_usd: None,
            max_latency_ms: None,
            min_weight: None,
            estimated_output_tokens: 512,
        }
    }
}

/// The outcome of one successful `RouteAndSend` attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decision {
    pub model_id: String,
    pub provider_id: String,
    pub estimated_cost_usd: f64,
    pub reason: String,
}

/// Orchestration mode requested in-band or by a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrchestrationMode {
    Planning,
    Adversarial,
    Vote,
    Refine,
}

/// Parameters controlling one `Orchestrate` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestrationDirective {
    pub mode: OrchestrationMode,
    pub iterations: u32,
    pub primary_min_weight: Option<i64>,
    pub review_min_weight: Option<i64>,
    pub primary_model_id: Option<String>,
    pub review_model_id: Option<String>,
    pub return_plan_only: bool,
}

impl Default for OrchestrationDirective {
    fn default() -> Self {
        Self {
            mode: OrchestrationMode::Planning,
            iterations: 1,
            primary_min_weight: None,
            review_min_weight: None,
            primary_model_id: None,
            review_model_id: None,
            return_plan_only: false,
        }
    }
}

/// Three-state machine state for one provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthState {
    Healthy,
    Degraded,
    Down,
}

/// Snapshot of one provider's health bookkeeping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStats {
    pub provider_id: String,
    pub state: HealthState,
    pub total_requests: u64,
    pub total_errors: u64,
    pub consecutive_errors: u64,
    pub avg_latency_ms: f64,
    pub last_error: Option<String>,
    pub last_error_at: Option<chrono::DateTime<chrono::Utc>>,
    pub last_success_at: Option<chrono::DateTime<chrono::Utc>>,
    pub cooldown_until: Option<chrono::DateTime<chrono::Utc>>,
}

impl HealthStats {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            state: HealthState::Healthy,
            total_requests: 0,
            total_errors: 0,
            consecutive_errors: 0,
            avg_latency_ms: 0.0,
            last_error: None,
            last_error_at: None,
            last_success_at: None,
            cooldown_until: None,
        }
    }
}

/// Bucket used as the Bandit's context feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenBucket {
    Small,
    Medium,
    Large,
}

impl TokenBucket {
    pub fn classify(estimated_tokens: u64) -> Self {
        if estimated_tokens < 1000 {
            TokenBucket::Small
        } else if estimated_tokens <= 10_000 {
            TokenBucket::Medium
        } else {
            TokenBucket::Large
        }
    }
}

/// One row of reward history, written exactly once per terminal routing outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewardLog {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub request_id: String,
    pub model_id: String,
    pub provider_id: String,
    pub mode: Mode,
    pub estimated_tokens: u64,
    pub token_bucket: TokenBucket,
    pub latency_budget_ms: u64,
    pub latency_ms: u64,
    pub cost_usd: f64,
    pub success: bool,
    pub error_class: Option<ErrorClass>,
    pub reward: f64,
}

/// Per-request log written on every terminal attempt, including escalation sub-attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestLog {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub request_id: String,
    pub decision: Option<Decision>,
    pub latency_ms: u64,
    pub status_code: Option<u16>,
    pub error_class: Option<ErrorClass>,
}

/// Running counters kept alongside [`HealthStats`] for observability, not gating.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetrics {
    pub provider_id: String,
    pub total_requests: u64,
    pub successful_requests: u64,
    pub failed_requests: u64,
    pub average_latency_ms: f64,
    pub tokens_processed: u64,
    pub cost_usd: f64,
}

impl ProviderMetrics {
    pub fn new(provider_id: impl Into<String>) -> Self {
        Self {
            provider_id: provider_id.into(),
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            average_latency_ms: 0.0,
            tokens_processed: 0,
            cost_usd: 0.0,
        }
    }

    pub fn record(&mut self, success: bool, latency_ms: u64, tokens: u64, cost_usd: f64) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
        self.tokens_processed += tokens;
        self.cost_usd += cost_usd;
        if self.total_requests == 1 {
            self.average_latency_ms = latency_ms as f64;
        } else {
            self.average_latency_ms = self.average_latency_ms * 0.9 + latency_ms as f64 * 0.1;
        }
    }

    pub fn success_rate(&self) -> f64 {
        if self.total_requests == 0 {
            1.0
        } else {
            self.successful_requests as f64 / self.total_requests as f64
        }
    }
}

/// Beta(α, β) parameters for one (model, token_bucket) arm.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BanditArm {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for BanditArm {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
        }
    }
}

/// Error class driving the escalation dispatch table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    ContextOverflow,
    RateLimited,
    Transient,
    Fatal,
}

/// A classified adapter error: class plus optional retry-after hint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifiedError {
    pub class: ErrorClass,
    #[serde(with = "crate::common::option_duration_serde")]
    pub retry_after: Option<std::time::Duration>,
    pub message: String,
}

/// Reason a model was dropped from the candidate list during eligibility filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    Disabled,
    NoAdapter,
    Unhealthy,
    BelowMinWeight,
    ContextTooSmall,
    OverBudget,
}

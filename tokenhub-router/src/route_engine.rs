//! C7 — single-shot route-and-send with the escalation state machine.
//!
//! Escalation is a precise per-`ErrorClass` dispatch table (retry same
//! model, skip to next candidate, or abort) rather than generic
//! exponential backoff.

use crate::catalog::Catalog;
use crate::error::EngineError;
use crate::health::HealthTracker;
use crate::models::{Decision, ErrorClass, Model, Policy, Request, RequestLog};
use crate::providers::ResponseBytes;
use crate::reward::{RewardLogger, RewardSink};
use crate::selector::{SelectionMethod, Selector};
use chrono::Utc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// A successful `route_and_send` outcome: the [`Decision`] plus the raw
/// response bytes the provider returned, for callers (like the Orchestrator)
/// that need to extract response content.
pub struct RouteOutcome {
    pub decision: Decision,
    pub response: ResponseBytes,
}

/// Owns the collaborators a route needs: the model/adapter [`Catalog`], the
/// [`HealthTracker`] attempts report into, the [`Selector`] that orders
/// candidates, and the [`RewardSink`] every terminal outcome is logged to.
pub struct RouteEngine {
    catalog: Arc<Catalog>,
    health: Arc<HealthTracker>,
    selector: Selector,
    reward_sink: Arc<dyn RewardSink>,
}

impl RouteEngine {
    pub fn new(
        catalog: Arc<Catalog>,
        health: Arc<HealthTracker>,
        selector: Selector,
        reward_sink: Arc<dyn RewardSink>,
    ) -> Self {
        Self {
            catalog,
            health,
            selector,
            reward_sink,
        }
    }

    /// Walks the Selector's ordered candidate list, dispatching to each
    /// provider adapter in turn and applying the per-error-class escalation
    /// dispatch table on failure. Exactly one `RewardLog` row is written per
    /// call — at the success return or at final exhaustion — regardless of
    /// how many candidates or escalation sub-attempts were tried; every
    /// individual attempt still gets its own `RequestLog` row and its own
    /// health/metrics update.
    pub async fn route_and_send<R: rand::Rng>(
        &self,
        rng: &mut R,
        request_id: &str,
        request: &Request,
        policy: &Policy,
        deadline: Duration,
    ) -> Result<RouteOutcome, EngineError> {
        let selected = self.selector.select(rng, request, policy).await;
        if selected.models.is_empty() {
            return Err(EngineError::NoEligibleCandidates);
        }

        let tokens_needed = Selector::estimate_tokens(request);
        let latency_budget_ms = policy.max_latency_ms.unwrap_or(10_000);
        let mut last_attempt: Option<AttemptFailure> = None;

        let mut index = 0usize;
        while index < selected.models.len() {
            let model = &selected.models[index];
            match self.attempt(request_id, request, model, policy, deadline, tokens_needed).await {
                Ok(success) => {
                    let decision =
                        self.finalize_reason(success.decision, &selected.method, model, tokens_needed, policy).await;
                    self.log_terminal_reward(request_id, &decision, policy, tokens_needed, latency_budget_ms, success.latency_ms, true, None)
                        .await;
                    return Ok(RouteOutcome { decision, response: success.response });
                }
                Err(failure) => {
                    tracing::warn!(model = %model.id, provider = %model.provider_id, class = ?failure.class, message = %failure.message, "candidate attempt failed");
                    match failure.class {
                        ErrorClass::ContextOverflow => {
                            if let Some(larger) = self.find_escalation_target(model, tokens_needed).await {
                                match self
                                    .attempt(request_id, request, &larger, policy, deadline, tokens_needed)
                                    .await
                                {
                                    Ok(success) => {
                                        let decision = Decision {
                                            reason: "escalated-context-overflow".to_string(),
                                            ..success.decision
                                        };
                                        self.log_terminal_reward(request_id, &decision, policy, tokens_needed, latency_budget_ms, success.latency_ms, true, None)
                                            .await;
                                        return Ok(RouteOutcome { decision, response: success.response });
                                    }
                                    Err(escalated_failure) => last_attempt = Some(escalated_failure),
                                }
                            } else {
                                last_attempt = Some(failure);
                            }
                        }
                        ErrorClass::Transient => {
                            match self.attempt(request_id, request, model, policy, deadline, tokens_needed).await {
                                Ok(success) => {
                                    let decision = Decision {
                                        reason: "retried-transient".to_string(),
                                        ..success.decision
                                    };
                                    self.log_terminal_reward(request_id, &decision, policy, tokens_needed, latency_budget_ms, success.latency_ms, true, None)
                                        .await;
                                    return Ok(RouteOutcome { decision, response: success.response });
                                }
                                Err(retry_failure) => last_attempt = Some(retry_failure),
                            }
                        }
                        ErrorClass::RateLimited | ErrorClass::Fatal => {
                            last_attempt = Some(failure);
                        }
                    }
                }
            }
            index += 1;
        }

        let cause = last_attempt
            .as_ref()
            .map(|f| f.message.clone())
            .unwrap_or_else(|| "all providers failed".to_string());
        tracing::error!(%request_id, %cause, "all candidates failed");

        if let Some(failure) = last_attempt {
            RewardLogger::log(
                self.reward_sink.as_ref(),
                request_id,
                &failure.model_id,
                &failure.provider_id,
                policy.mode,
                tokens_needed,
                latency_budget_ms,
                failure.latency_ms,
                failure.cost_usd,
                false,
                Some(failure.class),
            )
            .await;
        }

        Err(EngineError::AllCandidatesFailed { cause })
    }

    /// Writes the single `RewardLog` row for a successful terminal outcome.
    #[allow(clippy::too_many_arguments)]
    async fn log_terminal_reward(
        &self,
        request_id: &str,
        decision: &Decision,
        policy: &Policy,
        tokens_needed: u64,
        latency_budget_ms: u64,
        latency_ms: u64,
        success: bool,
        error_class: Option<ErrorClass>,
    ) {
        RewardLogger::log(
            self.reward_sink.as_ref(),
            request_id,
            &decision.model_id,
            &decision.provider_id,
            policy.mode,
            tokens_needed,
            latency_budget_ms,
            latency_ms,
            decision.estimated_cost_usd,
            success,
            error_class,
        )
        .await;
    }

    /// Fills in `decision.reason` when the attempt left it blank — escalation
    /// and retry paths stamp their own reason already, so this only runs for
    /// a plain first-try success, naming the selection method that chose
    /// `model` (`routed-score-<s>` or `routed-weight-<w>`).
    async fn finalize_reason(
        &self,
        decision: Decision,
        method: &SelectionMethod,
        model: &Model,
        tokens_needed: u64,
        policy: &Policy,
    ) -> Decision {
        if !decision.reason.is_empty() {
            return decision;
        }
        let reason = match method {
            SelectionMethod::Scorer => {
                let latency = self.health.avg_latency_ms(&model.provider_id).await;
                let s = crate::scorer::score(
                    model,
                    tokens_needed,
                    policy.estimated_output_tokens,
                    latency,
                    policy.max_latency_ms,
                    policy.mode,
                );
                format!("routed-score-{:.4}", s)
            }
            SelectionMethod::Bandit | SelectionMethod::WeightFallback => {
                format!("routed-weight-{}", model.weight)
            }
        };
        Decision { reason, ..decision }
    }

    /// Finds the smallest enabled model with `max_context >= 2 * tokens_needed`
    /// and a strictly larger context window than `current`.
    async fn find_escalation_target(&self, current: &Model, tokens_needed: u64) -> Option<Model> {
        let required = tokens_needed.saturating_mul(2);
        let models = self.catalog.enumerate_models().await;
        models
            .into_iter()
            .filter(|m| {
                m.enabled
                    && m.id != current.id
                    && m.max_context_tokens >= required
                    && m.max_context_tokens > current.max_context_tokens
            })
            .min_by_key(|m| m.max_context_tokens)
    }

    /// Dispatches one attempt to `model`'s provider adapter. Records health
    /// and `ProviderMetrics` and writes one `RequestLog` row unconditionally;
    /// does **not** write a `RewardLog` row — that happens exactly once, at
    /// `route_and_send`'s terminal outcome, not per attempt.
    async fn attempt(
        &self,
        request_id: &str,
        request: &Request,
        model: &Model,
        policy: &Policy,
        deadline: Duration,
        tokens_needed: u64,
    ) -> Result<AttemptSuccess, AttemptFailure> {
        let cost = model.estimated_cost_usd(tokens_needed, policy.estimated_output_tokens);

        let Some(adapter) = self.catalog.lookup_adapter(&model.provider_id).await else {
            let failure = AttemptFailure {
                class: ErrorClass::Fatal,
                message: format!("no adapter registered for provider {}", model.provider_id),
                model_id: model.id.clone(),
                provider_id: model.provider_id.clone(),
                latency_ms: 0,
                cost_usd: cost,
            };
            self.log_request(request_id, model, &failure, 0, None).await;
            return Err(failure);
        };

        let started = Instant::now();
        let outcome = adapter.send(deadline, &model.id, request).await;
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok(body) => {
                self.health.record_success(&model.provider_id, latency_ms).await;
                self.health.record_metrics(&model.provider_id, true, latency_ms, tokens_needed, cost).await;
                self.log_request_success(request_id, model, latency_ms).await;
                Ok(AttemptSuccess {
                    decision: Decision {
                        model_id: model.id.clone(),
                        provider_id: model.provider_id.clone(),
                        estimated_cost_usd: cost,
                        reason: String::new(),
                    },
                    response: body,
                    latency_ms,
                })
            }
            Err(err) => {
                let classified = adapter.classify_error(&err);
                self.health.record_error(&model.provider_id, &classified.message).await;
                self.health.record_metrics(&model.provider_id, false, latency_ms, tokens_needed, cost).await;
                let failure = AttemptFailure {
                    class: classified.class,
                    message: classified.message,
                    model_id: model.id.clone(),
                    provider_id: model.provider_id.clone(),
                    latency_ms,
                    cost_usd: cost,
                };
                self.log_request(request_id, model, &failure, latency_ms, Some(classified.class)).await;
                Err(failure)
            }
        }
    }

    /// Writes the `RequestLog` row for a successful attempt.
    async fn log_request_success(&self, request_id: &str, model: &Model, latency_ms: u64) {
        self.reward_sink
            .log_request(RequestLog {
                timestamp: Utc::now(),
                request_id: request_id.to_string(),
                decision: Some(Decision {
                    model_id: model.id.clone(),
                    provider_id: model.provider_id.clone(),
                    estimated_cost_usd: 0.0,
                    reason: String::new(),
                }),
                latency_ms,
                status_code: None,
                error_class: None,
            })
            .await;
    }

    /// Writes the `RequestLog` row for a failed attempt.
    async fn log_request(
        &self,
        request_id: &str,
        model: &Model,
        failure: &AttemptFailure,
        latency_ms: u64,
        error_class: Option<ErrorClass>,
    ) {
        self.reward_sink
            .log_request(RequestLog {
                timestamp: Utc::now(),
                request_id: request_id.to_string(),
                decision: Some(Decision {
                    model_id: model.id.clone(),
                    provider_id: model.provider_id.clone(),
                    estimated_cost_usd: failure.cost_usd,
                    reason: String::new(),
                }),
                latency_ms,
                status_code: None,
                error_class,
            })
            .await;
    }
}

/// Outcome of one `attempt()` call, before `route_and_send` decides whether
/// it is terminal or merely feeds an escalation/retry sub-attempt.
struct AttemptSuccess {
    decision: Decision,
    response: ResponseBytes,
    latency_ms: u64,
}

/// Classified failure of one `attempt()` call, carrying what the escalation
/// dispatch table and final `RewardLog` row both need.
struct AttemptFailure {
    class: ErrorClass,
    message: String,
    model_id: String,
    provider_id: String,
    latency_ms: u64,
    cost_usd: f64,
}

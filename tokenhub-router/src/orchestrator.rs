//! C8 — durable-style multi-stage orchestration pipelines.
//!
//! Built on [`crate::route_engine::RouteEngine`] itself — each stage is one
//! `route_and_send` call — with the `vote` mode's parallel voters fanned
//! out via `futures::future::join_all`, the same concurrency primitive
//! [`crate::prober::HealthProber`] uses for its probes.

use crate::error::EngineError;
use crate::models::{Decision, Message, Mode, OrchestrationDirective, OrchestrationMode, Policy, Request, Role};
use crate::route_engine::{RouteEngine, RouteOutcome};
use futures::future::join_all;
use serde_json::json;
use std::time::Duration;

/// Drives a multi-stage pipeline on top of one [`RouteEngine`], dispatching
/// by [`OrchestrationMode`] to the matching private stage method.
pub struct Orchestrator<'a> {
    route_engine: &'a RouteEngine,
}

/// Composite result of one `Orchestrate` call.
pub struct OrchestrationResult {
    /// The decision attributed to the whole pipeline: usually the final
    /// stage's decision with `reason` overwritten to name the mode, and
    /// (for multi-call modes) `estimated_cost_usd` summed across stages.
    pub decision: Decision,
    /// Mode-specific payload; shape depends on which stage produced it
    /// (see each stage method for its exact fields).
    pub body: serde_json::Value,
}

impl<'a> Orchestrator<'a> {
    pub fn new(route_engine: &'a RouteEngine) -> Self {
        Self { route_engine }
    }

    /// Runs the stage pipeline named by `directive.mode` and returns its
    /// composite result. Each stage call to the underlying `RouteEngine`
    /// honors `stage_deadline` independently; the overall wall-clock cost
    /// of multi-stage modes is not itself bounded by `stage_deadline`.
    pub async fn orchestrate(
        &self,
        request_id: &str,
        request: &Request,
        directive: &OrchestrationDirective,
        stage_deadline: Duration,
    ) -> Result<OrchestrationResult, EngineError> {
        match directive.mode {
            OrchestrationMode::Planning => self.planning(request_id, request, directive, stage_deadline).await,
            OrchestrationMode::Adversarial => {
                self.adversarial(request_id, request, directive, stage_deadline).await
            }
            OrchestrationMode::Vote => self.vote(request_id, request, directive, stage_deadline).await,
            OrchestrationMode::Refine => self.refine(request_id, request, directive, stage_deadline).await,
        }
    }

    /// Single `route_and_send` call in [`Mode::Planning`], honoring
    /// `directive.primary_model_id`/`primary_min_weight` as the routing
    /// pin and floor. `body` is `{ "content": <extracted text> }`.
    async fn planning(
        &self,
        request_id: &str,
        request: &Request,
        directive: &OrchestrationDirective,
        deadline: Duration,
    ) -> Result<OrchestrationResult, EngineError> {
        let mut policy = Policy {
            mode: Mode::Planning,
            min_weight: directive.primary_min_weight,
            ..Default::default()
        };
        let mut request = request.clone();
        if let Some(id) = &directive.primary_model_id {
            request.model_hint = Some(id.clone());
        }
        policy.mode = Mode::Planning;
        let outcome = self.send(request_id, &request, &policy, deadline).await?;
        Ok(OrchestrationResult {
            body: json!({ "content": extract_content(&outcome.response) }),
            decision: outcome.decision,
        })
    }

    /// Plan → `iterations` rounds of (critique → refine), each critique and
    /// refine call its own `route_and_send`. `iterations` defaults to 1 when
    /// `directive.iterations` is 0. `decision.estimated_cost_usd` is the sum
    /// across the plan call and every critique/refine call; `body` carries
    /// `initial_plan`, `critique`, and `refined_plan`.
    async fn adversarial(
        &self,
        request_id: &str,
        request: &Request,
        directive: &OrchestrationDirective,
        deadline: Duration,
    ) -> Result<OrchestrationResult, EngineError> {
        let iterations = directive.iterations.max(1);
        let original_user_text = concatenated_user_text(request);

        let mut plan_request = Request {
            messages: vec![
                Message::system("planning assistant"),
                Message::user(original_user_text.clone()),
            ],
            ..Default::default()
        };
        if let Some(id) = &directive.primary_model_id {
            plan_request.model_hint = Some(id.clone());
        }
        let plan_policy = Policy {
            mode: Mode::Planning,
            min_weight: directive.primary_min_weight,
            ..Default::default()
        };
        let plan_outcome = self
            .send(request_id, &plan_request, &plan_policy, deadline)
            .await
            .map_err(|e| {
                tracing::warn!(%request_id, error = %e, "adversarial plan stage failed");
                EngineError::PlanFailed { cause: e.to_string() }
            })?;

        let initial_plan = extract_content(&plan_outcome.response);
        let mut total_cost = plan_outcome.decision.estimated_cost_usd;
        let mut current_plan = initial_plan.clone();
        let mut critique = String::new();

        for _ in 0..iterations {
            let critique_request = Request {
                messages: vec![
                    Message::system("critical reviewer"),
                    Message::user(format!("{original_user_text}\n{current_plan}")),
                ],
                ..Default::default()
            };
            let critique_policy = Policy {
                mode: Mode::Adversarial,
                min_weight: directive.review_min_weight,
                ..Default::default()
            };
            let critique_outcome = self
                .send(request_id, &critique_request, &critique_policy, deadline)
                .await
                .map_err(|e| EngineError::StageFailed {
                    stage: "critique".to_string(),
                    cause: e.to_string(),
                })?;
            total_cost += critique_outcome.decision.estimated_cost_usd;
            critique = extract_content(&critique_outcome.response);

            let refine_request = Request {
                messages: vec![
                    Message::system("planning assistant"),
                    Message::user(format!("{original_user_text}\n{current_plan}\n{critique}")),
                ],
                ..Default::default()
            };
            let refine_policy = Policy {
                mode: Mode::Planning,
                min_weight: directive.primary_min_weight,
                ..Default::default()
            };
            let refine_outcome = self
                .send(request_id, &refine_request, &refine_policy, deadline)
                .await
                .map_err(|e| EngineError::StageFailed {
                    stage: "refine".to_string(),
                    cause: e.to_string(),
                })?;
            total_cost += refine_outcome.decision.estimated_cost_usd;
            current_plan = extract_content(&refine_outcome.response);
        }

        Ok(OrchestrationResult {
            body: json!({
                "initial_plan": initial_plan,
                "critique": critique,
                "refined_plan": current_plan,
            }),
            decision: Decision {
                model_id: plan_outcome.decision.model_id,
                provider_id: plan_outcome.decision.provider_id,
                estimated_cost_usd: total_cost,
                reason: "adversarial-orchestration".to_string(),
            },
        })
    }

    /// Fans `voters` identical requests out via `join_all` (default 3 when
    /// `directive.iterations < 2`), then asks a judge call to pick the best
    /// by reply-text number parsing (see [`parse_judge_selection`]). A
    /// single survivor skips the judge entirely (`vote-single-response`); a
    /// failed judge call still returns the first survivor
    /// (`vote-judge-failed`) rather than erroring the whole vote.
    async fn vote(
        &self,
        request_id: &str,
        request: &Request,
        directive: &OrchestrationDirective,
        deadline: Duration,
    ) -> Result<OrchestrationResult, EngineError> {
        let voters = if directive.iterations < 2 { 3 } else { directive.iterations };
        let policy = Policy::default();

        let futures = (0..voters).map(|_| self.send(request_id, request, &policy, deadline));
        let outcomes = join_all(futures).await;
        let successes: Vec<RouteOutcome> = outcomes.into_iter().filter_map(Result::ok).collect();

        if successes.is_empty() {
            return Err(EngineError::AllCandidatesFailed {
                cause: "all voters failed".to_string(),
            });
        }

        if successes.len() == 1 {
            let outcome = successes.into_iter().next().unwrap();
            let content = extract_content(&outcome.response);
            return Ok(OrchestrationResult {
                body: json!({ "selected": 0, "responses": [{"content": content, "model": outcome.decision.model_id.clone(), "selected": true}] }),
                decision: Decision {
                    reason: "vote-single-response".to_string(),
                    ..outcome.decision
                },
            });
        }

        let contents: Vec<String> = successes.iter().map(|o| extract_content(&o.response)).collect();
        let v = successes.len();
        let judge_user = (1..=v)
            .map(|i| format!("Response {i} (model {}):\n{}", successes[i - 1].decision.model_id, contents[i - 1]))
            .collect::<Vec<_>>()
            .join("\n\n");
        let judge_request = Request {
            messages: vec![
                Message::system("select the best; reply with only the number"),
                Message::user(judge_user),
            ],
            ..Default::default()
        };
        let judge_outcome = self.send(request_id, &judge_request, &policy, deadline).await;

        let total_cost: f64 = successes.iter().map(|o| o.decision.estimated_cost_usd).sum();

        match judge_outcome {
            Ok(judge_outcome) => {
                let judge_reply = extract_content(&judge_outcome.response);
                let selected_index = parse_judge_selection(&judge_reply, v);
                let total = total_cost + judge_outcome.decision.estimated_cost_usd;
                let responses: Vec<serde_json::Value> = successes
                    .iter()
                    .enumerate()
                    .map(|(i, o)| json!({"content": contents[i], "model": o.decision.model_id, "selected": Some(i) == selected_index}))
                    .collect();
                let selected_decision = selected_index
                    .and_then(|i| successes.get(i).map(|o| o.decision.clone()))
                    .unwrap_or_else(|| successes[0].decision.clone());
                Ok(OrchestrationResult {
                    body: json!({ "selected": selected_index, "responses": responses }),
                    decision: Decision {
                        estimated_cost_usd: total,
                        reason: "vote-orchestration".to_string(),
                        ..selected_decision
                    },
                })
            }
            Err(err) => {
                let first = successes.into_iter().next().unwrap().decision;
                Ok(OrchestrationResult {
                    body: json!({ "judge_error": err.to_string() }),
                    decision: Decision {
                        reason: "vote-judge-failed".to_string(),
                        ..first
                    },
                })
            }
        }
    }

    /// One `HighConfidence` call, then `iterations` review-and-improve
    /// passes (default 2 when `directive.iterations < 2`) pinned via
    /// `model_hint` to whichever model answered the initial call — a
    /// reviewer must not silently hop models mid-refinement. `body` carries
    /// `refined_response`, `iterations`, and `model`.
    async fn refine(
        &self,
        request_id: &str,
        request: &Request,
        directive: &OrchestrationDirective,
        deadline: Duration,
    ) -> Result<OrchestrationResult, EngineError> {
        let iterations = if directive.iterations < 2 { 2 } else { directive.iterations };
        let policy = Policy {
            mode: Mode::HighConfidence,
            ..Default::default()
        };
        let initial = self
            .send(request_id, request, &policy, deadline)
            .await
            .map_err(|e| EngineError::StageFailed {
                stage: "initial".to_string(),
                cause: e.to_string(),
            })?;

        let mut current_content = extract_content(&initial.response);
        let mut last_decision = initial.decision.clone();
        let pinned_model = initial.decision.model_id.clone();

        for _ in 0..iterations {
            let mut review_request = Request {
                messages: vec![Message::user(format!("review and improve:\n{current_content}"))],
                ..Default::default()
            };
            review_request.model_hint = Some(pinned_model.clone());
            let review_policy = Policy::default();
            let review_outcome = self
                .send(request_id, &review_request, &review_policy, deadline)
                .await
                .map_err(|e| EngineError::StageFailed {
                    stage: "refine".to_string(),
                    cause: e.to_string(),
                })?;
            last_decision = review_outcome.decision;
            current_content = extract_content(&review_outcome.response);
        }

        Ok(OrchestrationResult {
            body: json!({
                "refined_response": current_content,
                "iterations": iterations,
                "model": pinned_model,
            }),
            decision: Decision {
                reason: "refine-orchestration".to_string(),
                ..last_decision
            },
        })
    }

    /// Thin wrapper over `RouteEngine::route_and_send` shared by every stage.
    async fn send(
        &self,
        request_id: &str,
        request: &Request,
        policy: &Policy,
        deadline: Duration,
    ) -> Result<RouteOutcome, EngineError> {
        let mut rng = rand::thread_rng();
        self.route_engine
            .route_and_send(&mut rng, request_id, request, policy, deadline)
            .await
    }
}

/// Joins every `User`-role message's content with newlines, dropping system
/// and assistant turns — adversarial's plan/critique/refine prompts only
/// ever need the caller's own words.
fn concatenated_user_text(request: &Request) -> String {
    request
        .messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.content.clone())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses the judge's reply by searching for the decimal representation of
/// `v, v-1, ..., 1` (first match wins), returning a zero-indexed selection.
fn parse_judge_selection(reply: &str, v: usize) -> Option<usize> {
    for n in (1..=v).rev() {
        if reply.contains(&n.to_string()) {
            return Some(n - 1);
        }
    }
    None
}

/// Extracts response text, trying in order: `choices[0].message.content`,
/// else `content[0].text`, else raw bytes as a string, else empty.
pub fn extract_content(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<serde_json::Value>(body) {
        if let Some(content) = value
            .get("choices")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("message"))
            .and_then(|m| m.get("content"))
            .and_then(|c| c.as_str())
        {
            return content.to_string();
        }
        if let Some(content) = value
            .get("content")
            .and_then(|c| c.get(0))
            .and_then(|c| c.get("text"))
            .and_then(|t| t.as_str())
        {
            return content.to_string();
        }
    }
    String::from_utf8(body.to_vec()).unwrap_or_default()
}

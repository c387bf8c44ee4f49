//! C12 (workflow-activity bindings) — free functions shaped for
//! registration as activities with an external durable-workflow host.
//!
//! Each activity wraps one [`TokenHubRouter`] call behind a single
//! serializable context value, the `async fn(Context) -> Result<Decision,
//! EngineError>` shape a workflow SDK's activity registry expects. A host's
//! automatic activity-retry policy must be disabled for these:
//! `route_and_send` already implements its own retry/escalation semantics
//! internally and must not be retried a second time by the host.

use crate::engine::TokenHubRouter;
use crate::error::EngineError;
use crate::models::{Decision, OrchestrationDirective, Policy, Request};
use std::time::Duration;

/// Input to the `RouteAndSend` activity.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct RouteContext {
    pub request_id: String,
    pub request: Request,
    pub policy: Policy,
    #[serde(with = "crate::common::duration_serde")]
    pub deadline: Duration,
}

/// The `RouteAndSend` activity.
pub async fn route_and_send(engine: &TokenHubRouter, ctx: RouteContext) -> Result<Decision, EngineError> {
    let outcome = engine
        .route_and_send(&ctx.request_id, &ctx.request, &ctx.policy, ctx.deadline)
        .await?;
    Ok(outcome.decision)
}

/// Input to the `Orchestrate` activity.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct OrchestrateContext {
    pub request_id: String,
    pub request: Request,
    pub directive: OrchestrationDirective,
    #[serde(with = "crate::common::duration_serde")]
    pub stage_deadline: Duration,
}

/// The `Orchestrate` activity — each of the Orchestrator's internal stages
/// is itself one `RouteAndSend` call, so this single binding covers all of
/// them; a host doesn't register planning/adversarial/vote/refine separately.
pub async fn orchestrate(engine: &TokenHubRouter, ctx: OrchestrateContext) -> Result<Decision, EngineError> {
    let result = engine
        .orchestrate(&ctx.request_id, &ctx.request, &ctx.directive, ctx.stage_deadline)
        .await?;
    Ok(result.decision)
}

//! C9 — computes reward and logs (context, outcome, reward) tuples.
//!
//! Grounded on `ProviderMetrics::record_enhanced_request`'s "compute
//! normalized metric, fold into running state" shape, repurposed into a pure
//! function of one terminal outcome — this component keeps no running state
//! of its own; the Bandit refresh aggregates `RewardLog` history externally.
//! [`RewardSink`] also carries `log_request`, the per-attempt half of the
//! same §6 persistence contract — every attempt gets a `RequestLog` row,
//! while exactly one `RewardLog` row is written per terminal outcome.

use crate::models::{ErrorClass, Mode, RequestLog, RewardLog, TokenBucket};
use async_trait::async_trait;
use chrono::Utc;

/// The engine's persistence contract (§6): one `RequestLog` per attempt
/// (including escalation sub-attempts), one `RewardLog` per terminal
/// routing outcome.
#[async_trait]
pub trait RewardSink: Send + Sync {
    async fn log_request(&self, entry: RequestLog);
    async fn log_reward(&self, entry: RewardLog);
}

/// Computes reward for one terminal outcome:
///
/// ```text
/// if !success: reward = 0
/// else:
///   cost_norm    = min(cost / 0.1, 1)
///   latency_norm = min(latency / max(latency_budget, 1000), 1)
///   reward = (1 - cost_norm)*0.3 + (1 - latency_norm)*0.3 + 0.4
/// ```
pub fn compute_reward(success: bool, cost_usd: f64, latency_ms: u64, latency_budget_ms: u64) -> f64 {
    if !success {
        return 0.0;
    }
    let cost_norm = (cost_usd / 0.1).min(1.0);
    let budget = latency_budget_ms.max(1000) as f64;
    let latency_norm = (latency_ms as f64 / budget).min(1.0);
    (1.0 - cost_norm) * 0.3 + (1.0 - latency_norm) * 0.3 + 0.4
}

/// A [`RewardSink`] that discards every entry. The default for
/// [`crate::engine::TokenHubRouter`] when no persistence collaborator is wired.
#[derive(Default)]
pub struct NoopRewardSink;

#[async_trait]
impl RewardSink for NoopRewardSink {
    async fn log_request(&self, _entry: RequestLog) {}
    async fn log_reward(&self, _entry: RewardLog) {}
}

#[allow(clippy::too_many_arguments)]
pub struct RewardLogger;

impl RewardLogger {
    /// Builds one [`RewardLog`] row and writes it through `sink`.
    #[allow(clippy::too_many_arguments)]
    pub async fn log(
        sink: &dyn RewardSink,
        request_id: impl Into<String>,
        model_id: impl Into<String>,
        provider_id: impl Into<String>,
        mode: Mode,
        estimated_tokens: u64,
        latency_budget_ms: u64,
        latency_ms: u64,
        cost_usd: f64,
        success: bool,
        error_class: Option<ErrorClass>,
    ) {
        let reward = compute_reward(success, cost_usd, latency_ms, latency_budget_ms);
        let entry = RewardLog {
            timestamp: Utc::now(),
            request_id: request_id.into(),
            model_id: model_id.into(),
            provider_id: provider_id.into(),
            mode,
            estimated_tokens,
            token_bucket: TokenBucket::classify(estimated_tokens),
            latency_budget_ms,
            latency_ms,
            cost_usd,
            success,
            error_class,
            reward,
        };
        sink.log_reward(entry).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_always_yields_zero_reward() {
        assert_eq!(compute_reward(false, 0.0, 0, 1000), 0.0);
        assert_eq!(compute_reward(false, 99.0, 99999, 1000), 0.0);
    }

    #[test]
    fn reward_is_bounded_to_unit_interval() {
        let r = compute_reward(true, 10.0, 100_000, 1000);
        assert!((0.0..=1.0).contains(&r));
    }

    #[test]
    fn cheap_fast_success_scores_near_one() {
        let r = compute_reward(true, 0.0, 0, 1000);
        assert!(r > 0.95);
    }
}

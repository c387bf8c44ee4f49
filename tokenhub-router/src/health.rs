//! C2 — per-provider three-state machine + stats.
//!
//! Grounded on `circuit_breaker.rs`'s three-state `CircuitBreakerState`
//! machine, generalized from the generic Closed/Open/HalfOpen wrapper into
//! the named states `healthy`/`degraded`/`down` and multi-threshold error
//! counting, with the EMA latency update lifted from `Router::update_stats`.

use crate::event_bus::{Event, EventBus};
use crate::models::{HealthState, HealthStats, ProviderMetrics};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Thresholds controlling state transitions.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct HealthConfig {
    pub degraded_after_n_errors: u64,
    pub down_after_n_errors: u64,
    #[serde(with = "crate::common::duration_serde")]
    pub cooldown_duration: Duration,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            degraded_after_n_errors: 2,
            down_after_n_errors: 5,
            cooldown_duration: Duration::from_secs(30),
        }
    }
}

/// An optional hook fired on every `record_*` call, independent of whether a
/// state transition occurred — intended for gauge updates.
pub type OnUpdate = Arc<dyn Fn(&HealthStats) + Send + Sync>;

/// Per-provider state machine. All mutations hold a single writer lock;
/// event publication and the on-update callback fire after the lock is
/// released to avoid re-entrancy.
pub struct HealthTracker {
    config: HealthConfig,
    stats: RwLock<HashMap<String, HealthStats>>,
    metrics: RwLock<HashMap<String, ProviderMetrics>>,
    event_bus: Arc<EventBus>,
    on_update: Option<OnUpdate>,
}

impl HealthTracker {
    pub fn new(config: HealthConfig, event_bus: Arc<EventBus>) -> Self {
        Self {
            config,
            stats: RwLock::new(HashMap::new()),
            metrics: RwLock::new(HashMap::new()),
            event_bus,
            on_update: None,
        }
    }

    /// Attaches a gauge-update hook invoked after every `record_*` call.
    pub fn with_on_update(mut self, callback: OnUpdate) -> Self {
        self.on_update = Some(callback);
        self
    }

    /// Resets `consecutive_errors`, clears any cooldown, moves `provider` to
    /// `Healthy`, and folds `latency_ms` into the EMA (`avg*0.9 + latency*0.1`,
    /// or a direct seed on the first-ever record).
    pub async fn record_success(&self, provider: &str, latency_ms: u64) {
        let (snapshot, transition) = {
            let mut stats = self.stats.write().await;
            let entry = stats
                .entry(provider.to_string())
                .or_insert_with(|| HealthStats::new(provider));
            let old_state = entry.state;
            entry.total_requests += 1;
            entry.consecutive_errors = 0;
            entry.cooldown_until = None;
            entry.state = HealthState::Healthy;
            entry.last_success_at = Some(Utc::now());
            if entry.total_requests == 1 {
                entry.avg_latency_ms = latency_ms as f64;
            } else {
                entry.avg_latency_ms = entry.avg_latency_ms * 0.9 + latency_ms as f64 * 0.1;
            }
            let transition = if old_state != entry.state {
                Some((old_state, entry.state))
            } else {
                None
            };
            (entry.clone(), transition)
        };
        self.after_update(&snapshot, transition).await;
    }

    /// Increments `consecutive_errors` and escalates state per
    /// `HealthConfig`'s thresholds: `Degraded` at `degraded_after_n_errors`,
    /// `Down` (with a fresh `cooldown_until`) at `down_after_n_errors`. Does
    /// not reset on a state that is already at or above the new threshold.
    pub async fn record_error(&self, provider: &str, message: &str) {
        let (snapshot, transition) = {
            let mut stats = self.stats.write().await;
            let entry = stats
                .entry(provider.to_string())
                .or_insert_with(|| HealthStats::new(provider));
            let old_state = entry.state;
            entry.total_requests += 1;
            entry.total_errors += 1;
            entry.consecutive_errors += 1;
            entry.last_error = Some(message.to_string());
            entry.last_error_at = Some(Utc::now());

            if entry.consecutive_errors >= self.config.down_after_n_errors {
                entry.state = HealthState::Down;
                entry.cooldown_until = Some(Utc::now() + chrono_duration(self.config.cooldown_duration));
            } else if entry.consecutive_errors >= self.config.degraded_after_n_errors {
                entry.state = HealthState::Degraded;
            }

            let transition = if old_state != entry.state {
                Some((old_state, entry.state))
            } else {
                None
            };
            (entry.clone(), transition)
        };
        self.after_update(&snapshot, transition).await;
    }

    /// Fires the on-update callback unconditionally, then publishes a
    /// `health_change` event only when `transition` is `Some` — the lock from
    /// `record_success`/`record_error` is already released by this point.
    async fn after_update(&self, snapshot: &HealthStats, transition: Option<(HealthState, HealthState)>) {
        if let Some(callback) = &self.on_update {
            callback(snapshot);
        }
        if let Some((old, new)) = transition {
            tracing::info!(provider = %snapshot.provider_id, ?old, ?new, "provider health transition");
            self.event_bus
                .publish(Event::health_change(snapshot.provider_id.clone(), old, new))
                .await;
        }
    }

    /// True for unknown providers; for known ones, false iff `state == down`
    /// and `now < cooldown_until` — degraded remains available.
    pub async fn is_available(&self, provider: &str) -> bool {
        let stats = self.stats.read().await;
        match stats.get(provider) {
            None => true,
            Some(entry) => {
                if entry.state != HealthState::Down {
                    return true;
                }
                match entry.cooldown_until {
                    Some(until) => Utc::now() >= until,
                    None => true,
                }
            }
        }
    }

    /// Current snapshot for one provider, or `None` if never recorded.
    pub async fn stats(&self, provider: &str) -> Option<HealthStats> {
        self.stats.read().await.get(provider).cloned()
    }

    /// Snapshots for every provider seen so far, in arbitrary order.
    pub async fn all_stats(&self) -> Vec<HealthStats> {
        self.stats.read().await.values().cloned().collect()
    }

    /// Current EMA latency for `provider`, or `0.0` if never recorded — used
    /// by the Scorer's latency term.
    pub async fn avg_latency_ms(&self, provider: &str) -> f64 {
        self.stats
            .read()
            .await
            .get(provider)
            .map(|s| s.avg_latency_ms)
            .unwrap_or(0.0)
    }

    /// Folds one terminal attempt into `provider`'s running [`ProviderMetrics`],
    /// lazily created on first record. Kept alongside `HealthStats` for
    /// observability only — it never gates availability.
    pub async fn record_metrics(&self, provider: &str, success: bool, latency_ms: u64, tokens: u64, cost_usd: f64) {
        let mut metrics = self.metrics.write().await;
        let entry = metrics
            .entry(provider.to_string())
            .or_insert_with(|| ProviderMetrics::new(provider));
        entry.record(success, latency_ms, tokens, cost_usd);
    }

    /// Accumulated metrics for one provider, or `None` if never recorded.
    pub async fn provider_metrics(&self, provider: &str) -> Option<ProviderMetrics> {
        self.metrics.read().await.get(provider).cloned()
    }

    /// Lifetime `total_errors / total_requests` for `provider`, or `0.0` if
    /// unseen or never attempted.
    pub async fn error_rate(&self, provider: &str) -> f64 {
        self.stats.read().await.get(provider).map_or(0.0, |s| {
            if s.total_requests == 0 {
                0.0
            } else {
                s.total_errors as f64 / s.total_requests as f64
            }
        })
    }
}

/// `std::time::Duration` to `chrono::Duration`, saturating to zero on overflow.
fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero())
}

/// Timestamp helper shared by callers that need to compare against `cooldown_until`.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker(cooldown: Duration) -> HealthTracker {
        HealthTracker::new(
            HealthConfig {
                degraded_after_n_errors: 2,
                down_after_n_errors: 4,
                cooldown_duration: cooldown,
            },
            Arc::new(EventBus::default()),
        )
    }

    #[tokio::test]
    async fn three_state_transitions_follow_truth_table() {
        let t = tracker(Duration::from_millis(10));
        t.record_error("p1", "e").await;
        assert_eq!(t.stats("p1").await.unwrap().state, HealthState::Healthy);

        t.record_error("p1", "e").await;
        assert_eq!(t.stats("p1").await.unwrap().state, HealthState::Degraded);

        t.record_error("p1", "e").await;
        t.record_error("p1", "e").await;
        assert_eq!(t.stats("p1").await.unwrap().state, HealthState::Down);
        assert!(!t.is_available("p1").await);

        tokio::time::sleep(Duration::from_millis(15)).await;
        assert!(t.is_available("p1").await);
        // Still "down" until the next success.
        assert_eq!(t.stats("p1").await.unwrap().state, HealthState::Down);

        t.record_success("p1", 50).await;
        assert_eq!(t.stats("p1").await.unwrap().state, HealthState::Healthy);
    }

    #[tokio::test]
    async fn unknown_provider_is_available() {
        let t = tracker(Duration::from_secs(1));
        assert!(t.is_available("never-seen").await);
    }

    #[tokio::test]
    async fn success_resets_consecutive_errors() {
        let t = tracker(Duration::from_secs(1));
        t.record_error("p1", "e").await;
        t.record_error("p1", "e").await;
        t.record_success("p1", 20).await;
        let stats = t.stats("p1").await.unwrap();
        assert_eq!(stats.consecutive_errors, 0);
        assert_eq!(stats.state, HealthState::Healthy);
    }

    #[tokio::test]
    async fn state_transition_publishes_exactly_once() {
        let t = tracker(Duration::from_secs(1));
        let mut sub = t.event_bus.subscribe().await;
        t.record_error("p1", "e").await; // healthy -> healthy, no event
        t.record_error("p1", "e").await; // healthy -> degraded
        let event = sub.receiver.try_recv().unwrap();
        assert_eq!(event.new_state, Some(HealthState::Degraded));
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn metrics_accumulate_independently_of_stats() {
        let t = tracker(Duration::from_secs(1));
        t.record_metrics("p1", true, 100, 50, 0.01).await;
        t.record_metrics("p1", false, 200, 10, 0.0).await;
        let metrics = t.provider_metrics("p1").await.unwrap();
        assert_eq!(metrics.total_requests, 2);
        assert_eq!(metrics.successful_requests, 1);
        assert_eq!(metrics.failed_requests, 1);
        assert_eq!(metrics.tokens_processed, 60);
    }

    #[tokio::test]
    async fn unrecorded_provider_has_no_metrics() {
        let t = tracker(Duration::from_secs(1));
        assert!(t.provider_metrics("never-seen").await.is_none());
    }
}

//! C3 — periodic liveness probing feeding the HealthTracker.
//!
//! Targets are added and removed at runtime (not fixed at construction),
//! and fanned out with `futures::future::join_all` the same way
//! `Orchestrator`'s vote mode fans out parallel voters.

use crate::health::HealthTracker;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct ProbeTarget {
    pub provider_id: String,
    pub health_endpoint: String,
}

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ProberConfig {
    #[serde(with = "crate::common::duration_serde")]
    pub interval: Duration,
    #[serde(with = "crate::common::duration_serde")]
    pub probe_timeout: Duration,
}

impl Default for ProberConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(5),
        }
    }
}

/// Dispatches parallel GET probes to every registered target on an interval.
pub struct HealthProber {
    config: ProberConfig,
    targets: RwLock<HashMap<String, ProbeTarget>>,
    health: Arc<HealthTracker>,
    http: reqwest::Client,
    stop: RwLock<Option<tokio::sync::oneshot::Sender<()>>>,
    done: RwLock<Option<JoinHandle<()>>>,
}

impl HealthProber {
    pub fn new(config: ProberConfig, health: Arc<HealthTracker>) -> Self {
        Self {
            config,
            targets: RwLock::new(HashMap::new()),
            health,
            http: reqwest::Client::new(),
            stop: RwLock::new(None),
            done: RwLock::new(None),
        }
    }

    pub async fn add_target(&self, target: ProbeTarget) {
        if target.health_endpoint.is_empty() {
            return;
        }
        self.targets.write().await.insert(target.provider_id.clone(), target);
    }

    pub async fn remove_target(&self, provider_id: &str) {
        self.targets.write().await.remove(provider_id);
    }

    /// Snapshots the target set under a read lock and probes every target
    /// concurrently, outside the lock.
    pub async fn probe_once(&self) {
        let targets: Vec<ProbeTarget> = self.targets.read().await.values().cloned().collect();
        let futures = targets.into_iter().map(|target| self.probe_target(target));
        join_all(futures).await;
    }

    async fn probe_target(&self, target: ProbeTarget) {
        let outcome = tokio::time::timeout(
            self.config.probe_timeout,
            self.http.get(&target.health_endpoint).send(),
        )
        .await;

        let healthy = match outcome {
            Ok(Ok(response)) => {
                let status = response.status().as_u16();
                // 401/405 indicate a live endpoint rejecting method or auth,
                // sufficient liveness evidence on its own.
                (200..300).contains(&status) || status == 401 || status == 405
            }
            _ => false,
        };

        if healthy {
            self.health.record_success(&target.provider_id, 0).await;
        } else {
            tracing::warn!(provider = %target.provider_id, endpoint = %target.health_endpoint, "health probe failed");
            self.health.record_error(&target.provider_id, "probe failed").await;
        }
    }

    /// Launches the probe loop: one immediate probe, then every `interval`.
    /// Stop is cooperative — `stop()` closes a oneshot sender and awaits the
    /// loop's join handle.
    pub async fn start(self: &Arc<Self>) {
        let (stop_tx, mut stop_rx) = tokio::sync::oneshot::channel();
        *self.stop.write().await = Some(stop_tx);

        let prober = Arc::clone(self);
        let handle = tokio::spawn(async move {
            prober.probe_once().await;
            let mut interval = tokio::time::interval(prober.config.interval);
            interval.tick().await; // consume the immediate first tick
            loop {
                tokio::select! {
                    _ = interval.tick() => prober.probe_once().await,
                    _ = &mut stop_rx => break,
                }
            }
        });
        *self.done.write().await = Some(handle);
    }

    pub async fn stop(&self) {
        if let Some(sender) = self.stop.write().await.take() {
            let _ = sender.send(());
        }
        if let Some(handle) = self.done.write().await.take() {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::EventBus;
    use crate::health::HealthConfig;

    #[tokio::test]
    async fn empty_endpoint_targets_are_skipped() {
        let health = Arc::new(HealthTracker::new(HealthConfig::default(), Arc::new(EventBus::default())));
        let prober = HealthProber::new(ProberConfig::default(), health.clone());
        prober
            .add_target(ProbeTarget {
                provider_id: "p1".to_string(),
                health_endpoint: String::new(),
            })
            .await;
        assert!(prober.targets.read().await.is_empty());
    }

    #[tokio::test]
    async fn remove_target_drops_it() {
        let health = Arc::new(HealthTracker::new(HealthConfig::default(), Arc::new(EventBus::default())));
        let prober = HealthProber::new(ProberConfig::default(), health);
        prober
            .add_target(ProbeTarget {
                provider_id: "p1".to_string(),
                health_endpoint: "http://localhost:1/health".to_string(),
            })
            .await;
        prober.remove_target("p1").await;
        assert!(prober.targets.read().await.is_empty());
    }
}

//! C10 — non-blocking in-process pub/sub for state transitions.
//!
//! One bounded `tokio::sync::mpsc` channel per subscriber; publishing uses
//! `try_send` so a full mailbox drops the event rather than blocking the
//! publisher.

use crate::models::{ErrorClass, HealthState};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, RwLock};

const DEFAULT_MAILBOX_CAPACITY: usize = 64;

/// Event payload published on state transitions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub model: Option<String>,
    pub provider: Option<String>,
    pub latency_ms: Option<u64>,
    pub cost_usd: Option<f64>,
    pub error_class: Option<ErrorClass>,
    pub old_state: Option<HealthState>,
    pub new_state: Option<HealthState>,
    pub workflow_id: Option<String>,
    pub request_id: Option<String>,
    pub reason: Option<String>,
}

impl Event {
    pub fn health_change(provider: impl Into<String>, old: HealthState, new: HealthState) -> Self {
        Self {
            event_type: "health_change".to_string(),
            timestamp: chrono::Utc::now(),
            model: None,
            provider: Some(provider.into()),
            latency_ms: None,
            cost_usd: None,
            error_class: None,
            old_state: Some(old),
            new_state: Some(new),
            workflow_id: None,
            request_id: None,
            reason: None,
        }
    }
}

/// A live subscription: an id and the receiving end of its mailbox.
pub struct Subscription {
    pub id: u64,
    pub receiver: mpsc::Receiver<Event>,
}

struct Subscriber {
    sender: mpsc::Sender<Event>,
}

/// In-process publish/subscribe bus. Publishers never block.
pub struct EventBus {
    subscribers: RwLock<std::collections::HashMap<u64, Subscriber>>,
    next_id: AtomicU64,
    capacity: usize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_MAILBOX_CAPACITY)
    }
}

impl EventBus {
    pub fn new(mailbox_capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(std::collections::HashMap::new()),
            next_id: AtomicU64::new(1),
            capacity: mailbox_capacity,
        }
    }

    pub async fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.write().await.insert(id, Subscriber { sender: tx });
        Subscription { id, receiver: rx }
    }

    pub async fn unsubscribe(&self, id: u64) {
        self.subscribers.write().await.remove(&id);
    }

    /// Publish timestamps the event with now-UTC if not already set by the caller.
    pub async fn publish(&self, mut event: Event) {
        if event.timestamp == chrono::DateTime::<chrono::Utc>::default() {
            event.timestamp = chrono::Utc::now();
        }
        let subscribers = self.subscribers.read().await;
        for subscriber in subscribers.values() {
            // Non-blocking: a full mailbox drops the event rather than stalling the publisher.
            let _ = subscriber.sender.try_send(event.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::default();
        let mut sub = bus.subscribe().await;
        bus.publish(Event::health_change("p1", HealthState::Healthy, HealthState::Degraded))
            .await;
        let event = sub.receiver.recv().await.unwrap();
        assert_eq!(event.event_type, "health_change");
    }

    #[tokio::test]
    async fn full_mailbox_drops_rather_than_blocks() {
        let bus = EventBus::new(1);
        let mut sub = bus.subscribe().await;
        bus.publish(Event::health_change("p1", HealthState::Healthy, HealthState::Degraded))
            .await;
        bus.publish(Event::health_change("p1", HealthState::Degraded, HealthState::Down))
            .await;
        // Only one event fits in the capacity-1 mailbox; the second was dropped.
        let first = sub.receiver.try_recv().unwrap();
        assert_eq!(first.new_state, Some(HealthState::Degraded));
        assert!(sub.receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn unsubscribe_stops_delivery() {
        let bus = EventBus::default();
        let sub = bus.subscribe().await;
        bus.unsubscribe(sub.id).await;
        bus.publish(Event::health_change("p1", HealthState::Healthy, HealthState::Degraded))
            .await;
        // The subscriber is gone; publish must not panic or block.
    }
}

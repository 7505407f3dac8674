use crate::types::OutcomeEvent;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, warn};

// ---------------------------------------------------------------------------
// OutcomeHub
// ---------------------------------------------------------------------------

/// One-shot pub/sub keyed by correlation id.
///
/// The hub owns only ephemeral delivery state — the action store stays the
/// system of record. A pluggable trait so a shared pub/sub backend can
/// replace the in-process registry without touching callers.
pub trait OutcomeHub: Send + Sync {
    /// Register a live channel under a correlation id. If the outcome was
    /// already published (fast worker, slow subscriber), it is delivered
    /// immediately. The channel self-expires after `ttl` with a synthetic
    /// timeout event; expiry never mutates the store.
    fn subscribe(&self, correlation_id: &str, ttl: Duration) -> broadcast::Receiver<OutcomeEvent>;

    /// Deliver the outcome to every current subscriber and tear the entry
    /// down. With zero subscribers the outcome is retained for a bounded
    /// window so a late subscriber still sees it. Returns the number of
    /// channels delivered to.
    fn publish(&self, correlation_id: &str, event: OutcomeEvent) -> usize;
}

// ---------------------------------------------------------------------------
// InMemoryHub
// ---------------------------------------------------------------------------

/// How long a published-but-unobserved outcome stays available to late
/// subscribers. Clients that miss this window fall back to the status query.
const RETAINED_TTL: Duration = Duration::from_secs(120);

struct ChannelEntry {
    tx: broadcast::Sender<OutcomeEvent>,
    expiry: Option<tokio::task::AbortHandle>,
}

#[derive(Default)]
struct HubInner {
    channels: HashMap<String, ChannelEntry>,
    retained: HashMap<String, OutcomeEvent>,
}

/// Single-process hub: a mutex-guarded map of broadcast senders.
#[derive(Clone, Default)]
pub struct InMemoryHub {
    inner: Arc<Mutex<HubInner>>,
}

impl InMemoryHub {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OutcomeHub for InMemoryHub {
    fn subscribe(&self, correlation_id: &str, ttl: Duration) -> broadcast::Receiver<OutcomeEvent> {
        let mut inner = self.inner.lock().expect("hub lock poisoned");

        // Outcome already arrived before this subscriber attached: deliver
        // immediately through a fresh channel instead of making it wait.
        if let Some(event) = inner.retained.get(correlation_id) {
            debug!(correlation_id, "subscribe after publish: delivering retained outcome");
            let (tx, rx) = broadcast::channel(8);
            let _ = tx.send(event.clone());
            return rx;
        }

        if let Some(entry) = inner.channels.get(correlation_id) {
            return entry.tx.subscribe();
        }

        let (tx, rx) = broadcast::channel(8);
        // Expiry sweep bounds memory when a worker never calls back. Only
        // spawned inside a runtime (skipped in sync unit tests).
        let expiry = if tokio::runtime::Handle::try_current().is_ok() {
            let hub = self.inner.clone();
            let id = correlation_id.to_string();
            let handle = tokio::spawn(async move {
                tokio::time::sleep(ttl).await;
                let removed = {
                    let mut inner = hub.lock().expect("hub lock poisoned");
                    inner.channels.remove(&id)
                };
                if let Some(entry) = removed {
                    warn!(correlation_id = %id, "subscription expired before callback");
                    let _ = entry.tx.send(OutcomeEvent::timed_out());
                }
            });
            Some(handle.abort_handle())
        } else {
            None
        };

        inner.channels.insert(
            correlation_id.to_string(),
            ChannelEntry { tx, expiry },
        );
        rx
    }

    fn publish(&self, correlation_id: &str, event: OutcomeEvent) -> usize {
        let mut inner = self.inner.lock().expect("hub lock poisoned");

        if let Some(entry) = inner.channels.remove(correlation_id) {
            if let Some(expiry) = entry.expiry {
                expiry.abort();
            }
            let delivered = entry.tx.send(event).unwrap_or(0);
            debug!(correlation_id, delivered, "outcome published");
            return delivered;
        }

        // Nobody listening: retain for late subscribers, bounded by TTL.
        // At most one terminal outcome ever exists per correlation id, so
        // overwrites cannot happen in practice.
        debug!(correlation_id, "outcome published with no subscribers: retaining");
        inner
            .retained
            .insert(correlation_id.to_string(), event);
        if tokio::runtime::Handle::try_current().is_ok() {
            let hub = self.inner.clone();
            let id = correlation_id.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(RETAINED_TTL).await;
                hub.lock().expect("hub lock poisoned").retained.remove(&id);
            });
        }
        0
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventStatus, Outcome};
    use tokio::time::timeout;

    fn success_event() -> OutcomeEvent {
        OutcomeEvent::from_outcome(Outcome::Success, Some(serde_json::json!({"ok": true})))
    }

    #[tokio::test]
    async fn subscriber_receives_published_outcome() {
        let hub = InMemoryHub::new();
        let mut rx = hub.subscribe("c1", Duration::from_secs(30));
        let delivered = hub.publish("c1", success_event());
        assert_eq!(delivered, 1);

        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.status, EventStatus::Success);
        assert_eq!(event.result_payload.unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn all_subscribers_observe_the_same_outcome() {
        let hub = InMemoryHub::new();
        let mut rx1 = hub.subscribe("c1", Duration::from_secs(30));
        let mut rx2 = hub.subscribe("c1", Duration::from_secs(30));
        assert_eq!(hub.publish("c1", success_event()), 2);

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.status, EventStatus::Success);
        assert_eq!(e2.status, EventStatus::Success);
    }

    #[tokio::test]
    async fn dropping_one_subscriber_does_not_affect_the_other() {
        let hub = InMemoryHub::new();
        let rx1 = hub.subscribe("c1", Duration::from_secs(30));
        let mut rx2 = hub.subscribe("c1", Duration::from_secs(30));
        drop(rx1);
        assert_eq!(hub.publish("c1", success_event()), 1);
        assert_eq!(rx2.recv().await.unwrap().status, EventStatus::Success);
    }

    #[tokio::test]
    async fn late_subscriber_receives_retained_outcome() {
        let hub = InMemoryHub::new();
        assert_eq!(hub.publish("c1", success_event()), 0);

        let mut rx = hub.subscribe("c1", Duration::from_secs(30));
        let event = timeout(Duration::from_secs(1), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.status, EventStatus::Success);
    }

    #[tokio::test]
    async fn expiry_delivers_synthetic_timeout() {
        let hub = InMemoryHub::new();
        let mut rx = hub.subscribe("c1", Duration::from_millis(20));
        let event = timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.status, EventStatus::Timeout);
    }

    #[tokio::test]
    async fn publish_after_expiry_is_retained_for_late_subscribers() {
        let hub = InMemoryHub::new();
        let mut rx = hub.subscribe("c1", Duration::from_millis(20));
        // Wait out the expiry.
        assert_eq!(rx.recv().await.unwrap().status, EventStatus::Timeout);

        // The worker calls back afterwards; nothing is listening live.
        assert_eq!(hub.publish("c1", success_event()), 0);
        let mut late = hub.subscribe("c1", Duration::from_secs(30));
        assert_eq!(late.recv().await.unwrap().status, EventStatus::Success);
    }

    #[tokio::test]
    async fn publish_tears_the_registry_entry_down() {
        let hub = InMemoryHub::new();
        let mut rx = hub.subscribe("c1", Duration::from_secs(30));
        hub.publish("c1", success_event());
        rx.recv().await.unwrap();

        // Delivery succeeded, so nothing is retained and the registry entry
        // is gone.
        {
            let inner = hub.inner.lock().unwrap();
            assert!(inner.channels.is_empty());
            assert!(inner.retained.is_empty());
        }
    }

    #[tokio::test]
    async fn unrelated_correlation_ids_are_independent() {
        let hub = InMemoryHub::new();
        let mut rx_a = hub.subscribe("a", Duration::from_secs(30));
        let _rx_b = hub.subscribe("b", Duration::from_secs(30));
        assert_eq!(hub.publish("a", success_event()), 1);
        assert_eq!(rx_a.recv().await.unwrap().status, EventStatus::Success);
    }
}

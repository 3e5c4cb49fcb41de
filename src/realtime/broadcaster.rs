use crate::metrics;
use crate::models::{EventKey, RealtimeMessage, RefreshCategory};

use super::ConnectionRegistry;

/// Delivers refresh notifications to every sink and pending waiter of one
/// event key.
///
/// Delivery is best-effort: sinks that refuse a write are pruned silently
/// and one dead sink never blocks the rest of the same broadcast. A single
/// broadcast resolves all pending waiters for the key, not just one.
#[derive(Clone)]
pub struct Broadcaster {
    registry: ConnectionRegistry,
}

impl Broadcaster {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Push a refresh for `categories` to everything registered under `key`.
    ///
    /// Producers that pass no categories fall back to `presenter-state`,
    /// though they are expected to pass the precise set. Broadcasting to a
    /// key with no sinks and no waiters is a no-op.
    pub async fn broadcast(&self, key: &EventKey, categories: &[RefreshCategory]) {
        let categories: Vec<RefreshCategory> = if categories.is_empty() {
            vec![RefreshCategory::PresenterState]
        } else {
            categories.to_vec()
        };

        let message = RealtimeMessage::refresh(categories);
        let frame = match message.to_sse_frame() {
            Ok(frame) => frame,
            Err(err) => {
                tracing::error!(error = %err, "failed to serialize refresh message");
                return;
            }
        };

        let sinks = self.registry.sink_senders(key).await;
        let mut dead = Vec::new();
        for (id, sender) in &sinks {
            if sender.send(frame.clone()).is_err() {
                dead.push(*id);
            }
        }
        if !dead.is_empty() {
            tracing::debug!(
                event_key = %key,
                pruned = dead.len(),
                active = sinks.len() - dead.len(),
                "dead sinks cleaned up after broadcast"
            );
            self.registry.remove_sinks(key, &dead).await;
            metrics::sinks_pruned(dead.len());
        }

        for waiter in self.registry.drain_waiters(key).await {
            // A waiter whose poll request already went away is fine to skip.
            let _ = waiter.sender.send(message.clone());
        }

        metrics::broadcast_sent();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::EventKey;

    fn key(raw: &str) -> EventKey {
        EventKey::new(raw)
    }

    fn refresh_frame(categories: &[RefreshCategory]) -> String {
        RealtimeMessage::refresh(categories.to_vec())
            .to_sse_frame()
            .unwrap()
    }

    #[tokio::test]
    async fn broadcast_to_empty_key_is_a_noop() {
        let broadcaster = Broadcaster::new(ConnectionRegistry::new());
        broadcaster
            .broadcast(&key("EMPTY1"), &[RefreshCategory::Questions])
            .await;
    }

    #[tokio::test]
    async fn broadcast_reaches_every_sink_with_identical_frame() {
        let registry = ConnectionRegistry::new();
        let broadcaster = Broadcaster::new(registry.clone());

        let mut s1 = registry.add_sink(&key("ABC123")).await;
        let mut s2 = registry.add_sink(&key("ABC123")).await;

        broadcaster
            .broadcast(&key("ABC123"), &[RefreshCategory::Questions])
            .await;

        let expected = refresh_frame(&[RefreshCategory::Questions]);
        assert_eq!(s1.receiver.recv().await.unwrap(), expected);
        assert_eq!(s2.receiver.recv().await.unwrap(), expected);
    }

    #[tokio::test]
    async fn dead_sink_is_pruned_and_others_still_delivered() {
        let registry = ConnectionRegistry::new();
        let broadcaster = Broadcaster::new(registry.clone());

        let s1 = registry.add_sink(&key("ABC123")).await;
        let mut s2 = registry.add_sink(&key("ABC123")).await;

        // Dropping the receiver makes s1's next delivery fail.
        drop(s1.receiver);

        broadcaster
            .broadcast(&key("ABC123"), &[RefreshCategory::Activities])
            .await;

        assert_eq!(
            s2.receiver.recv().await.unwrap(),
            refresh_frame(&[RefreshCategory::Activities])
        );
        assert_eq!(registry.snapshot(&key("ABC123")).await.sinks, 1);

        // A subsequent broadcast reaches only the surviving sink.
        broadcaster
            .broadcast(&key("ABC123"), &[RefreshCategory::Questions])
            .await;
        assert_eq!(
            s2.receiver.recv().await.unwrap(),
            refresh_frame(&[RefreshCategory::Questions])
        );
    }

    #[tokio::test]
    async fn broadcast_resolves_all_waiters_for_the_key() {
        let registry = ConnectionRegistry::new();
        let broadcaster = Broadcaster::new(registry.clone());

        let (_id1, rx1) = registry.add_waiter(&key("ABC123")).await;
        let (_id2, rx2) = registry.add_waiter(&key("ABC123")).await;

        broadcaster
            .broadcast(&key("ABC123"), &[RefreshCategory::PresenterState])
            .await;

        let expected = RealtimeMessage::refresh(vec![RefreshCategory::PresenterState]);
        assert_eq!(rx1.await.unwrap(), expected);
        assert_eq!(rx2.await.unwrap(), expected);
        assert_eq!(registry.snapshot(&key("ABC123")).await.waiters, 0);
    }

    #[tokio::test]
    async fn empty_category_set_defaults_to_presenter_state() {
        let registry = ConnectionRegistry::new();
        let broadcaster = Broadcaster::new(registry.clone());

        let mut sink = registry.add_sink(&key("ABC123")).await;
        broadcaster.broadcast(&key("ABC123"), &[]).await;

        assert_eq!(
            sink.receiver.recv().await.unwrap(),
            refresh_frame(&[RefreshCategory::PresenterState])
        );
    }

    #[tokio::test]
    async fn broadcast_does_not_touch_other_keys() {
        let registry = ConnectionRegistry::new();
        let broadcaster = Broadcaster::new(registry.clone());

        let mut other = registry.add_sink(&key("OTHER1")).await;
        broadcaster
            .broadcast(&key("ABC123"), &[RefreshCategory::Questions])
            .await;

        assert!(other.receiver.try_recv().is_err());
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{
    mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender},
    oneshot, RwLock,
};
use uuid::Uuid;

use crate::metrics;
use crate::models::{EventKey, RealtimeMessage};

pub mod broadcaster;
pub mod notifier;

/// Unique identifier for a registered streaming sink
///
/// Each streaming connection gets a unique sink ID when it registers.
/// This allows for precise cleanup when connections close.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SinkId(Uuid);

impl SinkId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SinkId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a pending long-poll waiter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WaiterId(Uuid);

impl WaiterId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for WaiterId {
    fn default() -> Self {
        Self::new()
    }
}

/// Rendered SSE frame pushed through a sink channel.
pub type SseFrame = String;

/// Sink entry with ID and channel
struct Sink {
    id: SinkId,
    sender: UnboundedSender<SseFrame>,
}

/// Pending long-poll waiter entry
pub(crate) struct Waiter {
    id: WaiterId,
    pub(crate) sender: oneshot::Sender<RealtimeMessage>,
}

/// Handle returned to the stream endpoint when it registers a sink.
///
/// The endpoint keeps the sender for the connected frame and heartbeats,
/// and turns the receiver into the response body stream.
pub struct SinkHandle {
    pub id: SinkId,
    pub sender: UnboundedSender<SseFrame>,
    pub receiver: UnboundedReceiver<SseFrame>,
}

/// Current registry population for one event key (diagnostic).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrySnapshot {
    pub sinks: usize,
    pub waiters: usize,
}

#[derive(Default)]
struct RegistryState {
    sinks: HashMap<EventKey, Vec<Sink>>,
    waiters: HashMap<EventKey, Vec<Waiter>>,
}

/// Connection registry for live delivery channels
///
/// Tracks which streaming connections and pending long-poll requests belong
/// to which event key. Process-local by design: created once at startup and
/// never torn down mid-process. Supports precise cleanup using sink/waiter
/// IDs to prevent memory leaks.
#[derive(Default, Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RwLock<RegistryState>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a streaming sink under an event key.
    pub async fn add_sink(&self, key: &EventKey) -> SinkHandle {
        let (tx, rx) = unbounded_channel();
        let id = SinkId::new();

        let mut guard = self.inner.write().await;
        guard.sinks.entry(key.clone()).or_default().push(Sink {
            id,
            sender: tx.clone(),
        });
        metrics::sink_added();

        tracing::debug!(
            event_key = %key,
            ?id,
            total = guard.sinks.get(key).map(|v| v.len()).unwrap_or(0),
            "added sink"
        );

        SinkHandle {
            id,
            sender: tx,
            receiver: rx,
        }
    }

    /// Remove a specific sink from an event key.
    ///
    /// Idempotent: removing an absent sink is a no-op. Removing the last sink
    /// for a key deletes the key's entry.
    pub async fn remove_sink(&self, key: &EventKey, sink_id: SinkId) {
        let mut guard = self.inner.write().await;

        if let Some(sinks) = guard.sinks.get_mut(key) {
            let before = sinks.len();
            sinks.retain(|s| s.id != sink_id);
            let removed = before - sinks.len();

            if removed > 0 {
                metrics::sinks_removed(removed);
                tracing::debug!(event_key = %key, ?sink_id, remaining = sinks.len(), "removed sink");
            }

            if sinks.is_empty() {
                guard.sinks.remove(key);
            }
        }
    }

    /// Bulk removal used by the broadcaster to prune failed sinks.
    pub(crate) async fn remove_sinks(&self, key: &EventKey, sink_ids: &[SinkId]) {
        let mut guard = self.inner.write().await;

        if let Some(sinks) = guard.sinks.get_mut(key) {
            let before = sinks.len();
            sinks.retain(|s| !sink_ids.contains(&s.id));
            let removed = before - sinks.len();

            if removed > 0 {
                metrics::sinks_removed(removed);
            }

            if sinks.is_empty() {
                guard.sinks.remove(key);
            }
        }
    }

    /// Register a pending long-poll waiter under an event key.
    ///
    /// The waiter resolves exactly once: the returned receiver yields the
    /// refresh message on broadcast, or errors once the waiter is removed.
    pub async fn add_waiter(&self, key: &EventKey) -> (WaiterId, oneshot::Receiver<RealtimeMessage>) {
        let (tx, rx) = oneshot::channel();
        let id = WaiterId::new();

        let mut guard = self.inner.write().await;
        guard
            .waiters
            .entry(key.clone())
            .or_default()
            .push(Waiter { id, sender: tx });
        metrics::waiter_added();

        tracing::debug!(
            event_key = %key,
            ?id,
            total = guard.waiters.get(key).map(|v| v.len()).unwrap_or(0),
            "added waiter"
        );

        (id, rx)
    }

    /// Remove a specific waiter from an event key (idempotent).
    pub async fn remove_waiter(&self, key: &EventKey, waiter_id: WaiterId) {
        let mut guard = self.inner.write().await;

        if let Some(waiters) = guard.waiters.get_mut(key) {
            let before = waiters.len();
            waiters.retain(|w| w.id != waiter_id);
            let removed = before - waiters.len();

            if removed > 0 {
                metrics::waiters_removed(removed);
                tracing::debug!(event_key = %key, ?waiter_id, remaining = waiters.len(), "removed waiter");
            }

            if waiters.is_empty() {
                guard.waiters.remove(key);
            }
        }
    }

    /// Snapshot copy of the sink senders for one key.
    ///
    /// The broadcaster iterates this copy, so a sink deregistering mid-loop
    /// never invalidates the iteration.
    pub(crate) async fn sink_senders(
        &self,
        key: &EventKey,
    ) -> Vec<(SinkId, UnboundedSender<SseFrame>)> {
        let guard = self.inner.read().await;
        guard
            .sinks
            .get(key)
            .map(|sinks| {
                sinks
                    .iter()
                    .map(|s| (s.id, s.sender.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Take every pending waiter for one key out of the registry.
    pub(crate) async fn drain_waiters(&self, key: &EventKey) -> Vec<Waiter> {
        let mut guard = self.inner.write().await;
        let drained = guard.waiters.remove(key).unwrap_or_default();
        if !drained.is_empty() {
            metrics::waiters_removed(drained.len());
        }
        drained
    }

    /// Current sink/waiter counts for one key (diagnostic).
    pub async fn snapshot(&self, key: &EventKey) -> RegistrySnapshot {
        let guard = self.inner.read().await;
        RegistrySnapshot {
            sinks: guard.sinks.get(key).map(|v| v.len()).unwrap_or(0),
            waiters: guard.waiters.get(key).map(|v| v.len()).unwrap_or(0),
        }
    }
}

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::RefreshCategory;
use crate::services::directory::SessionDirectory;

use super::broadcaster::Broadcaster;

/// Producer-side port for realtime invalidation.
///
/// Mutation services depend on this trait instead of the transport layer,
/// which keeps the write path free of any dependency on the broadcast
/// endpoints. Delivery is best-effort: `notify` never fails the mutation
/// that triggered it.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, session_id: Uuid, categories: &[RefreshCategory]);
}

/// Resolves a session's public event key and broadcasts to its connections.
pub struct BroadcastNotifier {
    directory: Arc<dyn SessionDirectory>,
    broadcaster: Broadcaster,
}

impl BroadcastNotifier {
    pub fn new(directory: Arc<dyn SessionDirectory>, broadcaster: Broadcaster) -> Self {
        Self {
            directory,
            broadcaster,
        }
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn notify(&self, session_id: Uuid, categories: &[RefreshCategory]) {
        match self.directory.key_for(session_id).await {
            Some(key) => self.broadcaster.broadcast(&key, categories).await,
            None => {
                tracing::warn!(%session_id, "no event key for session, skipping realtime notify");
            }
        }
    }
}

/// Notifier that drops every notification. Useful in tests and for running
/// mutation services without a delivery layer attached.
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn notify(&self, _session_id: Uuid, _categories: &[RefreshCategory]) {}
}

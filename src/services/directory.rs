use async_trait::async_trait;
use uuid::Uuid;

use crate::models::EventKey;

/// Read-side seam to the session data layer.
///
/// The delivery endpoints use `resolve` to validate an event key before
/// registering a connection; the notification trigger uses `key_for` to map
/// a mutation's internal session id back to the public key it broadcasts
/// under. Anything richer than these two lookups belongs to the data layer.
#[async_trait]
pub trait SessionDirectory: Send + Sync {
    async fn resolve(&self, key: &EventKey) -> Option<Uuid>;

    async fn key_for(&self, session_id: Uuid) -> Option<EventKey>;
}

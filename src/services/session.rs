use std::sync::Arc;

use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Activity, ActivityResponse, EventKey, Question, RefreshCategory, Session};
use crate::realtime::notifier::Notifier;
use crate::services::directory::SessionDirectory;
use crate::services::store::SessionStore;

/// Mutation collaborators for live sessions.
///
/// Every successful write is followed by a notify with the precise category
/// set that changed. The notify is fire-and-forget: its outcome never
/// affects the mutation's result.
pub struct SessionService {
    store: SessionStore,
    notifier: Arc<dyn Notifier>,
}

impl SessionService {
    pub fn new(store: SessionStore, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, notifier }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub async fn create_session(&self, name: &str) -> Session {
        // Nobody can be connected to a key that does not exist yet, so
        // creation does not notify.
        self.store.create_session(name).await
    }

    pub async fn create_session_with_key(&self, name: &str, key: EventKey) -> AppResult<Session> {
        self.store.create_session_with_key(name, key).await
    }

    pub async fn update_presenter_state(
        &self,
        key: &EventKey,
        state: serde_json::Value,
    ) -> AppResult<()> {
        let session_id = self.resolve(key).await?;
        self.store.set_presenter_state(session_id, state).await?;
        self.notifier
            .notify(session_id, &[RefreshCategory::PresenterState])
            .await;
        Ok(())
    }

    pub async fn post_question(
        &self,
        key: &EventKey,
        body: &str,
        author: Option<String>,
    ) -> AppResult<Question> {
        let session_id = self.resolve(key).await?;
        let question = self.store.add_question(session_id, body, author).await?;
        self.notifier
            .notify(session_id, &[RefreshCategory::Questions])
            .await;
        Ok(question)
    }

    pub async fn publish_activity(
        &self,
        key: &EventKey,
        kind: &str,
        prompt: &str,
    ) -> AppResult<Activity> {
        let session_id = self.resolve(key).await?;
        let activity = self.store.add_activity(session_id, kind, prompt).await?;
        self.notifier
            .notify(session_id, &[RefreshCategory::Activities])
            .await;
        Ok(activity)
    }

    pub async fn submit_response(
        &self,
        key: &EventKey,
        activity_id: Uuid,
        value: serde_json::Value,
    ) -> AppResult<ActivityResponse> {
        let session_id = self.resolve(key).await?;
        let response = self
            .store
            .add_response(session_id, activity_id, value)
            .await?;
        self.notifier
            .notify(session_id, &[RefreshCategory::ActivityResponses])
            .await;
        Ok(response)
    }

    async fn resolve(&self, key: &EventKey) -> AppResult<Uuid> {
        self.store.resolve(key).await.ok_or(AppError::EventNotFound)
    }
}

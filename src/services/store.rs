use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{Activity, ActivityResponse, EventKey, Question, Session};
use crate::services::directory::SessionDirectory;

/// Alphabet for generated event keys: no 0/O/1/I lookalikes, since keys are
/// read aloud and typed by audiences.
const KEY_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const KEY_LENGTH: usize = 6;

#[derive(Default)]
struct StoreState {
    sessions: HashMap<Uuid, Session>,
    keys: HashMap<EventKey, Uuid>,
    questions: HashMap<Uuid, Vec<Question>>,
    activities: HashMap<Uuid, Vec<Activity>>,
    responses: HashMap<Uuid, Vec<ActivityResponse>>,
}

/// In-memory session store.
///
/// Stands behind the `SessionDirectory` seam; a deployment with real
/// persistence swaps this for a database-backed directory without touching
/// the delivery layer.
#[derive(Default, Clone)]
pub struct SessionStore {
    inner: Arc<RwLock<StoreState>>,
}

fn generate_key() -> EventKey {
    let uuid = Uuid::new_v4();
    let bytes = uuid.as_bytes();
    let code: String = bytes[..KEY_LENGTH]
        .iter()
        .map(|b| KEY_ALPHABET[(*b as usize) % KEY_ALPHABET.len()] as char)
        .collect();
    EventKey::new(&code)
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session under a freshly generated event key.
    pub async fn create_session(&self, name: &str) -> Session {
        let mut guard = self.inner.write().await;

        let mut key = generate_key();
        while guard.keys.contains_key(&key) {
            key = generate_key();
        }

        let session = Session {
            id: Uuid::new_v4(),
            key: key.clone(),
            name: name.to_string(),
            presenter_state: serde_json::Value::Null,
            created_at: Utc::now(),
        };
        guard.keys.insert(key, session.id);
        guard.sessions.insert(session.id, session.clone());
        session
    }

    /// Create a session under a caller-chosen key (startup seeds).
    pub async fn create_session_with_key(&self, name: &str, key: EventKey) -> AppResult<Session> {
        let mut guard = self.inner.write().await;
        if guard.keys.contains_key(&key) {
            return Err(AppError::DuplicateEventKey(key.as_str().to_string()));
        }

        let session = Session {
            id: Uuid::new_v4(),
            key: key.clone(),
            name: name.to_string(),
            presenter_state: serde_json::Value::Null,
            created_at: Utc::now(),
        };
        guard.keys.insert(key, session.id);
        guard.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    pub async fn get(&self, session_id: Uuid) -> Option<Session> {
        let guard = self.inner.read().await;
        guard.sessions.get(&session_id).cloned()
    }

    pub async fn set_presenter_state(
        &self,
        session_id: Uuid,
        state: serde_json::Value,
    ) -> AppResult<()> {
        let mut guard = self.inner.write().await;
        let session = guard
            .sessions
            .get_mut(&session_id)
            .ok_or(AppError::EventNotFound)?;
        session.presenter_state = state;
        Ok(())
    }

    pub async fn add_question(
        &self,
        session_id: Uuid,
        body: &str,
        author: Option<String>,
    ) -> AppResult<Question> {
        let mut guard = self.inner.write().await;
        if !guard.sessions.contains_key(&session_id) {
            return Err(AppError::EventNotFound);
        }

        let question = Question {
            id: Uuid::new_v4(),
            session_id,
            body: body.to_string(),
            author,
            created_at: Utc::now(),
        };
        guard
            .questions
            .entry(session_id)
            .or_default()
            .push(question.clone());
        Ok(question)
    }

    pub async fn add_activity(
        &self,
        session_id: Uuid,
        kind: &str,
        prompt: &str,
    ) -> AppResult<Activity> {
        let mut guard = self.inner.write().await;
        if !guard.sessions.contains_key(&session_id) {
            return Err(AppError::EventNotFound);
        }

        let activity = Activity {
            id: Uuid::new_v4(),
            session_id,
            kind: kind.to_string(),
            prompt: prompt.to_string(),
            created_at: Utc::now(),
        };
        guard
            .activities
            .entry(session_id)
            .or_default()
            .push(activity.clone());
        Ok(activity)
    }

    pub async fn add_response(
        &self,
        session_id: Uuid,
        activity_id: Uuid,
        value: serde_json::Value,
    ) -> AppResult<ActivityResponse> {
        let mut guard = self.inner.write().await;
        let known = guard
            .activities
            .get(&session_id)
            .map(|list| list.iter().any(|a| a.id == activity_id))
            .unwrap_or(false);
        if !known {
            return Err(AppError::ActivityNotFound);
        }

        let response = ActivityResponse {
            id: Uuid::new_v4(),
            activity_id,
            value,
            created_at: Utc::now(),
        };
        guard
            .responses
            .entry(activity_id)
            .or_default()
            .push(response.clone());
        Ok(response)
    }
}

#[async_trait]
impl SessionDirectory for SessionStore {
    async fn resolve(&self, key: &EventKey) -> Option<Uuid> {
        let guard = self.inner.read().await;
        guard.keys.get(key).copied()
    }

    async fn key_for(&self, session_id: Uuid) -> Option<EventKey> {
        let guard = self.inner.read().await;
        guard.sessions.get(&session_id).map(|s| s.key.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_session_resolves_both_ways() {
        let store = SessionStore::new();
        let session = store.create_session("Town Hall").await;

        assert_eq!(store.resolve(&session.key).await, Some(session.id));
        assert_eq!(store.key_for(session.id).await, Some(session.key.clone()));
        assert_eq!(session.key.as_str().len(), KEY_LENGTH);
    }

    #[tokio::test]
    async fn unknown_key_does_not_resolve() {
        let store = SessionStore::new();
        assert_eq!(store.resolve(&EventKey::new("NOPE42")).await, None);
        assert_eq!(store.key_for(Uuid::new_v4()).await, None);
    }

    #[tokio::test]
    async fn seeded_key_is_normalized_and_unique() {
        let store = SessionStore::new();
        store
            .create_session_with_key("Demo", EventKey::new("demo01"))
            .await
            .unwrap();

        assert!(store.resolve(&EventKey::new("DEMO01")).await.is_some());
        let duplicate = store
            .create_session_with_key("Demo again", EventKey::new("DEMO01"))
            .await;
        assert!(matches!(duplicate, Err(AppError::DuplicateEventKey(_))));
    }

    #[tokio::test]
    async fn response_requires_known_activity() {
        let store = SessionStore::new();
        let session = store.create_session("Quiz night").await;

        let missing = store
            .add_response(session.id, Uuid::new_v4(), serde_json::json!({"answer": 1}))
            .await;
        assert!(matches!(missing, Err(AppError::ActivityNotFound)));

        let activity = store
            .add_activity(session.id, "poll", "Favorite color?")
            .await
            .unwrap();
        let response = store
            .add_response(session.id, activity.id, serde_json::json!({"answer": "red"}))
            .await
            .unwrap();
        assert_eq!(response.activity_id, activity.id);
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EventKey;

/// A live event session. The `key` is the public identifier clients connect
/// with; `id` is the internal record key used by mutation collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: Uuid,
    #[serde(rename = "eventKey")]
    pub key: EventKey,
    pub name: String,
    pub presenter_state: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// An audience question posted into a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub session_id: Uuid,
    pub body: String,
    pub author: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A presenter-published activity (poll, quiz, word cloud, ...).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Activity {
    pub id: Uuid,
    pub session_id: Uuid,
    pub kind: String,
    pub prompt: String,
    pub created_at: DateTime<Utc>,
}

/// A single audience response to an activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityResponse {
    pub id: Uuid,
    pub activity_id: Uuid,
    pub value: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

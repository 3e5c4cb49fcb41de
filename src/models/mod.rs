use std::fmt;

use serde::{Deserialize, Serialize};

pub mod session;

pub use session::{Activity, ActivityResponse, Question, Session};

/// Public, human-typeable identifier for a live session.
///
/// Distinct from the session record's internal id: clients only ever see and
/// type this value. Construction normalizes case so `abc123` and `ABC123`
/// address the same session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventKey(String);

impl EventKey {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EventKey {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

/// One invalidation domain a client may subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefreshCategory {
    PresenterState,
    Questions,
    Activities,
    ActivityResponses,
}

impl RefreshCategory {
    pub const ALL: [RefreshCategory; 4] = [
        RefreshCategory::PresenterState,
        RefreshCategory::Questions,
        RefreshCategory::Activities,
        RefreshCategory::ActivityResponses,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RefreshCategory::PresenterState => "presenter-state",
            RefreshCategory::Questions => "questions",
            RefreshCategory::Activities => "activities",
            RefreshCategory::ActivityResponses => "activity-responses",
        }
    }
}

/// Categories carried by a refresh message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshPayload {
    pub refresh_types: Vec<RefreshCategory>,
}

/// Wire message pushed to connected clients.
///
/// `connected` acknowledges a freshly opened stream, `refresh` tells the
/// client which categories to refetch, `no-op` fills an expired long-poll.
/// Heartbeats are not messages; they travel as SSE comment lines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum RealtimeMessage {
    Connected,
    Refresh { data: RefreshPayload },
    NoOp,
}

/// Comment-only keep-alive frame. Parsers looking for `data:` lines skip it.
pub const SSE_HEARTBEAT_FRAME: &str = ": heartbeat\n\n";

impl RealtimeMessage {
    pub fn connected() -> Self {
        RealtimeMessage::Connected
    }

    pub fn refresh(refresh_types: Vec<RefreshCategory>) -> Self {
        RealtimeMessage::Refresh {
            data: RefreshPayload { refresh_types },
        }
    }

    pub fn no_op() -> Self {
        RealtimeMessage::NoOp
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Render as a server-sent-events data frame.
    pub fn to_sse_frame(&self) -> Result<String, serde_json::Error> {
        Ok(format!("data: {}\n\n", self.to_json()?))
    }
}

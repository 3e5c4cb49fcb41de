use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use thiserror::Error;

use crate::models::{EventKey, RealtimeMessage};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("stream interrupted: {0}")]
    Interrupted(String),

    #[error("event not found")]
    NotFound,
}

pub type MessageStream = BoxStream<'static, Result<RealtimeMessage, TransportError>>;

/// One delivery channel: a connected stream of realtime messages.
///
/// The controller opens a channel, consumes it until it errors or ends, and
/// asks for a new one on reconnect. Implementations exist for SSE streaming
/// and a long-poll loop; tests plug in scripted doubles.
#[async_trait]
pub trait StreamTransport: Send + Sync {
    async fn open(&self, event_key: &EventKey) -> Result<MessageStream, TransportError>;
}

fn normalize_base_url(base_url: &str) -> String {
    base_url.trim_end_matches('/').to_string()
}

/// Streaming transport over `GET /events/{key}/stream`.
pub struct SseTransport {
    base_url: String,
    http: reqwest::Client,
}

impl SseTransport {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.as_ref()),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl StreamTransport for SseTransport {
    async fn open(&self, event_key: &EventKey) -> Result<MessageStream, TransportError> {
        let url = format!("{}/events/{}/stream", self.base_url, event_key);
        let response = self
            .http
            .get(&url)
            .header("Accept", "text/event-stream")
            .send()
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(TransportError::NotFound);
        }
        if !response.status().is_success() {
            return Err(TransportError::Connect(format!(
                "unexpected status {}",
                response.status()
            )));
        }

        let source = response.bytes_stream().boxed();
        let state = (source, SseParser::default(), Vec::new());
        let stream = futures::stream::unfold(state, |(mut source, mut parser, mut queued)| async move {
            loop {
                if !queued.is_empty() {
                    let message = queued.remove(0);
                    return Some((Ok(message), (source, parser, queued)));
                }
                match source.next().await {
                    Some(Ok(chunk)) => queued.extend(parser.feed(&chunk)),
                    Some(Err(err)) => {
                        return Some((
                            Err(TransportError::Interrupted(err.to_string())),
                            (source, parser, queued),
                        ))
                    }
                    None => return None,
                }
            }
        });

        Ok(Box::pin(stream))
    }
}

/// Degraded transport over repeated `GET /events/{key}/poll` requests,
/// presented as a single message stream. `no-op` results (expired holds)
/// are absorbed by polling again.
pub struct LongPollTransport {
    base_url: String,
    http: reqwest::Client,
}

impl LongPollTransport {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: normalize_base_url(base_url.as_ref()),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl StreamTransport for LongPollTransport {
    async fn open(&self, event_key: &EventKey) -> Result<MessageStream, TransportError> {
        let url = format!("{}/events/{}/poll", self.base_url, event_key);
        let http = self.http.clone();

        let stream = futures::stream::unfold((http, url), |(http, url)| async move {
            loop {
                let result = http.get(&url).send().await;
                let outcome = match result {
                    Ok(response) if response.status() == reqwest::StatusCode::NOT_FOUND => {
                        Err(TransportError::NotFound)
                    }
                    Ok(response) if response.status().is_success() => {
                        match response.json::<RealtimeMessage>().await {
                            Ok(RealtimeMessage::NoOp) => continue,
                            Ok(message) => Ok(message),
                            Err(err) => Err(TransportError::Interrupted(err.to_string())),
                        }
                    }
                    Ok(response) => Err(TransportError::Interrupted(format!(
                        "unexpected status {}",
                        response.status()
                    ))),
                    Err(err) => Err(TransportError::Interrupted(err.to_string())),
                };
                return Some((outcome, (http, url)));
            }
        });

        Ok(Box::pin(stream))
    }
}

/// Incremental parser for `text/event-stream` bytes.
///
/// Collects `data:` lines and emits one message per blank-line-terminated
/// event. Comment lines (the server's `: heartbeat`) carry no data and are
/// skipped; unparseable payloads are logged and dropped.
#[derive(Default)]
pub(crate) struct SseParser {
    buffer: String,
}

impl SseParser {
    pub(crate) fn feed(&mut self, chunk: &[u8]) -> Vec<RealtimeMessage> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.find("\n\n") {
            let event: String = self.buffer.drain(..pos + 2).collect();
            for line in event.lines() {
                if let Some(data) = line.strip_prefix("data: ") {
                    match RealtimeMessage::from_json(data) {
                        Ok(message) => out.push(message),
                        Err(err) => {
                            tracing::warn!(error = %err, "ignoring unparseable stream payload");
                        }
                    }
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RefreshCategory;

    #[test]
    fn parser_emits_message_per_event() {
        let mut parser = SseParser::default();
        let messages = parser.feed(b"data: {\"type\":\"connected\"}\n\n");
        assert_eq!(messages, vec![RealtimeMessage::connected()]);
    }

    #[test]
    fn parser_handles_split_chunks() {
        let mut parser = SseParser::default();
        assert!(parser.feed(b"data: {\"type\":\"refresh\",\"data\":{\"refr").is_empty());
        let messages = parser.feed(b"eshTypes\":[\"questions\"]}}\n\n");
        assert_eq!(
            messages,
            vec![RealtimeMessage::refresh(vec![RefreshCategory::Questions])]
        );
    }

    #[test]
    fn parser_skips_heartbeat_comments() {
        let mut parser = SseParser::default();
        let messages = parser.feed(b": heartbeat\n\ndata: {\"type\":\"connected\"}\n\n");
        assert_eq!(messages, vec![RealtimeMessage::connected()]);
    }

    #[test]
    fn parser_drops_garbage_payloads() {
        let mut parser = SseParser::default();
        let messages = parser.feed(b"data: not json\n\ndata: {\"type\":\"no-op\"}\n\n");
        assert_eq!(messages, vec![RealtimeMessage::no_op()]);
    }

    #[test]
    fn parser_emits_multiple_events_from_one_chunk() {
        let mut parser = SseParser::default();
        let messages =
            parser.feed(b"data: {\"type\":\"connected\"}\n\ndata: {\"type\":\"no-op\"}\n\n");
        assert_eq!(
            messages,
            vec![RealtimeMessage::connected(), RealtimeMessage::no_op()]
        );
    }
}

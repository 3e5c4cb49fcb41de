use actix_web::{get, web, HttpResponse};
use bytes::Bytes;
use futures_util::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{AppError, AppResult};
use crate::models::{EventKey, RealtimeMessage, SSE_HEARTBEAT_FRAME};
use crate::realtime::{ConnectionRegistry, WaiterId};
use crate::state::AppState;

pub fn register_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(stream_events)
        .service(poll_events)
        .service(connection_count);
}

/// Long-lived streaming connection for one event.
///
/// Emits an immediate `connected` message, then a `refresh` message per
/// broadcast, with comment-line heartbeats in between. State machine:
/// Open -> (heartbeat loop) -> Closed; the first heartbeat write that fails
/// stops the loop and deregisters the sink after a short grace delay.
#[get("/events/{event_key}/stream")]
pub async fn stream_events(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let key = EventKey::new(&path.into_inner());
    if state.directory.resolve(&key).await.is_none() {
        return Err(AppError::EventNotFound);
    }

    let registry = state.registry.clone();
    let handle = registry.add_sink(&key).await;
    let sink_id = handle.id;
    let sender = handle.sender;

    let connected = RealtimeMessage::connected()
        .to_sse_frame()
        .map_err(|_| AppError::Internal)?;
    // Queued before the client reads its first byte.
    let _ = sender.send(connected);

    let heartbeat_interval = state.config.heartbeat_interval;
    let close_grace = state.config.sink_close_grace;
    let hb_key = key.clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(heartbeat_interval);
        // The first tick completes immediately; skip it so the connected
        // frame is not chased by an instant heartbeat.
        ticker.tick().await;
        loop {
            ticker.tick().await;
            if sender.send(SSE_HEARTBEAT_FRAME.to_string()).is_err() {
                break;
            }
        }
        // Grace delay: a broadcast that already snapshotted this sink
        // finishes before the registry entry disappears.
        tokio::time::sleep(close_grace).await;
        registry.remove_sink(&hb_key, sink_id).await;
        tracing::debug!(event_key = %hb_key, ?sink_id, "stream closed, sink deregistered");
    });

    let body = UnboundedReceiverStream::new(handle.receiver)
        .map(|frame| Ok::<Bytes, actix_web::Error>(Bytes::from(frame)));

    Ok(HttpResponse::Ok()
        .content_type("text/event-stream")
        .insert_header(("Cache-Control", "no-cache"))
        .insert_header(("Connection", "keep-alive"))
        .insert_header(("X-Accel-Buffering", "no"))
        .streaming(body))
}

/// Bounded long-poll for one event.
///
/// Holds the request until a broadcast resolves the waiter or the hold time
/// elapses (responding `no-op`). The waiter resolves exactly once; the
/// guard releases the registry entry on every exit path, including the
/// client aborting mid-hold.
#[get("/events/{event_key}/poll")]
pub async fn poll_events(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let key = EventKey::new(&path.into_inner());
    if state.directory.resolve(&key).await.is_none() {
        return Err(AppError::EventNotFound);
    }

    let registry = state.registry.clone();
    let (waiter_id, receiver) = registry.add_waiter(&key).await;
    let _guard = WaiterGuard {
        registry,
        key,
        id: waiter_id,
    };

    let message = match tokio::time::timeout(state.config.poll_hold, receiver).await {
        Ok(Ok(message)) => message,
        // Hold expired, or the waiter left the registry without a send.
        Ok(Err(_)) | Err(_) => RealtimeMessage::no_op(),
    };

    Ok(HttpResponse::Ok()
        .insert_header(("Cache-Control", "no-cache"))
        .json(message))
}

/// Registered streaming connection count for one event (diagnostic only).
#[get("/events/{event_key}/connections")]
pub async fn connection_count(
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let key = EventKey::new(&path.into_inner());
    if state.directory.resolve(&key).await.is_none() {
        return Err(AppError::EventNotFound);
    }

    let snapshot = state.registry.snapshot(&key).await;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "connectionCount": snapshot.sinks,
        "eventKey": key.as_str(),
    })))
}

/// Removes the waiter whichever way the poll handler future ends: response,
/// timeout, or client abort. Removal is idempotent, so racing a broadcast
/// drain is harmless.
struct WaiterGuard {
    registry: ConnectionRegistry,
    key: EventKey,
    id: WaiterId,
}

impl Drop for WaiterGuard {
    fn drop(&mut self) {
        let registry = self.registry.clone();
        let key = self.key.clone();
        let id = self.id;
        tokio::spawn(async move {
            registry.remove_waiter(&key, id).await;
        });
    }
}

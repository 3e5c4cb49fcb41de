use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::StreamExt;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::models::{EventKey, RealtimeMessage, RefreshCategory};

pub mod dispatch;
pub mod transport;

pub use dispatch::{CallbackRegistry, Subscription};
pub use transport::{LongPollTransport, SseTransport, StreamTransport, TransportError};

/// Delivery state surfaced to the hosting UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Open,
    Reconnecting { attempt: u32, max_attempts: u32 },
    Polling,
    Closed,
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => f.write_str("connecting"),
            ConnectionStatus::Open => f.write_str("connected"),
            ConnectionStatus::Reconnecting {
                attempt,
                max_attempts,
            } => write!(f, "reconnecting ({attempt}/{max_attempts})"),
            ConnectionStatus::Polling => f.write_str("connected (polling)"),
            ConnectionStatus::Closed => f.write_str("closed"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RealtimeClientConfig {
    pub reconnect_base: Duration,
    pub reconnect_cap: Duration,
    pub max_reconnect_attempts: u32,
    pub fallback_poll_interval: Duration,
}

impl Default for RealtimeClientConfig {
    fn default() -> Self {
        Self {
            reconnect_base: Duration::from_millis(1000),
            reconnect_cap: Duration::from_millis(10000),
            max_reconnect_attempts: 5,
            fallback_poll_interval: Duration::from_secs(3),
        }
    }
}

/// Reconnect delay before the n-th attempt (n >= 1): base, 2·base, 4·base,
/// ... capped at `reconnect_cap`.
fn backoff_delay(config: &RealtimeClientConfig, attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(16);
    config
        .reconnect_base
        .saturating_mul(1u32 << exp)
        .min(config.reconnect_cap)
}

/// Client-side realtime controller.
///
/// Owns exactly one active delivery channel. State machine:
/// `Connecting -> Open -> (on error) Reconnecting[1..max] -> Polling`, or
/// `-> Closed` on teardown. While streaming, refresh messages fan out to the
/// per-category callback registry; after the reconnect budget is exhausted
/// the controller degrades permanently to interval polling, which only
/// dispatches the `presenter-state` category.
pub struct RealtimeClient {
    callbacks: CallbackRegistry,
    status_rx: watch::Receiver<ConnectionStatus>,
    shutdown_tx: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl RealtimeClient {
    /// Start a delivery task for `event_key` over `transport`.
    pub fn connect(
        event_key: EventKey,
        transport: Arc<dyn StreamTransport>,
        config: RealtimeClientConfig,
    ) -> Self {
        let callbacks = CallbackRegistry::new();
        let (status_tx, status_rx) = watch::channel(ConnectionStatus::Connecting);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let ctx = DeliveryContext {
            event_key,
            transport,
            callbacks: callbacks.clone(),
            status: status_tx,
            shutdown: shutdown_rx,
            config,
        };
        let task = tokio::spawn(run_delivery(ctx));

        Self {
            callbacks,
            status_rx,
            shutdown_tx,
            task: Mutex::new(Some(task)),
        }
    }

    /// Register a refetch callback for one category.
    pub fn subscribe(
        &self,
        category: RefreshCategory,
        callback: impl Fn() + Send + Sync + 'static,
    ) -> Subscription {
        self.callbacks.subscribe(category, callback)
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status_rx.borrow().clone()
    }

    /// Watch for status transitions (UI status line).
    pub fn status_watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status_rx.clone()
    }

    /// Stop the delivery task and cancel all timers. Safe to call multiple
    /// times; the task reports `Closed` on its way out.
    pub fn close(&self) {
        let _ = self.shutdown_tx.send(true);
        let _ = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

impl Drop for RealtimeClient {
    fn drop(&mut self) {
        let _ = self.shutdown_tx.send(true);
        if let Some(task) = self
            .task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}

struct DeliveryContext {
    event_key: EventKey,
    transport: Arc<dyn StreamTransport>,
    callbacks: CallbackRegistry,
    status: watch::Sender<ConnectionStatus>,
    shutdown: watch::Receiver<bool>,
    config: RealtimeClientConfig,
}

async fn run_delivery(mut ctx: DeliveryContext) {
    stream_with_reconnect(&mut ctx).await;
    let _ = ctx.status.send(ConnectionStatus::Closed);
}

/// Returns true on shutdown, false once `delay` elapses.
///
/// The only value ever sent on the shutdown channel is `true`, so any
/// `changed` completion (including a dropped sender) means teardown.
async fn sleep_or_shutdown(shutdown: &mut watch::Receiver<bool>, delay: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => false,
        _ = shutdown.changed() => true,
    }
}

/// Streaming phase: open, consume, reconnect with backoff. Returns on
/// shutdown or after handing off to the polling fallback.
async fn stream_with_reconnect(ctx: &mut DeliveryContext) {
    let max_attempts = ctx.config.max_reconnect_attempts;
    let mut attempt: u32 = 0;

    loop {
        if *ctx.shutdown.borrow() {
            return;
        }

        let opened = tokio::select! {
            _ = ctx.shutdown.changed() => return,
            opened = ctx.transport.open(&ctx.event_key) => opened,
        };

        match opened {
            Ok(stream) => {
                let _ = ctx.status.send(ConnectionStatus::Open);
                attempt = 0;
                if consume_stream(ctx, stream).await == StreamEnd::Shutdown {
                    return;
                }
            }
            Err(err) => {
                tracing::debug!(event_key = %ctx.event_key, error = %err, "stream open failed");
            }
        }

        attempt += 1;
        if attempt > max_attempts {
            break;
        }

        let delay = backoff_delay(&ctx.config, attempt);
        let _ = ctx.status.send(ConnectionStatus::Reconnecting {
            attempt,
            max_attempts,
        });
        tracing::info!(
            event_key = %ctx.event_key,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            "stream lost, reconnecting"
        );
        if sleep_or_shutdown(&mut ctx.shutdown, delay).await {
            return;
        }
    }

    tracing::warn!(
        event_key = %ctx.event_key,
        "reconnect budget exhausted, falling back to interval polling"
    );
    polling_fallback(ctx).await
}

#[derive(PartialEq)]
enum StreamEnd {
    Shutdown,
    Failed,
}

async fn consume_stream(
    ctx: &mut DeliveryContext,
    mut stream: transport::MessageStream,
) -> StreamEnd {
    let DeliveryContext {
        event_key,
        callbacks,
        status,
        shutdown,
        ..
    } = ctx;

    loop {
        tokio::select! {
            _ = shutdown.changed() => return StreamEnd::Shutdown,
            item = stream.next() => {
                match item {
                    Some(Ok(RealtimeMessage::Connected)) => {
                        let _ = status.send(ConnectionStatus::Open);
                    }
                    Some(Ok(RealtimeMessage::Refresh { data })) => {
                        callbacks.dispatch(&data.refresh_types);
                    }
                    Some(Ok(RealtimeMessage::NoOp)) => {}
                    Some(Err(err)) => {
                        tracing::debug!(event_key = %event_key, error = %err, "stream errored");
                        return StreamEnd::Failed;
                    }
                    None => {
                        tracing::debug!(event_key = %event_key, "stream ended");
                        return StreamEnd::Failed;
                    }
                }
            }
        }
    }
}

/// Degraded terminal mode: invalidate `presenter-state` on a fixed interval.
///
/// The other categories are not covered here; this asymmetry with the
/// streaming and long-poll paths is an accepted degradation.
async fn polling_fallback(ctx: &mut DeliveryContext) {
    let _ = ctx.status.send(ConnectionStatus::Polling);

    let mut ticker = tokio::time::interval(ctx.config.fallback_poll_interval);
    // The immediate first tick would double-fire with the refetch the UI
    // performs on mount; skip it.
    ticker.tick().await;

    let DeliveryContext {
        callbacks, shutdown, ..
    } = ctx;

    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {
                callbacks.dispatch(&[RefreshCategory::PresenterState]);
            }
        }
    }
}

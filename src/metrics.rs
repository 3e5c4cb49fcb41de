use actix_web::HttpResponse;
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounter, IntGauge, Opts, TextEncoder};

static ACTIVE_SINKS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::with_opts(Opts::new(
        "live_sync_active_sinks",
        "Streaming connections currently registered",
    ))
    .expect("failed to create live_sync_active_sinks");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register live_sync_active_sinks");
    gauge
});

static ACTIVE_WAITERS: Lazy<IntGauge> = Lazy::new(|| {
    let gauge = IntGauge::with_opts(Opts::new(
        "live_sync_active_waiters",
        "Long-poll requests currently held open",
    ))
    .expect("failed to create live_sync_active_waiters");
    prometheus::default_registry()
        .register(Box::new(gauge.clone()))
        .expect("failed to register live_sync_active_waiters");
    gauge
});

static BROADCASTS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::with_opts(Opts::new(
        "live_sync_broadcasts_total",
        "Refresh broadcasts performed",
    ))
    .expect("failed to create live_sync_broadcasts_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register live_sync_broadcasts_total");
    counter
});

static PRUNED_SINKS_TOTAL: Lazy<IntCounter> = Lazy::new(|| {
    let counter = IntCounter::with_opts(Opts::new(
        "live_sync_pruned_sinks_total",
        "Sinks removed after a failed delivery",
    ))
    .expect("failed to create live_sync_pruned_sinks_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register live_sync_pruned_sinks_total");
    counter
});

pub fn sink_added() {
    ACTIVE_SINKS.inc();
}

pub fn sinks_removed(count: usize) {
    ACTIVE_SINKS.sub(count as i64);
}

pub fn waiter_added() {
    ACTIVE_WAITERS.inc();
}

pub fn waiters_removed(count: usize) {
    ACTIVE_WAITERS.sub(count as i64);
}

pub fn broadcast_sent() {
    BROADCASTS_TOTAL.inc();
}

pub fn sinks_pruned(count: usize) {
    PRUNED_SINKS_TOTAL.inc_by(count as u64);
}

pub async fn serve_metrics() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .content_type(encoder.format_type())
        .body(buffer)
}

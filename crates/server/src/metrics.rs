//! Prometheus metrics for the shuttle.
//!
//! The `/metrics` endpoint is unauthenticated so Prometheus can scrape it.
//! It exposes aggregate counts only, no user or content identifiers, but it
//! should still be reachable from the scraper's network only.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder,
};
use std::sync::{LazyLock, Once};

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Pin queue
pub static PINS_QUEUED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shuttle_pins_queued_total",
        "Total number of pin operations admitted to the queue",
    )
    .expect("metric creation failed")
});

pub static PINS_COMPLETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shuttle_pins_completed_total",
        "Total number of pins that became active",
    )
    .expect("metric creation failed")
});

pub static PINS_FAILED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shuttle_pins_failed_total",
        "Total number of pins marked failed",
    )
    .expect("metric creation failed")
});

pub static PIN_QUEUE_DEPTH: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "shuttle_pin_queue_depth",
        "Pin operations queued or in progress",
    )
    .expect("metric creation failed")
});

pub static PIN_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "shuttle_pin_duration_seconds",
            "Time taken to fetch, walk and record a pin",
        )
        .buckets(vec![0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0, 900.0, 3600.0]),
    )
    .expect("metric creation failed")
});

// Ingestion
pub static OBJECTS_RECORDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shuttle_objects_recorded_total",
        "Total number of objects recorded against pins",
    )
    .expect("metric creation failed")
});

pub static OBJECTS_RECLAIMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shuttle_objects_reclaimed_total",
        "Total number of unreferenced objects reclaimed after unpin",
    )
    .expect("metric creation failed")
});

pub static BYTES_INGESTED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shuttle_bytes_ingested_total",
        "Total bytes chunked from uploads",
    )
    .expect("metric creation failed")
});

// Control channel
pub static RPC_RECONNECTS: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shuttle_rpc_reconnects_total",
        "Total number of control channel sessions that ended and were redialed",
    )
    .expect("metric creation failed")
});

pub static RPC_MESSAGES_SENT: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shuttle_rpc_messages_sent_total",
        "Total number of messages written to the coordinator",
    )
    .expect("metric creation failed")
});

pub static RPC_MESSAGES_DROPPED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shuttle_rpc_messages_dropped_total",
        "Total number of outbound messages dropped after a send timeout",
    )
    .expect("metric creation failed")
});

pub static TRANSFER_STATUS_UPDATES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "shuttle_transfer_status_updates_total",
        "Total number of transfer status changes reported",
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER_ONCE: Once = Once::new();

/// Register all metrics with the global registry.
///
/// Idempotent, so tests can build as many routers as they like.
pub fn register_metrics() {
    REGISTER_ONCE.call_once(|| {
        let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
            Box::new(PINS_QUEUED.clone()),
            Box::new(PINS_COMPLETED.clone()),
            Box::new(PINS_FAILED.clone()),
            Box::new(PIN_QUEUE_DEPTH.clone()),
            Box::new(PIN_DURATION.clone()),
            Box::new(OBJECTS_RECORDED.clone()),
            Box::new(OBJECTS_RECLAIMED.clone()),
            Box::new(BYTES_INGESTED.clone()),
            Box::new(RPC_RECONNECTS.clone()),
            Box::new(RPC_MESSAGES_SENT.clone()),
            Box::new(RPC_MESSAGES_DROPPED.clone()),
            Box::new(TRANSFER_STATUS_UPDATES.clone()),
        ];
        for collector in collectors {
            REGISTRY
                .register(collector)
                .expect("metric registration failed");
        }
    });
}

/// GET /metrics - Prometheus metrics endpoint.
pub async fn metrics_handler() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();

    let mut buffer = Vec::new();
    match encoder.encode(&metric_families, &mut buffer) {
        Ok(()) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            buffer,
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            format!("Failed to encode metrics: {e}").into_bytes(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        register_metrics();
        register_metrics();
        PINS_QUEUED.inc();

        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&REGISTRY.gather(), &mut buffer)
            .unwrap();
        let text = String::from_utf8(buffer).unwrap();
        assert!(text.contains("shuttle_pins_queued_total"));
    }
}

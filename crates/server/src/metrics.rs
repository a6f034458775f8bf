//! Prometheus metrics for the strata daemon.
//!
//! GC metrics are fed by [`MetricsListener`], registered on the collector at
//! startup. Upload metrics are recorded by the artifact handlers.
//!
//! The `/metrics` endpoint is unauthenticated. It exposes aggregate counts
//! only (no paths or checksums), but should still be network-restricted to
//! the Prometheus scraper.

use axum::http::StatusCode;
use axum::response::IntoResponse;
use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder,
};
use std::sync::{LazyLock, Once};
use strata_gc::{GarbageCollectorInfo, GarbageCollectorListener};
use uuid::Uuid;

/// Global Prometheus registry for all metrics.
pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Store metrics
pub static BINARIES_ADDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "strata_binaries_added_total",
        "Total number of binaries written through the store",
    )
    .expect("metric creation failed")
});

pub static BYTES_ADDED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "strata_bytes_added_total",
        "Total bytes of binaries written through the store",
    )
    .expect("metric creation failed")
});

pub static CHECKSUM_MISMATCHES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "strata_checksum_mismatches_total",
        "Total number of uploads rejected for checksum mismatch",
    )
    .expect("metric creation failed")
});

// GC metrics
pub static GC_RUNS: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("strata_gc_runs_total", "Total GC runs by outcome"),
        &["outcome"],
    )
    .expect("metric creation failed")
});

pub static GC_RUNNING: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new("strata_gc_running", "Whether a GC run is in progress")
        .expect("metric creation failed")
});

pub static GC_BINARIES_DELETED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "strata_gc_binaries_deleted_total",
        "Total binaries deleted by GC",
    )
    .expect("metric creation failed")
});

pub static GC_DELETE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "strata_gc_delete_failures_total",
        "Total binaries GC failed to delete from every provider",
    )
    .expect("metric creation failed")
});

pub static GC_BYTES_RECLAIMED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "strata_gc_bytes_reclaimed_total",
        "Total bytes reclaimed by GC",
    )
    .expect("metric creation failed")
});

pub static GC_RUN_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("strata_gc_run_duration_seconds", "GC run duration")
            .buckets(vec![0.1, 1.0, 5.0, 30.0, 60.0, 300.0, 600.0, 1800.0, 3600.0]),
    )
    .expect("metric creation failed")
});

/// Guard to ensure metrics are only registered once.
static REGISTER: Once = Once::new();

/// Register all metrics with the global registry.
pub fn register_metrics() {
    REGISTER.call_once(|| {
        REGISTRY
            .register(Box::new(BINARIES_ADDED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(BYTES_ADDED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(CHECKSUM_MISMATCHES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(GC_RUNS.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(GC_RUNNING.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(GC_BINARIES_DELETED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(GC_DELETE_FAILURES.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(GC_BYTES_RECLAIMED.clone()))
            .expect("metric registration failed");
        REGISTRY
            .register(Box::new(GC_RUN_DURATION.clone()))
            .expect("metric registration failed");
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

/// Feeds GC runs into the Prometheus metrics.
#[derive(Debug, Default)]
pub struct MetricsListener;

impl GarbageCollectorListener for MetricsListener {
    fn start(&self, _run_id: Uuid) {
        GC_RUNNING.set(1);
    }

    fn finished(&self, info: &GarbageCollectorInfo) {
        GC_RUNNING.set(0);
        let outcome = if info.error.is_some() {
            "aborted"
        } else if info.interrupted {
            "interrupted"
        } else {
            "complete"
        };
        GC_RUNS.with_label_values(&[outcome]).inc();
        GC_BINARIES_DELETED.inc_by(info.deleted);
        GC_DELETE_FAILURES.inc_by(info.failed);
        GC_BYTES_RECLAIMED.inc_by(info.bytes_reclaimed);
        GC_RUN_DURATION.observe(info.duration_ms as f64 / 1000.0);
    }

    fn destroy(&self) {
        GC_RUNNING.set(0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_registration() {
        // This would panic if any metric creation failed
        register_metrics();
        register_metrics();
    }

    #[test]
    fn test_listener_records_run() {
        let listener = MetricsListener;
        let before = GC_BINARIES_DELETED.get();
        listener.start(Uuid::new_v4());
        assert_eq!(GC_RUNNING.get(), 1);

        let info: GarbageCollectorInfo = serde_json::from_value(serde_json::json!({
            "run_id": Uuid::new_v4(),
            "started_at": "2026-01-01T00:00:00Z",
            "finished_at": "2026-01-01T00:00:01Z",
            "duration_ms": 1000,
            "candidates": 3,
            "to_delete": 2,
            "deleted": 2,
            "failed": 0,
            "skipped": 0,
            "bytes_reclaimed": 10,
            "dry_run": false,
            "interrupted": false,
            "error": null
        }))
        .unwrap();
        listener.finished(&info);
        assert_eq!(GC_RUNNING.get(), 0);
        assert!(GC_BINARIES_DELETED.get() >= before + 2);
    }
}

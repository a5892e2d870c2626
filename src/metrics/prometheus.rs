//! Prometheus metrics registration and export.
//!
//! This module defines all Prometheus metrics used by shift-relay and provides
//! functions for initializing, registering, and exporting metrics.

use prometheus::{
    CounterVec, Encoder, Gauge, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::sync::{Mutex, OnceLock};

/// Serializes initialization so every metric lands in the same registry.
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Global Prometheus registry for all shift-relay metrics.
pub static REGISTRY: OnceLock<Registry> = OnceLock::new();

/// Scheduling API calls, labeled by operation and status.
pub static UPSTREAM_REQUESTS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Scheduling API latency in seconds, labeled by operation.
pub static UPSTREAM_LATENCY: OnceLock<HistogramVec> = OnceLock::new();

/// Reconciled shifts, labeled by outcome (created, skipped, failed).
pub static SHIFT_OUTCOMES_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Number of posts needed per reconciled shift.
pub static RECONCILE_ATTEMPTS: OnceLock<Histogram> = OnceLock::new();

/// Number of requests currently being processed.
pub static REQUESTS_IN_PROGRESS: OnceLock<Gauge> = OnceLock::new();

/// Completion notifications, labeled by status.
pub static NOTIFICATIONS_TOTAL: OnceLock<CounterVec> = OnceLock::new();

/// Initialize all metrics and register them with the registry.
///
/// Should be called once at startup. Later calls leave the first registry in
/// place.
///
/// # Errors
///
/// Returns a `prometheus::Error` if metric registration fails.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    let _guard = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if REGISTRY.get().is_some() {
        return Ok(());
    }

    let registry = Registry::new();

    let upstream_requests_total = CounterVec::new(
        Opts::new(
            "shift_relay_upstream_requests_total",
            "Total scheduling API requests",
        ),
        &["operation", "status"],
    )?;

    let upstream_latency = HistogramVec::new(
        HistogramOpts::new(
            "shift_relay_upstream_latency_seconds",
            "Scheduling API request latency in seconds",
        )
        .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0]),
        &["operation"],
    )?;

    let shift_outcomes_total = CounterVec::new(
        Opts::new("shift_relay_shift_outcomes_total", "Reconciled shifts by outcome"),
        &["outcome"],
    )?;

    let reconcile_attempts = Histogram::with_opts(
        HistogramOpts::new(
            "shift_relay_reconcile_attempts",
            "Posts needed before a shift became visible upstream",
        )
        .buckets(vec![0.0, 1.0, 2.0, 3.0, 5.0, 10.0, 20.0]),
    )?;

    let requests_in_progress = Gauge::new(
        "shift_relay_requests_in_progress",
        "Number of requests currently being processed",
    )?;

    let notifications_total = CounterVec::new(
        Opts::new(
            "shift_relay_notifications_total",
            "Completion notifications published",
        ),
        &["status"],
    )?;

    registry.register(Box::new(upstream_requests_total.clone()))?;
    registry.register(Box::new(upstream_latency.clone()))?;
    registry.register(Box::new(shift_outcomes_total.clone()))?;
    registry.register(Box::new(reconcile_attempts.clone()))?;
    registry.register(Box::new(requests_in_progress.clone()))?;
    registry.register(Box::new(notifications_total.clone()))?;

    let _ = REGISTRY.set(registry);
    let _ = UPSTREAM_REQUESTS_TOTAL.set(upstream_requests_total);
    let _ = UPSTREAM_LATENCY.set(upstream_latency);
    let _ = SHIFT_OUTCOMES_TOTAL.set(shift_outcomes_total);
    let _ = RECONCILE_ATTEMPTS.set(reconcile_attempts);
    let _ = REQUESTS_IN_PROGRESS.set(requests_in_progress);
    let _ = NOTIFICATIONS_TOTAL.set(notifications_total);

    tracing::info!("Prometheus metrics initialized successfully");

    Ok(())
}

/// Export all registered metrics in Prometheus text format.
///
/// Returns a comment line instead of metrics if the registry has not been
/// initialized or encoding fails.
pub fn export_metrics() -> String {
    let Some(registry) = REGISTRY.get() else {
        return "# Metrics not initialized. Call init_metrics() first.\n".to_string();
    };

    let encoder = TextEncoder::new();
    let metric_families = registry.gather();

    let mut buffer = Vec::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return format!("# Error encoding metrics: {}\n", e);
    }

    String::from_utf8(buffer)
        .unwrap_or_else(|e| format!("# Error converting metrics to UTF-8: {}\n", e))
}

/// HTTP handler for the /metrics endpoint.
pub async fn metrics_handler() -> String {
    export_metrics()
}

//! Recording helpers over the raw Prometheus metrics.
//!
//! Every method is a no-op until [`init_metrics`](super::init_metrics) has
//! run, so library code can record unconditionally.

use super::prometheus::{
    NOTIFICATIONS_TOTAL, RECONCILE_ATTEMPTS, REQUESTS_IN_PROGRESS, SHIFT_OUTCOMES_TOTAL,
    UPSTREAM_LATENCY, UPSTREAM_REQUESTS_TOTAL,
};

/// Metrics collector for recording shift-relay operational metrics.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    /// Create a new MetricsCollector instance.
    pub fn new() -> Self {
        Self
    }

    /// Record a scheduling API call.
    ///
    /// # Arguments
    ///
    /// * `operation` - API operation (e.g., "post_shift", "list_shifts")
    /// * `success` - Whether the call succeeded
    /// * `latency_secs` - Call latency in seconds
    pub fn record_upstream_request(&self, operation: &str, success: bool, latency_secs: f64) {
        let status = if success { "success" } else { "failure" };

        if let Some(requests) = UPSTREAM_REQUESTS_TOTAL.get() {
            requests.with_label_values(&[operation, status]).inc();
        }

        if let Some(latency) = UPSTREAM_LATENCY.get() {
            latency.with_label_values(&[operation]).observe(latency_secs);
        }

        tracing::trace!(
            operation = operation,
            status = status,
            latency_secs = latency_secs,
            "Recorded upstream request metric"
        );
    }

    /// Record the outcome of reconciling one shift.
    ///
    /// # Arguments
    ///
    /// * `outcome` - "created", "skipped" or "failed"
    /// * `attempts` - Number of posts made for the shift
    pub fn record_shift_outcome(&self, outcome: &str, attempts: u32) {
        if let Some(outcomes) = SHIFT_OUTCOMES_TOTAL.get() {
            outcomes.with_label_values(&[outcome]).inc();
        }

        if let Some(histogram) = RECONCILE_ATTEMPTS.get() {
            histogram.observe(f64::from(attempts));
        }

        tracing::trace!(outcome = outcome, attempts = attempts, "Recorded shift outcome");
    }

    /// Record a completion notification.
    pub fn record_notification(&self, success: bool) {
        let status = if success { "success" } else { "failure" };
        if let Some(notifications) = NOTIFICATIONS_TOTAL.get() {
            notifications.with_label_values(&[status]).inc();
        }
    }

    /// Increment the count of requests in progress by 1.
    pub fn inc_requests_in_progress(&self) {
        if let Some(gauge) = REQUESTS_IN_PROGRESS.get() {
            gauge.inc();
        }
    }

    /// Decrement the count of requests in progress by 1.
    pub fn dec_requests_in_progress(&self) {
        if let Some(gauge) = REQUESTS_IN_PROGRESS.get() {
            gauge.dec();
        }
    }
}

//! Metrics module for Prometheus-based monitoring.
//!
//! Tracks scheduling API traffic, reconciliation attempts, shift outcomes and
//! request throughput.
//!
//! # Example
//!
//! ```ignore
//! use shift_relay::metrics::{init_metrics, export_metrics, MetricsCollector};
//!
//! init_metrics().expect("Failed to initialize metrics");
//!
//! let collector = MetricsCollector::new();
//! collector.record_shift_outcome("created", 2);
//!
//! let metrics_text = export_metrics();
//! ```

pub mod collectors;
pub mod prometheus;

pub use collectors::MetricsCollector;
pub use prometheus::{export_metrics, init_metrics, metrics_handler};

pub use prometheus::{
    NOTIFICATIONS_TOTAL, RECONCILE_ATTEMPTS, REGISTRY, REQUESTS_IN_PROGRESS, SHIFT_OUTCOMES_TOTAL,
    UPSTREAM_LATENCY, UPSTREAM_REQUESTS_TOTAL,
};

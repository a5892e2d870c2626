//! shift-relay: forwards shift batches to an external scheduling API.
//!
//! Each submitted shift is posted to the scheduling API and re-checked
//! against its listing until it appears or the retry budget runs out.
//! Requests and their per-shift outcomes are tracked in user-sharded SQLite
//! databases, and a completion event is published when a request finishes.

pub mod api;
pub mod cli;
pub mod error;
pub mod metrics;
pub mod notify;
pub mod reconcile;
pub mod service;
pub mod shift;
pub mod storage;
pub mod upstream;

// Re-export commonly used error types
pub use error::{NotifyError, ServiceError, UpstreamError, ValidationError};

// Re-export core types
pub use notify::{CompletionEvent, LogNotifier, Notifier, RedisNotifier};
pub use reconcile::{Reconciler, RetryPolicy, ShiftOutcome};
pub use service::{RequestReport, ShiftService, ShiftSummary};
pub use shift::{ScheduledShift, Shift, ShiftKey};
pub use storage::{
    DatabaseError, RequestStatus, RequestStore, ShardRouter, ShardedStore, ShiftRequest,
    ShiftStatus, TrackedShift,
};
pub use upstream::{HttpShiftApi, ShiftApi};

//! Client side of the external scheduling API.
//!
//! The scheduling API exposes two endpoints:
//!
//! - `POST {base}/shift` accepts a single shift as JSON
//! - `GET {base}/shifts` returns `{"shifts": [...]}`
//!
//! The [`ShiftApi`] trait abstracts over them so the reconciliation loop can
//! be driven by an in-memory double in tests.

pub mod client;

use async_trait::async_trait;

use crate::error::UpstreamError;
use crate::shift::{ScheduledShift, Shift};

pub use client::HttpShiftApi;

/// Operations the relay needs from the scheduling API.
#[async_trait]
pub trait ShiftApi: Send + Sync {
    /// Submit one shift. Success only means the API accepted the call, not
    /// that the shift is visible yet.
    async fn post_shift(&self, shift: &Shift) -> Result<(), UpstreamError>;

    /// Fetch every shift the API currently knows about.
    async fn list_shifts(&self) -> Result<Vec<ScheduledShift>, UpstreamError>;
}

//! Request orchestration.
//!
//! [`ShiftService`] ties the pieces together: it records a submitted batch
//! in the sharded store, reconciles each shift against the scheduling API in
//! submission order, records every outcome, settles the request status and
//! publishes a completion event.
//!
//! Processing only touches shifts that are still pending, so a request that
//! was interrupted halfway (crash, restart) can be processed again without
//! re-posting shifts that already settled.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::error::{ServiceError, ValidationError};
use crate::metrics::MetricsCollector;
use crate::notify::{CompletionEvent, Notifier};
use crate::reconcile::Reconciler;
use crate::shift::{ScheduledShift, Shift};
use crate::storage::{RequestStatus, ShardedStore, ShiftRequest, ShiftStatus, TrackedShift};

/// Per-status shift counts of a request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShiftSummary {
    pub created: u32,
    pub skipped: u32,
    pub failed: u32,
    pub pending: u32,
}

impl ShiftSummary {
    pub fn from_shifts(shifts: &[TrackedShift]) -> Self {
        shifts
            .iter()
            .fold(Self::default(), |mut summary, tracked| {
                match tracked.status {
                    ShiftStatus::Created => summary.created += 1,
                    ShiftStatus::Skipped => summary.skipped += 1,
                    ShiftStatus::Failed => summary.failed += 1,
                    ShiftStatus::Pending => summary.pending += 1,
                }
                summary
            })
    }
}

/// A request together with the state of each of its shifts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestReport {
    #[serde(flatten)]
    pub request: ShiftRequest,
    pub summary: ShiftSummary,
    pub shifts: Vec<TrackedShift>,
}

impl RequestReport {
    fn new(request: ShiftRequest, shifts: Vec<TrackedShift>) -> Self {
        Self {
            summary: ShiftSummary::from_shifts(&shifts),
            request,
            shifts,
        }
    }
}

/// Accepts shift batches and drives them to completion.
pub struct ShiftService {
    reconciler: Reconciler,
    store: ShardedStore,
    notifier: Arc<dyn Notifier>,
    metrics: MetricsCollector,
}

impl ShiftService {
    pub fn new(reconciler: Reconciler, store: ShardedStore, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            reconciler,
            store,
            notifier,
            metrics: MetricsCollector::new(),
        }
    }

    pub fn store(&self) -> &ShardedStore {
        &self.store
    }


    /// Validate and record a batch. Nothing is posted yet.
    ///
    /// Shift rows are written before the request row, so a request that is
    /// visible always has its complete set of shifts.
    pub async fn submit(&self, shifts: Vec<Shift>) -> Result<ShiftRequest, ServiceError> {
        for (index, shift) in shifts.iter().enumerate() {
            shift.validate().map_err(|e| ValidationError::InBatch {
                index,
                source: Box::new(e),
            })?;
        }

        let request = ShiftRequest::new(shifts.len() as u32);
        let mut written = Vec::with_capacity(shifts.len());
        for (position, shift) in shifts.into_iter().enumerate() {
            let tracked = TrackedShift::new(request.id, position as u32, shift);
            if let Err(e) = self.store.insert_shift(&tracked).await {
                self.discard(request.id, &written).await;
                return Err(e.into());
            }
            written.push(tracked);
        }
        if let Err(e) = self.store.insert_request(&request).await {
            self.discard(request.id, &written).await;
            return Err(e.into());
        }

        tracing::info!(request_id = %request.id, total = request.total, "Request accepted");
        Ok(request)
    }

    /// Remove the shift rows of a submission that could not be recorded.
    /// Without a request row nothing would ever reference them.
    async fn discard(&self, request_id: Uuid, written: &[TrackedShift]) {
        for tracked in written {
            if let Err(e) = self.store.delete_shift(tracked).await {
                tracing::error!(
                    request_id = %request_id,
                    shift_id = %tracked.id,
                    error = %e,
                    "Failed to discard orphaned shift row"
                );
            }
        }
        tracing::warn!(request_id = %request_id, discarded = written.len(), "Submission rolled back");
    }

    /// Reconcile every pending shift of a request and settle its status.
    ///
    /// Processing a request that already finished returns its report and
    /// posts nothing.
    pub async fn process(&self, request_id: Uuid) -> Result<RequestReport, ServiceError> {
        let request = self
            .store
            .get_request(request_id)
            .await?
            .ok_or(ServiceError::RequestNotFound(request_id))?;

        if request.status.is_terminal() {
            tracing::debug!(request_id = %request_id, status = %request.status, "Request already settled");
            let shifts = self.store.shifts_for_request(request_id).await?;
            return Ok(RequestReport::new(request, shifts));
        }

        if request.status == RequestStatus::Pending {
            self.store
                .update_request_status(request_id, RequestStatus::Processing)
                .await?;
        }

        self.metrics.inc_requests_in_progress();
        let result = self.reconcile_request(request_id).await;
        self.metrics.dec_requests_in_progress();
        result
    }

    async fn reconcile_request(&self, request_id: Uuid) -> Result<RequestReport, ServiceError> {
        let shifts = self.store.shifts_for_request(request_id).await?;

        for tracked in shifts.iter().filter(|t| !t.status.is_terminal()) {
            let outcome = self.reconciler.add_shift(&tracked.shift).await;
            tracing::info!(
                request_id = %request_id,
                position = tracked.position,
                user_id = %tracked.shift.user_id,
                outcome = outcome.label(),
                attempts = outcome.attempts(),
                "Shift reconciled"
            );
            self.store.record_shift_outcome(tracked, &outcome).await?;
        }

        let shifts = self.store.shifts_for_request(request_id).await?;
        let summary = ShiftSummary::from_shifts(&shifts);
        let final_status = if summary.failed > 0 {
            RequestStatus::Failed
        } else {
            RequestStatus::Completed
        };
        let request = self
            .store
            .update_request_status(request_id, final_status)
            .await?;

        let event = CompletionEvent {
            request_id,
            status: request.status,
            total: request.total,
            created: summary.created,
            skipped: summary.skipped,
            failed: summary.failed,
            completed_at: Utc::now(),
        };
        match self.notifier.notify(&event).await {
            Ok(()) => self.metrics.record_notification(true),
            Err(e) => {
                self.metrics.record_notification(false);
                tracing::warn!(request_id = %request_id, error = %e, "Failed to publish completion event");
            }
        }

        Ok(RequestReport::new(request, shifts))
    }

    /// Submit and process a batch in one call, then return the report along
    /// with the scheduling API's listing after the batch.
    pub async fn submit_and_process(
        &self,
        shifts: Vec<Shift>,
    ) -> Result<(RequestReport, Vec<ScheduledShift>), ServiceError> {
        let request = self.submit(shifts).await?;
        let report = self.process(request.id).await?;
        let listing = self.reconciler.existing_shifts().await;
        Ok((report, listing))
    }

    /// Process a request on a background task.
    pub fn spawn_processing(self: &Arc<Self>, request_id: Uuid) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            if let Err(e) = service.process(request_id).await {
                tracing::error!(request_id = %request_id, error = %e, "Request processing failed");
            }
        })
    }

    /// Restart processing for every request left pending or processing.
    pub async fn resume_incomplete(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>, ServiceError> {
        let open = self
            .store
            .list_requests_by_status(&[RequestStatus::Pending, RequestStatus::Processing])
            .await?;

        if !open.is_empty() {
            tracing::info!(count = open.len(), "Resuming incomplete requests");
        }
        Ok(open
            .iter()
            .map(|request| self.spawn_processing(request.id))
            .collect())
    }

    /// Current state of a request, if it exists.
    pub async fn report(&self, request_id: Uuid) -> Result<Option<RequestReport>, ServiceError> {
        let Some(request) = self.store.get_request(request_id).await? else {
            return Ok(None);
        };
        let shifts = self.store.shifts_for_request(request_id).await?;
        Ok(Some(RequestReport::new(request, shifts)))
    }

    /// The scheduling API's current listing, empty if it cannot be fetched.
    pub async fn existing_shifts(&self) -> Vec<ScheduledShift> {
        self.reconciler.existing_shifts().await
    }
}

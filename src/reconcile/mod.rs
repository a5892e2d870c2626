//! Post-then-verify reconciliation against the scheduling API.
//!
//! The scheduling API acknowledges a post before the shift is guaranteed to
//! be visible, and sometimes drops it entirely. A shift therefore only counts
//! as created once it shows up in a fresh `GET /shifts` listing. The loop for
//! one shift is:
//!
//! 1. If the shift is already listed, skip it without posting.
//! 2. Post the shift, wait `interval`, re-list and linear-scan for a match.
//! 3. Repeat step 2 until a match is found or `max_attempts` posts were made.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::metrics::MetricsCollector;
use crate::shift::{ScheduledShift, Shift};
use crate::upstream::ShiftApi;

/// Default pause between a post and the verification listing.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(300);

/// Default number of posts before a shift is declared failed.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 20;

/// How hard the reconciler tries before giving up on a shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Pause between posting and re-listing.
    pub interval: Duration,
    /// Maximum number of posts per shift. Always at least 1.
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Create a policy. A zero `max_attempts` is raised to 1.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRY_INTERVAL, DEFAULT_MAX_ATTEMPTS)
    }
}

/// Result of reconciling a single shift.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum ShiftOutcome {
    /// The shift was already listed; nothing was posted.
    Skipped,
    /// The shift became visible after `attempts` posts.
    Created { attempts: u32 },
    /// The shift never became visible.
    Failed { attempts: u32, reason: String },
}

impl ShiftOutcome {
    /// Number of posts made.
    pub fn attempts(&self) -> u32 {
        match self {
            ShiftOutcome::Skipped => 0,
            ShiftOutcome::Created { attempts } | ShiftOutcome::Failed { attempts, .. } => *attempts,
        }
    }

    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            ShiftOutcome::Skipped => "skipped",
            ShiftOutcome::Created { .. } => "created",
            ShiftOutcome::Failed { .. } => "failed",
        }
    }
}

/// Drives shifts into the scheduling API until they are visible.
#[derive(Clone)]
pub struct Reconciler {
    api: Arc<dyn ShiftApi>,
    policy: RetryPolicy,
    metrics: MetricsCollector,
}

impl Reconciler {
    /// Create a reconciler over `api`.
    pub fn new(api: Arc<dyn ShiftApi>, policy: RetryPolicy) -> Self {
        Self {
            api,
            policy,
            metrics: MetricsCollector::new(),
        }
    }

    /// The retry policy in use.
    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Current upstream listing. A failed listing is logged and reads as empty.
    pub async fn existing_shifts(&self) -> Vec<ScheduledShift> {
        match self.api.list_shifts().await {
            Ok(shifts) => shifts,
            Err(e) => {
                tracing::warn!(error = %e, "Error fetching existing shifts");
                Vec::new()
            }
        }
    }

    /// Whether `shift` is currently listed upstream.
    pub async fn shift_exists(&self, shift: &Shift) -> bool {
        self.existing_shifts()
            .await
            .iter()
            .any(|existing| existing.matches(shift))
    }

    /// Reconcile one shift. See the module docs for the loop.
    pub async fn add_shift(&self, shift: &Shift) -> ShiftOutcome {
        let outcome = self.run_loop(shift).await;
        self.metrics
            .record_shift_outcome(outcome.label(), outcome.attempts());
        outcome
    }

    async fn run_loop(&self, shift: &Shift) -> ShiftOutcome {
        if self.shift_exists(shift).await {
            tracing::info!(
                user_id = %shift.user_id,
                company_id = %shift.company_id,
                "Shift already exists, skipping"
            );
            return ShiftOutcome::Skipped;
        }

        let mut last_error: Option<String> = None;
        for attempt in 1..=self.policy.max_attempts {
            if let Err(e) = self.api.post_shift(shift).await {
                tracing::warn!(
                    user_id = %shift.user_id,
                    attempt = attempt,
                    error = %e,
                    "Shift post failed"
                );
                last_error = Some(e.to_string());
            }

            tokio::time::sleep(self.policy.interval).await;

            if self.shift_exists(shift).await {
                tracing::debug!(user_id = %shift.user_id, attempts = attempt, "Shift confirmed");
                return ShiftOutcome::Created { attempts: attempt };
            }
        }

        let reason = last_error.unwrap_or_else(|| "shift not visible upstream".to_string());
        tracing::error!(
            user_id = %shift.user_id,
            attempts = self.policy.max_attempts,
            reason = %reason,
            "Giving up on shift"
        );
        ShiftOutcome::Failed {
            attempts: self.policy.max_attempts,
            reason,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory scheduling API double shared by unit tests.

    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::sync::Mutex;

    use crate::error::UpstreamError;
    use crate::shift::{ScheduledShift, Shift};
    use crate::upstream::ShiftApi;

    /// Stores a shift only on its `accept_on`-th post, like a flaky API.
    #[derive(Default)]
    pub struct FakeApi {
        pub accept_on: u32,
        pub posts: AtomicU32,
        pub lists: AtomicU32,
        pub fail_posts: AtomicBool,
        pub fail_lists: AtomicBool,
        pub never_store: AtomicBool,
        pub stored: Mutex<Vec<ScheduledShift>>,
    }

    impl FakeApi {
        pub fn new(accept_on: u32) -> Self {
            Self {
                accept_on,
                ..Self::default()
            }
        }

        pub fn with_existing(shifts: &[Shift]) -> Self {
            let api = Self::new(1);
            api.stored
                .lock()
                .unwrap()
                .extend(shifts.iter().map(ScheduledShift::from));
            api
        }

        pub fn posts(&self) -> u32 {
            self.posts.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ShiftApi for FakeApi {
        async fn post_shift(&self, shift: &Shift) -> Result<(), UpstreamError> {
            let n = self.posts.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_posts.load(Ordering::SeqCst) {
                return Err(UpstreamError::ApiError {
                    code: 503,
                    message: "unavailable".to_string(),
                });
            }
            if !self.never_store.load(Ordering::SeqCst) && n >= self.accept_on {
                let mut stored = self.stored.lock().unwrap();
                if !stored.iter().any(|s| s.matches(shift)) {
                    stored.push(ScheduledShift::from(shift));
                }
            }
            Ok(())
        }

        async fn list_shifts(&self) -> Result<Vec<ScheduledShift>, UpstreamError> {
            self.lists.fetch_add(1, Ordering::SeqCst);
            if self.fail_lists.load(Ordering::SeqCst) {
                return Err(UpstreamError::RequestFailed("connection refused".to_string()));
            }
            Ok(self.stored.lock().unwrap().clone())
        }
    }
}

//! Completion notifications.
//!
//! When a request reaches a terminal state a [`CompletionEvent`] is published
//! through a [`Notifier`]. The Redis notifier pushes events onto a list that
//! downstream consumers drain; consuming is outside this crate.
//!
//! # Queue Structure
//!
//! Events are `LPUSH`ed onto `{queue_name}` as JSON so a consumer popping from
//! the right sees them in FIFO order.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::NotifyError;
use crate::storage::RequestStatus;

/// Default Redis list for completion events.
pub const DEFAULT_QUEUE_NAME: &str = "shift-relay:notifications";

/// Published once per request when it finishes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionEvent {
    pub request_id: Uuid,
    pub status: RequestStatus,
    pub total: u32,
    pub created: u32,
    pub skipped: u32,
    pub failed: u32,
    pub completed_at: DateTime<Utc>,
}

impl CompletionEvent {
    /// JSON payload pushed onto the notification queue.
    pub fn to_payload(&self) -> Result<String, NotifyError> {
        Ok(serde_json::to_string(self)?)
    }
}

/// Sink for completion events.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event: &CompletionEvent) -> Result<(), NotifyError>;
}

/// Publishes events onto a Redis list.
pub struct RedisNotifier {
    /// Redis connection manager (handles reconnection automatically).
    redis: ConnectionManager,
    queue_name: String,
}

impl RedisNotifier {
    /// Connects to Redis and creates a notifier for `queue_name`.
    ///
    /// # Errors
    ///
    /// Returns `NotifyError::ConnectionFailed` if the URL is invalid or the
    /// server cannot be reached.
    pub async fn connect(redis_url: &str, queue_name: &str) -> Result<Self, NotifyError> {
        let client = redis::Client::open(redis_url)
            .map_err(|e| NotifyError::ConnectionFailed(e.to_string()))?;

        let redis = ConnectionManager::new(client)
            .await
            .map_err(|e| NotifyError::ConnectionFailed(e.to_string()))?;

        Ok(Self::from_connection(redis, queue_name))
    }

    /// Creates a notifier from an existing ConnectionManager.
    pub fn from_connection(redis: ConnectionManager, queue_name: &str) -> Self {
        Self {
            redis,
            queue_name: queue_name.to_string(),
        }
    }

    /// Returns the queue name.
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }
}

#[async_trait]
impl Notifier for RedisNotifier {
    async fn notify(&self, event: &CompletionEvent) -> Result<(), NotifyError> {
        let serialized = event.to_payload()?;
        let mut conn = self.redis.clone();
        conn.lpush::<_, _, ()>(&self.queue_name, serialized).await?;

        tracing::debug!(
            request_id = %event.request_id,
            queue = %self.queue_name,
            "Completion event published"
        );
        Ok(())
    }
}

/// Writes events to the log. Used when no Redis URL is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event: &CompletionEvent) -> Result<(), NotifyError> {
        tracing::info!(
            request_id = %event.request_id,
            status = %event.status,
            total = event.total,
            created = event.created,
            skipped = event.skipped,
            failed = event.failed,
            "Request completed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> CompletionEvent {
        CompletionEvent {
            request_id: Uuid::new_v4(),
            status: RequestStatus::Completed,
            total: 3,
            created: 2,
            skipped: 1,
            failed: 0,
            completed_at: Utc::now(),
        }
    }

    #[test]
    fn test_event_json_shape() {
        let event = sample_event();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["requestId"], event.request_id.to_string());
        assert_eq!(json["status"], "completed");
        assert_eq!(json["created"], 2);
        assert!(json.get("completedAt").is_some());
    }

    #[tokio::test]
    async fn test_log_notifier_accepts_events() {
        LogNotifier.notify(&sample_event()).await.unwrap();
    }

    #[test]
    fn test_payload_round_trips_event() {
        let event = sample_event();
        let payload = event.to_payload().unwrap();
        let decoded: CompletionEvent = serde_json::from_str(&payload).unwrap();
        assert_eq!(decoded, event);
    }

    /// Needs a running Redis. Run with:
    /// REDIS_URL=redis://127.0.0.1:6379 cargo test notify -- --ignored
    #[tokio::test]
    #[ignore]
    async fn test_redis_notifier_pushes_onto_queue() {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let queue = format!("shift-relay:test:{}", Uuid::new_v4());
        let notifier = RedisNotifier::connect(&url, &queue).await.unwrap();
        assert_eq!(notifier.queue_name(), queue);

        let first = sample_event();
        let second = sample_event();
        notifier.notify(&first).await.unwrap();
        notifier.notify(&second).await.unwrap();

        let mut conn = notifier.redis.clone();
        let oldest: String = conn.rpop(&queue, None).await.unwrap();
        let newest: String = conn.rpop(&queue, None).await.unwrap();
        let _: () = conn.del(&queue).await.unwrap();

        assert_eq!(serde_json::from_str::<CompletionEvent>(&oldest).unwrap(), first);
        assert_eq!(serde_json::from_str::<CompletionEvent>(&newest).unwrap(), second);
    }

    #[tokio::test]
    async fn test_redis_notifier_rejects_bad_url() {
        let result = RedisNotifier::connect("not a redis url", DEFAULT_QUEUE_NAME).await;
        assert!(matches!(result, Err(NotifyError::ConnectionFailed(_))));
    }
}

//! SQLite request store for a single shard.
//!
//! Persists shift requests (batches) and the per-shift tracking rows that
//! record how each shift was reconciled. Status changes are compare-and-set
//! updates so a terminal state can never be overwritten.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use super::migrations::{AppliedMigration, MigrationRunner};
use crate::reconcile::ShiftOutcome;
use crate::shift::Shift;

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Connection to the database failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    /// Record not found.
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Migration error.
    #[error("Migration error: {0}")]
    Migration(#[from] super::migrations::MigrationError),

    /// A status change that the lifecycle does not allow.
    #[error("Invalid status transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    /// A stored value could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A sharded store needs at least one shard.
    #[error("At least one shard is required")]
    NoShards,
}

/// Lifecycle of a shift request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Processing => "processing",
            RequestStatus::Completed => "completed",
            RequestStatus::Failed => "failed",
        }
    }

    /// Completed and failed requests never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Failed)
    }

    pub fn can_transition_to(&self, next: RequestStatus) -> bool {
        matches!(
            (self, next),
            (RequestStatus::Pending, RequestStatus::Processing)
                | (RequestStatus::Processing, RequestStatus::Completed)
                | (RequestStatus::Processing, RequestStatus::Failed)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RequestStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "processing" => Ok(RequestStatus::Processing),
            "completed" => Ok(RequestStatus::Completed),
            "failed" => Ok(RequestStatus::Failed),
            other => Err(DatabaseError::Corrupt(format!(
                "unknown request status '{}'",
                other
            ))),
        }
    }
}

/// Lifecycle of a single tracked shift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShiftStatus {
    Pending,
    Created,
    Skipped,
    Failed,
}

impl ShiftStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ShiftStatus::Pending => "pending",
            ShiftStatus::Created => "created",
            ShiftStatus::Skipped => "skipped",
            ShiftStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, ShiftStatus::Pending)
    }
}

impl From<&ShiftOutcome> for ShiftStatus {
    fn from(outcome: &ShiftOutcome) -> Self {
        match outcome {
            ShiftOutcome::Skipped => ShiftStatus::Skipped,
            ShiftOutcome::Created { .. } => ShiftStatus::Created,
            ShiftOutcome::Failed { .. } => ShiftStatus::Failed,
        }
    }
}

impl fmt::Display for ShiftStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ShiftStatus {
    type Err = DatabaseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ShiftStatus::Pending),
            "created" => Ok(ShiftStatus::Created),
            "skipped" => Ok(ShiftStatus::Skipped),
            "failed" => Ok(ShiftStatus::Failed),
            other => Err(DatabaseError::Corrupt(format!(
                "unknown shift status '{}'",
                other
            ))),
        }
    }
}

/// A batch of shifts submitted in one call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShiftRequest {
    #[serde(rename = "requestId")]
    pub id: Uuid,
    pub status: RequestStatus,
    /// Number of shifts in the batch.
    pub total: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ShiftRequest {
    /// Create a new pending request for `total` shifts.
    pub fn new(total: u32) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            status: RequestStatus::Pending,
            total,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One shift of a request, with its reconciliation state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedShift {
    pub id: Uuid,
    pub request_id: Uuid,
    /// Index of the shift in the submitted batch.
    pub position: u32,
    #[serde(flatten)]
    pub shift: Shift,
    pub status: ShiftStatus,
    /// Number of posts made to the scheduling API.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TrackedShift {
    /// Create a pending tracking row for `shift` at `position` in a request.
    pub fn new(request_id: Uuid, position: u32, shift: Shift) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            request_id,
            position,
            shift,
            status: ShiftStatus::Pending,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// SQLite-backed store for one shard.
#[derive(Debug, Clone)]
pub struct RequestStore {
    pool: SqlitePool,
}

impl RequestStore {
    /// Connects to the database and returns a new store.
    ///
    /// # Arguments
    ///
    /// * `database_url` - SQLite connection string (e.g., "sqlite://shift-relay-0.db").
    ///   The file is created if it does not exist.
    pub async fn connect(database_url: &str) -> Result<Self, DatabaseError> {
        let opts = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(opts)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed(e.to_string()))?;

        tracing::info!(url = database_url, "Request store opened");
        Ok(Self { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> Result<(), DatabaseError> {
        let runner = MigrationRunner::new(self.pool.clone());
        runner.run_migrations().await?;
        Ok(())
    }

    /// Lists migrations applied to this shard.
    pub async fn applied_migrations(&self) -> Result<Vec<AppliedMigration>, DatabaseError> {
        let runner = MigrationRunner::new(self.pool.clone());
        Ok(runner.list_applied_migrations().await?)
    }

    // =========================================================================
    // Request Operations
    // =========================================================================

    /// Inserts a new request row.
    pub async fn insert_request(&self, request: &ShiftRequest) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO shift_requests (id, status, total, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .bind(request.id.to_string())
        .bind(request.status.as_str())
        .bind(i64::from(request.total))
        .bind(request.created_at)
        .bind(request.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Retrieves a request by its ID.
    pub async fn get_request(&self, id: Uuid) -> Result<Option<ShiftRequest>, DatabaseError> {
        let row = sqlx::query(
            "SELECT id, status, total, created_at, updated_at FROM shift_requests WHERE id = ?1",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(request_from_row).transpose()
    }

    /// Moves a request to `next`, enforcing the request lifecycle.
    pub async fn update_request_status(
        &self,
        id: Uuid,
        next: RequestStatus,
    ) -> Result<ShiftRequest, DatabaseError> {
        let current = self
            .get_request(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound(format!("Request {}", id)))?;

        if !current.status.can_transition_to(next) {
            return Err(DatabaseError::InvalidTransition {
                from: current.status.to_string(),
                to: next.to_string(),
            });
        }

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE shift_requests SET status = ?1, updated_at = ?2 WHERE id = ?3 AND status = ?4",
        )
        .bind(next.as_str())
        .bind(now)
        .bind(id.to_string())
        .bind(current.status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Lost a race with another writer; report what is stored now.
            let stored = self
                .get_request(id)
                .await?
                .ok_or_else(|| DatabaseError::NotFound(format!("Request {}", id)))?;
            return Err(DatabaseError::InvalidTransition {
                from: stored.status.to_string(),
                to: next.to_string(),
            });
        }

        Ok(ShiftRequest {
            status: next,
            updated_at: now,
            ..current
        })
    }

    /// Lists requests in any of `statuses`, oldest first.
    pub async fn list_requests_by_status(
        &self,
        statuses: &[RequestStatus],
    ) -> Result<Vec<ShiftRequest>, DatabaseError> {
        if statuses.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<String> = (1..=statuses.len()).map(|i| format!("?{}", i)).collect();
        let query = format!(
            "SELECT id, status, total, created_at, updated_at FROM shift_requests \
             WHERE status IN ({}) ORDER BY created_at",
            placeholders.join(", ")
        );

        let mut sqlx_query = sqlx::query(&query);
        for status in statuses {
            sqlx_query = sqlx_query.bind(status.as_str());
        }

        let rows = sqlx_query.fetch_all(&self.pool).await?;
        rows.iter().map(request_from_row).collect()
    }

    // =========================================================================
    // Tracked Shift Operations
    // =========================================================================

    /// Inserts a tracked shift row.
    pub async fn insert_shift(&self, tracked: &TrackedShift) -> Result<(), DatabaseError> {
        sqlx::query(
            r#"
            INSERT INTO tracked_shifts (
                id, request_id, position, company_id, user_id, start_time, end_time,
                action, status, attempts, last_error, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
        )
        .bind(tracked.id.to_string())
        .bind(tracked.request_id.to_string())
        .bind(i64::from(tracked.position))
        .bind(&tracked.shift.company_id)
        .bind(&tracked.shift.user_id)
        .bind(&tracked.shift.start_time)
        .bind(&tracked.shift.end_time)
        .bind(&tracked.shift.action)
        .bind(tracked.status.as_str())
        .bind(i64::from(tracked.attempts))
        .bind(&tracked.last_error)
        .bind(tracked.created_at)
        .bind(tracked.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Deletes a tracked shift. Returns whether a row was removed.
    pub async fn delete_shift(&self, id: Uuid) -> Result<bool, DatabaseError> {
        let result = sqlx::query("DELETE FROM tracked_shifts WHERE id = ?1")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Retrieves the shifts this shard holds for a request, by position.
    pub async fn shifts_for_request(
        &self,
        request_id: Uuid,
    ) -> Result<Vec<TrackedShift>, DatabaseError> {
        let rows = sqlx::query(
            r#"
            SELECT id, request_id, position, company_id, user_id, start_time, end_time,
                   action, status, attempts, last_error, created_at, updated_at
            FROM tracked_shifts
            WHERE request_id = ?1
            ORDER BY position
            "#,
        )
        .bind(request_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(tracked_shift_from_row).collect()
    }

    /// Records how a pending shift was reconciled.
    pub async fn record_shift_outcome(
        &self,
        tracked: &TrackedShift,
        outcome: &ShiftOutcome,
    ) -> Result<TrackedShift, DatabaseError> {
        let next = ShiftStatus::from(outcome);
        let last_error = match outcome {
            ShiftOutcome::Failed { reason, .. } => Some(reason.clone()),
            _ => None,
        };
        let now = Utc::now();

        let result = sqlx::query(
            r#"
            UPDATE tracked_shifts
            SET status = ?1, attempts = ?2, last_error = ?3, updated_at = ?4
            WHERE id = ?5 AND status = ?6
            "#,
        )
        .bind(next.as_str())
        .bind(i64::from(outcome.attempts()))
        .bind(&last_error)
        .bind(now)
        .bind(tracked.id.to_string())
        .bind(ShiftStatus::Pending.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            let stored: Option<(String,)> =
                sqlx::query_as("SELECT status FROM tracked_shifts WHERE id = ?1")
                    .bind(tracked.id.to_string())
                    .fetch_optional(&self.pool)
                    .await?;
            return match stored {
                Some((status,)) => Err(DatabaseError::InvalidTransition {
                    from: status,
                    to: next.to_string(),
                }),
                None => Err(DatabaseError::NotFound(format!("Shift {}", tracked.id))),
            };
        }

        Ok(TrackedShift {
            status: next,
            attempts: outcome.attempts(),
            last_error,
            updated_at: now,
            ..tracked.clone()
        })
    }
}

fn parse_uuid(value: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(value).map_err(|e| DatabaseError::Corrupt(format!("bad id '{}': {}", value, e)))
}

fn request_from_row(row: &SqliteRow) -> Result<ShiftRequest, DatabaseError> {
    let id: String = row.try_get("id")?;
    let status: String = row.try_get("status")?;
    let total: i64 = row.try_get("total")?;

    Ok(ShiftRequest {
        id: parse_uuid(&id)?,
        status: status.parse()?,
        total: total as u32,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn tracked_shift_from_row(row: &SqliteRow) -> Result<TrackedShift, DatabaseError> {
    let id: String = row.try_get("id")?;
    let request_id: String = row.try_get("request_id")?;
    let position: i64 = row.try_get("position")?;
    let status: String = row.try_get("status")?;
    let attempts: i64 = row.try_get("attempts")?;

    Ok(TrackedShift {
        id: parse_uuid(&id)?,
        request_id: parse_uuid(&request_id)?,
        position: position as u32,
        shift: Shift {
            company_id: row.try_get("company_id")?,
            user_id: row.try_get("user_id")?,
            start_time: row.try_get("start_time")?,
            end_time: row.try_get("end_time")?,
            action: row.try_get("action")?,
        },
        status: status.parse()?,
        attempts: attempts as u32,
        last_error: row.try_get("last_error")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

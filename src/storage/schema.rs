//! Database schema constants.
//!
//! Every shard carries the same schema. Request rows are only written to the
//! directory shard, tracked shifts only to the shard owning their user, so
//! there is no foreign key between the two tables.

/// SQL schema for creating the shift_requests table.
pub const CREATE_SHIFT_REQUESTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS shift_requests (
    id          TEXT    PRIMARY KEY,
    status      TEXT    NOT NULL,
    total       INTEGER NOT NULL,
    created_at  TEXT    NOT NULL,
    updated_at  TEXT    NOT NULL
)
"#;

/// SQL schema for creating the tracked_shifts table.
pub const CREATE_TRACKED_SHIFTS_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS tracked_shifts (
    id          TEXT    PRIMARY KEY,
    request_id  TEXT    NOT NULL,
    position    INTEGER NOT NULL,
    company_id  TEXT    NOT NULL,
    user_id     TEXT    NOT NULL,
    start_time  TEXT    NOT NULL,
    end_time    TEXT    NOT NULL,
    action      TEXT    NOT NULL,
    status      TEXT    NOT NULL,
    attempts    INTEGER NOT NULL DEFAULT 0,
    last_error  TEXT,
    created_at  TEXT    NOT NULL,
    updated_at  TEXT    NOT NULL,
    UNIQUE(request_id, position)
)
"#;

/// SQL for creating all required indexes.
pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_shift_requests_status ON shift_requests(status);
CREATE INDEX IF NOT EXISTS idx_tracked_shifts_request_id ON tracked_shifts(request_id);
CREATE INDEX IF NOT EXISTS idx_tracked_shifts_user_id ON tracked_shifts(user_id)
"#;

/// Returns all schema creation statements in the correct order.
pub fn all_schema_statements() -> Vec<&'static str> {
    vec![
        CREATE_SHIFT_REQUESTS_TABLE,
        CREATE_TRACKED_SHIFTS_TABLE,
        CREATE_INDEXES,
    ]
}

/// Table names in the schema.
pub mod tables {
    /// Shift requests (batches) table name.
    pub const SHIFT_REQUESTS: &str = "shift_requests";
    /// Tracked shifts table name.
    pub const TRACKED_SHIFTS: &str = "tracked_shifts";
}

//! Persistent request tracking over sharded SQLite databases.
//!
//! # Overview
//!
//! - **RequestStore**: one SQLite database holding requests and tracked shifts
//! - **ShardedStore**: N request stores, with tracked shifts routed by user id
//! - **Migrations**: idempotent schema setup per shard
//!
//! # Usage
//!
//! ```rust,ignore
//! use shift_relay::storage::{ShardedStore, ShiftRequest};
//!
//! let urls = vec!["sqlite://shard-0.db".to_string(), "sqlite://shard-1.db".to_string()];
//! let store = ShardedStore::connect(&urls).await?;
//! store.run_migrations().await?;
//!
//! let request = ShiftRequest::new(3);
//! store.insert_request(&request).await?;
//! ```

pub mod database;
pub mod migrations;
pub mod schema;
pub mod shard;

pub use database::{
    DatabaseError, RequestStatus, RequestStore, ShiftRequest, ShiftStatus, TrackedShift,
};
pub use migrations::{AppliedMigration, MigrationError, MigrationRunner};
pub use shard::{ShardRouter, ShardedStore, DIRECTORY_SHARD};

//! Command-line interface for shift-relay.
//!
//! Provides commands for running the HTTP service, migrating shard
//! databases and inspecting shard routing.

mod commands;

pub use commands::{parse_cli, run_with_cli, Cli, Commands};

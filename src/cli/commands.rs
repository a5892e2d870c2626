//! CLI command definitions for shift-relay.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};

use crate::api;
use crate::metrics::init_metrics;
use crate::notify::{LogNotifier, Notifier, RedisNotifier, DEFAULT_QUEUE_NAME};
use crate::reconcile::{Reconciler, RetryPolicy};
use crate::service::ShiftService;
use crate::storage::{ShardRouter, ShardedStore};
use crate::upstream::HttpShiftApi;

/// Default listen address.
const DEFAULT_BIND: &str = "0.0.0.0:5000";

/// Default scheduling API base URL.
const DEFAULT_UPSTREAM_URL: &str = "http://localhost:8181";

/// Default shard database.
const DEFAULT_SHARD: &str = "sqlite://shift-relay-0.db";

/// Relay that forwards shift batches to a scheduling API until they stick.
#[derive(Parser, Debug)]
#[command(name = "shift-relay")]
#[command(about = "Forward shift batches to a scheduling API and track their outcome")]
#[command(version)]
#[command(
    long_about = "shift-relay accepts batches of shifts over HTTP, posts each one to an external scheduling API, \
and retries until the shift shows up in the API's listing.\n\nExample usage:\n  shift-relay serve --upstream-url http://localhost:8181 --shard sqlite://shard-0.db --shard sqlite://shard-1.db"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP service.
    Serve(ServeArgs),

    /// Apply database migrations to every shard and list what is applied.
    Migrate(MigrateArgs),

    /// Print the shard index a user id routes to.
    ShardOf(ShardOfArgs),
}

/// Arguments for `shift-relay serve`.
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Address to listen on.
    #[arg(long, env = "SHIFT_RELAY_BIND", default_value = DEFAULT_BIND)]
    pub bind: SocketAddr,

    /// Base URL of the scheduling API.
    #[arg(long, env = "SHIFT_RELAY_UPSTREAM_URL", default_value = DEFAULT_UPSTREAM_URL)]
    pub upstream_url: String,

    /// Shard database URL. Repeat for more shards; order defines shard indexes.
    #[arg(
        long = "shard",
        env = "SHIFT_RELAY_SHARDS",
        value_delimiter = ',',
        default_value = DEFAULT_SHARD
    )]
    pub shards: Vec<String>,

    /// Redis URL for completion notifications. Events are only logged when unset.
    #[arg(long, env = "SHIFT_RELAY_REDIS_URL")]
    pub redis_url: Option<String>,

    /// Redis list receiving completion notifications.
    #[arg(long, default_value = DEFAULT_QUEUE_NAME)]
    pub queue_name: String,

    /// Delay between attempts to add a shift, in milliseconds.
    #[arg(long, default_value = "300")]
    pub retry_interval_ms: u64,

    /// Maximum attempts per shift before it is marked failed.
    #[arg(long, default_value = "20")]
    pub max_attempts: u32,

    /// Timeout for a single scheduling API call, in seconds.
    #[arg(long, default_value = "30")]
    pub upstream_timeout_secs: u64,
}

impl ServeArgs {
    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.retry_interval_ms),
            self.max_attempts,
        )
    }
}

/// Arguments for `shift-relay migrate`.
#[derive(Parser, Debug)]
pub struct MigrateArgs {
    /// Shard database URL. Repeat for more shards.
    #[arg(
        long = "shard",
        env = "SHIFT_RELAY_SHARDS",
        value_delimiter = ',',
        default_value = DEFAULT_SHARD
    )]
    pub shards: Vec<String>,
}

/// Arguments for `shift-relay shard-of`.
#[derive(Parser, Debug)]
pub struct ShardOfArgs {
    /// User id to route.
    pub user_id: String,

    /// Number of shards.
    #[arg(long, default_value = "1")]
    pub shards: usize,
}

/// Parse CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Run the CLI with the parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve(args) => run_serve_command(args).await,
        Commands::Migrate(args) => run_migrate_command(args).await,
        Commands::ShardOf(args) => run_shard_of_command(args),
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

async fn run_serve_command(args: ServeArgs) -> anyhow::Result<()> {
    init_metrics().context("Failed to register metrics")?;

    let store = ShardedStore::connect(&args.shards)
        .await
        .context("Failed to open shard databases")?;
    store
        .run_migrations()
        .await
        .context("Failed to migrate shard databases")?;

    let api = HttpShiftApi::new(
        args.upstream_url.clone(),
        Duration::from_secs(args.upstream_timeout_secs),
    )?;
    let reconciler = Reconciler::new(Arc::new(api), args.retry_policy());

    let notifier: Arc<dyn Notifier> = match &args.redis_url {
        Some(url) => Arc::new(
            RedisNotifier::connect(url, &args.queue_name)
                .await
                .context("Failed to connect to Redis")?,
        ),
        None => {
            warn!("No Redis URL configured, completion events will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let service = Arc::new(ShiftService::new(reconciler, store, notifier));

    let resumed = service
        .resume_incomplete()
        .await
        .context("Failed to resume unfinished requests")?;
    if !resumed.is_empty() {
        info!(count = resumed.len(), "Resumed unfinished requests");
    }

    let listener = tokio::net::TcpListener::bind(args.bind)
        .await
        .with_context(|| format!("Failed to bind {}", args.bind))?;

    info!(
        bind = %args.bind,
        upstream = %args.upstream_url,
        shards = args.shards.len(),
        max_attempts = args.max_attempts,
        "shift-relay listening"
    );

    axum::serve(listener, api::router(service))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("shift-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

async fn run_migrate_command(args: MigrateArgs) -> anyhow::Result<()> {
    let store = ShardedStore::connect(&args.shards)
        .await
        .context("Failed to open shard databases")?;
    store
        .run_migrations()
        .await
        .context("Failed to migrate shard databases")?;

    for (index, (url, shard)) in args.shards.iter().zip(store.shards()).enumerate() {
        let applied = shard.applied_migrations().await?;
        println!("shard {} ({}): {} migrations applied", index, url, applied.len());
        for migration in applied {
            println!("  {}  {}", migration.applied_at.to_rfc3339(), migration.name);
        }
    }

    Ok(())
}

fn run_shard_of_command(args: ShardOfArgs) -> anyhow::Result<()> {
    let router = ShardRouter::new(args.shards)?;
    println!("{}", router.shard_for(&args.user_id));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_defaults() {
        let cli = Cli::try_parse_from(["shift-relay", "serve"]).unwrap();
        assert_eq!(cli.log_level, "info");
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(args.bind.port(), 5000);
        assert_eq!(args.max_attempts, 20);
        assert_eq!(args.retry_interval_ms, 300);
        assert_eq!(args.queue_name, DEFAULT_QUEUE_NAME);
        assert!(!args.shards.is_empty());
    }

    #[test]
    fn test_serve_repeated_and_comma_separated_shards() {
        let cli = Cli::try_parse_from([
            "shift-relay",
            "serve",
            "--shard",
            "sqlite://a.db,sqlite://b.db",
            "--shard",
            "sqlite://c.db",
        ])
        .unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(
            args.shards,
            vec!["sqlite://a.db", "sqlite://b.db", "sqlite://c.db"]
        );
    }

    #[test]
    fn test_retry_policy_from_args() {
        let cli = Cli::try_parse_from([
            "shift-relay",
            "serve",
            "--retry-interval-ms",
            "50",
            "--max-attempts",
            "0",
        ])
        .unwrap();
        let Commands::Serve(args) = cli.command else {
            panic!("expected serve");
        };
        let policy = args.retry_policy();
        assert_eq!(policy.interval, Duration::from_millis(50));
        assert_eq!(policy.max_attempts, 1);
    }

    #[test]
    fn test_global_log_level_after_subcommand() {
        let cli =
            Cli::try_parse_from(["shift-relay", "shard-of", "user-1", "--shards", "4", "-l", "debug"])
                .unwrap();
        assert_eq!(cli.log_level, "debug");
        assert!(matches!(cli.command, Commands::ShardOf(ref a) if a.shards == 4));
    }

    #[test]
    fn test_shard_of_rejects_zero() {
        let args = ShardOfArgs {
            user_id: "user-1".to_string(),
            shards: 0,
        };
        assert!(run_shard_of_command(args).is_err());
    }

    #[test]
    fn test_invalid_bind_is_rejected() {
        assert!(Cli::try_parse_from(["shift-relay", "serve", "--bind", "nope"]).is_err());
    }
}

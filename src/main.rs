//! Standalone executor allocator binary.
//!
//! Wires concrete collaborator implementations (an in-memory RM client
//! stand-in, a locality-aware placement strategy, a static rack table, a
//! logging launcher, a recording driver) and drives the reconciliation loop
//! on a fixed interval, the way a real application master embeds this
//! allocator behind its own RPC endpoints.

use anyhow::{Context, Result};
use clap::Parser;
use executor_allocator::allocator::Allocator;
use executor_allocator::blacklist_tracker::DefaultBlacklistTracker;
use executor_allocator::config::AllocatorConfig;
use executor_allocator::driver::RecordingDriver;
use executor_allocator::failure_tracker::FailureTracker;
use executor_allocator::launcher::{ExecutorLauncher, LaunchOutcome, LaunchRequest};
use executor_allocator::placement::LocalityAwarePlacementStrategy;
use executor_allocator::rack_resolver::StaticRackResolver;
use executor_allocator::request_store::InMemoryRequestStore;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "executor-allocator", version, about = "Reconciliation loop for executor containers")]
struct Cli {
    /// Optional TOML config file, layered under ALLOCATOR_* environment
    /// overrides.
    #[arg(long, env = "ALLOCATOR_CONFIG_FILE")]
    config_file: Option<String>,

    /// Application id reported to the resource manager and driver.
    #[arg(long, env = "ALLOCATOR_APP_ID", default_value = "app-0000")]
    app_id: String,

    /// Driver RPC endpoint launched workers connect back to.
    #[arg(long, env = "ALLOCATOR_DRIVER_URL", default_value = "driver://localhost:7077")]
    driver_url: String,

    /// Failure-tracker sliding window, seconds.
    #[arg(long, env = "ALLOCATOR_FAILURE_WINDOW_SECS", default_value_t = 60)]
    failure_window_secs: u64,

    /// Allocation failures on one host before it is self-blacklisted.
    #[arg(long, env = "ALLOCATOR_FAILURES_BEFORE_BLACKLIST", default_value_t = 2)]
    failures_before_blacklist: u32,

    /// Seconds between reconciliation steps.
    #[arg(long, env = "ALLOCATOR_POLL_INTERVAL_SECS", default_value_t = 5)]
    poll_interval_secs: u64,
}

/// Launcher stand-in: logs the launch request and reports success. A real
/// deployment replaces this with whatever forks/execs the worker process.
struct LoggingLauncher;

impl ExecutorLauncher for LoggingLauncher {
    fn launch(&self, request: &LaunchRequest) -> LaunchOutcome {
        info!(
            executor_id = %request.executor_id,
            host = %request.host,
            memory_mb = request.memory_mb,
            cores = request.cores,
            "launching executor"
        );
        LaunchOutcome::Success
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        )
        .with_target(true)
        .with_line_number(true)
        .init();

    info!("starting executor allocator");

    let config = AllocatorConfig::load(cli.config_file.as_deref())
        .context("failed to load allocator configuration")?;

    let request_store = InMemoryRequestStore::new();
    let rack_resolver = Arc::new(StaticRackResolver::new(HashMap::new(), "/default"));
    let placement_strategy = Arc::new(LocalityAwarePlacementStrategy::new(rack_resolver.clone()));
    let failure_tracker = Arc::new(FailureTracker::new(
        Duration::from_secs(cli.failure_window_secs),
        None,
    ));
    let blacklist_tracker = Arc::new(DefaultBlacklistTracker::new(cli.failures_before_blacklist));
    let launcher = Arc::new(LoggingLauncher);
    let driver = Arc::new(RecordingDriver::new(0));

    let allocator = Allocator::new(
        &config,
        cli.app_id,
        cli.driver_url,
        request_store,
        placement_strategy,
        rack_resolver,
        failure_tracker,
        blacklist_tracker,
        launcher,
        driver,
    )
    .context("failed to construct allocator")?;

    allocator.request_total(
        config.initial_executors,
        0,
        HashMap::new(),
        Default::default(),
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(cli.poll_interval_secs));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if let Err(e) = allocator.allocate() {
                    error!(error = %e, "reconciliation step failed");
                }
                info!(
                    running = allocator.num_executors_running(),
                    pending = allocator.num_containers_pending_allocate(),
                    failed = allocator.num_executors_failed(),
                    "reconciliation step complete"
                );
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown requested");
                allocator.stop();
                break;
            }
        }
    }

    Ok(())
}

// src/lib.rs

pub mod cli;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod monitor;
pub mod server;
pub mod watch;

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::cli::CliArgs;
use crate::errors::Result;
use crate::metrics::FileMetrics;
use crate::monitor::Monitor;

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - the metrics registry
/// - the monitor (watch registration, reconciler, pending-path retry)
/// - the HTTP exposition endpoint
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let config = args.monitor_config();

    let metrics = Arc::new(FileMetrics::new()?);

    // Validates the configuration (including the "no paths at all" case)
    // before anything is spawned.
    let monitor = Monitor::new(config, Arc::clone(&metrics))?;

    let cancel = CancellationToken::new();

    // Ctrl-C -> cancellation. Both monitor loops and the HTTP server stop on
    // the same token; there is no graceful drain of in-flight events.
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("shutdown signal received");
            cancel.cancel();
        });
    }

    let monitor_task = tokio::spawn(monitor.run(cancel.clone()));

    server::serve(
        &args.telemetry_addr,
        &args.telemetry_path,
        metrics,
        cancel.clone(),
    )
    .await?;

    cancel.cancel();
    let _ = monitor_task.await;

    Ok(())
}

//! Periodic retention sweep loop.
//!
//! Runs `run_sweep` on a fixed interval using `tokio::time::interval`.
//! The interval is deliberately short relative to the day-granular
//! retention dates -- re-running on an already-advanced process is a no-op.

use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use sgdea_engine::alerts::AlertEngine;
use sgdea_engine::process::RetentionService;
use sgdea_engine::sweep::run_sweep;

/// Default sweep cadence: every 5 minutes.
const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;

/// Run the sweep loop until `cancel` is triggered.
pub async fn run(service: RetentionService, alerts: AlertEngine, cancel: CancellationToken) {
    let interval_secs: u64 = std::env::var("SWEEP_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

    tracing::info!(interval_secs, "Retention sweep loop started");

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Retention sweep loop stopping");
                break;
            }
            _ = interval.tick() => {
                if let Err(e) = run_sweep(&service, &alerts, Utc::now()).await {
                    tracing::error!(error = %e, "Retention sweep pass failed");
                }
            }
        }
    }
}

//! Alert delivery loop: first delivery for pending alerts, then repeat
//! delivery for unattended critical alerts past their interval.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio_util::sync::CancellationToken;

use sgdea_engine::alerts::AlertEngine;
use sgdea_engine::boundary::NotificationDispatch;

/// Default delivery cadence: every 10 minutes.
const DEFAULT_DELIVERY_INTERVAL_SECS: u64 = 600;

/// Alerts handled per pass.
const DELIVERY_BATCH: i64 = 100;

/// Run the delivery loop until `cancel` is triggered.
pub async fn run(
    alerts: AlertEngine,
    dispatch: Arc<dyn NotificationDispatch>,
    cancel: CancellationToken,
) {
    let interval_secs: u64 = std::env::var("ALERT_DELIVERY_INTERVAL_SECS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_DELIVERY_INTERVAL_SECS);

    tracing::info!(interval_secs, "Alert delivery loop started");

    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Alert delivery loop stopping");
                break;
            }
            _ = interval.tick() => {
                match alerts.deliver_pending(dispatch.as_ref(), DELIVERY_BATCH).await {
                    Ok(sent) if sent > 0 => {
                        tracing::info!(sent, "Alert delivery: sent pending alerts");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Alert delivery: pending pass failed");
                    }
                }

                match alerts
                    .deliver_due_repeats(dispatch.as_ref(), Utc::now(), DELIVERY_BATCH)
                    .await
                {
                    Ok(repeated) if repeated > 0 => {
                        tracing::info!(repeated, "Alert delivery: repeated unattended alerts");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::error!(error = %e, "Alert delivery: repeat pass failed");
                    }
                }
            }
        }
    }
}

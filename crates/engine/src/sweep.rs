//! Periodic sweep over non-terminal retention processes.
//!
//! One pass evaluates every active, pre-alert, and deferred process:
//! automatic state advancement first, then alert generation against the
//! post-advance state. A failure on one process is logged and counted but
//! never aborts the pass.

use sgdea_core::retention::ProcessState;
use sgdea_core::types::Timestamp;

use sgdea_db::repositories::RetentionProcessRepo;

use crate::alerts::AlertEngine;
use crate::error::EngineResult;
use crate::process::RetentionService;

/// Rows fetched per keyset page.
const SWEEP_PAGE: i64 = 200;

/// Counters from one sweep pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub scanned: u32,
    pub advanced: u32,
    pub resumed: u32,
    pub alerts_created: u32,
    pub errors: u32,
}

/// Run one sweep pass as of `now`.
pub async fn run_sweep(
    service: &RetentionService,
    alerts: &AlertEngine,
    now: Timestamp,
) -> EngineResult<SweepReport> {
    let mut report = SweepReport::default();
    let mut after_id = 0;

    loop {
        let page =
            RetentionProcessRepo::list_sweepable_after(service.pool(), after_id, SWEEP_PAGE)
                .await?;
        if page.is_empty() {
            break;
        }

        for row in &page {
            after_id = row.id;
            report.scanned += 1;

            let current = match service.auto_advance(row.id, now).await {
                Ok(Some(updated)) => {
                    if row.state == ProcessState::Deferred.as_str() {
                        report.resumed += 1;
                    } else {
                        report.advanced += 1;
                    }
                    updated
                }
                Ok(None) => row.clone(),
                Err(err) => {
                    report.errors += 1;
                    tracing::error!(
                        process_id = row.id,
                        process_code = %row.process_code,
                        error = %err,
                        "Sweep: automatic advance failed"
                    );
                    continue;
                }
            };

            match alerts.generate_if_needed(&current, now).await {
                Ok(Some(generated)) if generated.is_new() => {
                    report.alerts_created += 1;
                }
                Ok(_) => {}
                Err(err) => {
                    report.errors += 1;
                    tracing::error!(
                        process_id = current.id,
                        process_code = %current.process_code,
                        error = %err,
                        "Sweep: alert generation failed"
                    );
                }
            }
        }
    }

    tracing::info!(
        scanned = report.scanned,
        advanced = report.advanced,
        resumed = report.resumed,
        alerts_created = report.alerts_created,
        errors = report.errors,
        "Retention sweep finished"
    );
    Ok(report)
}

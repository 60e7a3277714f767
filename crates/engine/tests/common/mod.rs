//! Shared fixtures for engine integration tests.

use std::sync::Arc;

use sqlx::PgPool;

use sgdea_core::retention::Subject;
use sgdea_core::types::CalendarDate;
use sgdea_db::models::retention_process::RetentionProcess;
use sgdea_engine::alerts::AlertEngine;
use sgdea_engine::boundary::UnresolvedSubjects;
use sgdea_engine::context::ActionContext;
use sgdea_engine::process::{CreateProcess, RetentionService};

pub fn service(pool: &PgPool) -> RetentionService {
    RetentionService::new(pool.clone())
}

pub fn alert_engine(pool: &PgPool) -> AlertEngine {
    AlertEngine::new(pool.clone(), Arc::new(UnresolvedSubjects))
}

pub fn ctx() -> ActionContext {
    ActionContext::user(7).with_request_info(
        Some("10.0.0.8".to_string()),
        Some("integration-test".to_string()),
    )
}

pub fn date(y: i32, m: u32, d: u32) -> CalendarDate {
    chrono::NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

/// Create a process with explicit lifecycle dates so tests control the
/// thresholds precisely.
pub async fn create_with_dates(
    service: &RetentionService,
    subject: Subject,
    management_expiry: CalendarDate,
    central_expiry: CalendarDate,
    pre_alert_on: CalendarDate,
) -> RetentionProcess {
    service
        .create(
            CreateProcess {
                subject,
                schedule_id: 1,
                series_id: 1,
                subseries_id: None,
                subject_created_on: date(2020, 1, 1),
                management_years: 5,
                central_years: 10,
                pre_alert_days: None,
                management_expiry: Some(management_expiry),
                central_expiry: Some(central_expiry),
                pre_alert_on: Some(pre_alert_on),
                alerts_active: true,
            },
            &ctx(),
        )
        .await
        .unwrap()
}

/// The worked reference schedule: created 2020-01-01, 5y management,
/// 10y central, 30-day pre-alert window.
pub async fn create_reference(service: &RetentionService, subject: Subject) -> RetentionProcess {
    create_with_dates(
        service,
        subject,
        date(2025, 1, 1),
        date(2035, 1, 1),
        date(2024, 12, 2),
    )
    .await
}

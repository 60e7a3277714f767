//! Integration tests for the retention process lifecycle: creation,
//! automatic advancement, deferral, disposition, suspension, the
//! elimination lock, and integrity verification.

mod common;

use assert_matches::assert_matches;
use chrono::{Duration, TimeZone, Utc};
use sqlx::PgPool;

use sgdea_core::error::CoreError;
use sgdea_core::retention::{DispositionAction, Subject};
use sgdea_db::models::audit_entry::AuditEntryQuery;
use sgdea_engine::audit_trail::AuditTrail;
use sgdea_engine::error::EngineError;
use sgdea_engine::process::{CreateProcess, DeferProcess};

use common::{create_reference, ctx, date, service};

// ---------------------------------------------------------------------------
// Creation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn creation_allocates_code_and_writes_audit(pool: PgPool) {
    let service = service(&pool);
    let row = create_reference(&service, Subject::Document(12)).await;

    // RET-<year>-<8-digit-seq>
    let parts: Vec<&str> = row.process_code.split('-').collect();
    assert_eq!(parts.len(), 3);
    assert_eq!(parts[0], "RET");
    assert_eq!(parts[1].len(), 4);
    assert_eq!(parts[2].len(), 8);

    assert_eq!(row.state, "active");
    assert!(service.verify_integrity(row.id).await.unwrap());

    let page = AuditTrail::query(
        &pool,
        &AuditEntryQuery {
            process_id: Some(row.id),
            action_type: Some("creation".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].new_state.as_deref(), Some("active"));
    assert!(AuditTrail::verify(&page.items[0]));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn creation_codes_are_sequential(pool: PgPool) {
    let service = service(&pool);
    let first = create_reference(&service, Subject::Document(1)).await;
    let second = create_reference(&service, Subject::Document(2)).await;

    let seq = |code: &str| -> i64 { code.rsplit('-').next().unwrap().parse().unwrap() };
    assert_eq!(seq(&second.process_code), seq(&first.process_code) + 1);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn creation_derives_dates_when_absent(pool: PgPool) {
    let service = service(&pool);
    let row = service
        .create(
            CreateProcess {
                subject: Subject::CaseFile(3),
                schedule_id: 1,
                series_id: 1,
                subseries_id: None,
                subject_created_on: date(2020, 1, 1),
                management_years: 5,
                central_years: 10,
                pre_alert_days: Some(30),
                management_expiry: None,
                central_expiry: None,
                pre_alert_on: None,
                alerts_active: true,
            },
            &ctx(),
        )
        .await
        .unwrap();

    assert_eq!(row.management_expiry, Some(date(2025, 1, 1)));
    assert_eq!(row.central_expiry, Some(date(2035, 1, 1)));
    assert_eq!(row.pre_alert_on, Some(date(2024, 12, 2)));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn creation_rejects_negative_years(pool: PgPool) {
    let service = service(&pool);
    let result = service
        .create(
            CreateProcess {
                subject: Subject::Document(4),
                schedule_id: 1,
                series_id: 1,
                subseries_id: None,
                subject_created_on: date(2020, 1, 1),
                management_years: -1,
                central_years: 10,
                pre_alert_days: None,
                management_expiry: None,
                central_expiry: None,
                pre_alert_on: None,
                alerts_active: true,
            },
            &ctx(),
        )
        .await;
    assert_matches!(result, Err(EngineError::Core(CoreError::Validation(_))));
}

// ---------------------------------------------------------------------------
// Automatic advancement
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn advance_to_pre_alert_writes_one_entry(pool: PgPool) {
    let service = service(&pool);
    let row = create_reference(&service, Subject::Document(12)).await;

    // Past the pre-alert date, before management expiry.
    let now = Utc.with_ymd_and_hms(2024, 12, 15, 8, 0, 0).unwrap();
    let updated = service.auto_advance(row.id, now).await.unwrap().unwrap();
    assert_eq!(updated.state, "pre_alert");

    let page = AuditTrail::query(
        &pool,
        &AuditEntryQuery {
            process_id: Some(row.id),
            action_type: Some("automatic_state_change".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].prior_state.as_deref(), Some("active"));
    assert_eq!(page.items[0].new_state.as_deref(), Some("pre_alert"));

    // Hash tracks the new state.
    assert!(service.verify_integrity(row.id).await.unwrap());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn advance_is_idempotent_and_silent_when_noop(pool: PgPool) {
    let service = service(&pool);
    let row = create_reference(&service, Subject::Document(12)).await;
    let now = Utc.with_ymd_and_hms(2024, 12, 15, 8, 0, 0).unwrap();

    service.auto_advance(row.id, now).await.unwrap().unwrap();
    // Same clock again: no transition, no audit entry.
    assert!(service.auto_advance(row.id, now).await.unwrap().is_none());

    let page = AuditTrail::query(
        &pool,
        &AuditEntryQuery {
            process_id: Some(row.id),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    // creation + one automatic change, nothing else.
    assert_eq!(page.total, 2);
}

#[sqlx::test(migrations = "../db/migrations")]
async fn advance_jumps_straight_to_expired(pool: PgPool) {
    let service = service(&pool);
    let row = create_reference(&service, Subject::Document(12)).await;

    let now = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap();
    let updated = service.auto_advance(row.id, now).await.unwrap().unwrap();
    assert_eq!(updated.state, "expired");
}

// ---------------------------------------------------------------------------
// Deferral
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn deferral_and_resume_round_trip(pool: PgPool) {
    let service = service(&pool);
    let row = create_reference(&service, Subject::Document(12)).await;

    let deferral_end = Utc::now() + Duration::hours(1);
    let deferred = service
        .defer(
            row.id,
            DeferProcess {
                deferral_end,
                reason: "pending legal review".to_string(),
            },
            &ctx(),
        )
        .await
        .unwrap();
    assert_eq!(deferred.state, "deferred");
    assert!(deferred.deferred);
    assert_eq!(deferred.deferral_user_id, Some(7));
    assert_eq!(deferred.deferral_reason.as_deref(), Some("pending legal review"));

    // Sweep before the window closes: nothing happens.
    assert!(service.auto_advance(row.id, Utc::now()).await.unwrap().is_none());

    // Sweep after: reverts to active with the deferral cleared.
    let resumed = service
        .auto_advance(row.id, Utc::now() + Duration::hours(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(resumed.state, "active");
    assert!(!resumed.deferred);
    assert!(resumed.deferral_end.is_none());
    assert!(resumed.deferral_reason.is_none());

    assert!(service.verify_integrity(row.id).await.unwrap());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn deferral_requires_future_end_and_reason(pool: PgPool) {
    let service = service(&pool);
    let row = create_reference(&service, Subject::Document(12)).await;

    let past = service
        .defer(
            row.id,
            DeferProcess {
                deferral_end: Utc::now() - Duration::hours(1),
                reason: "late".to_string(),
            },
            &ctx(),
        )
        .await;
    assert_matches!(past, Err(EngineError::Core(CoreError::Validation(_))));

    let empty = service
        .defer(
            row.id,
            DeferProcess {
                deferral_end: Utc::now() + Duration::hours(1),
                reason: String::new(),
            },
            &ctx(),
        )
        .await;
    assert_matches!(empty, Err(EngineError::Core(CoreError::Validation(_))));
}

// ---------------------------------------------------------------------------
// Disposition
// ---------------------------------------------------------------------------

async fn expired_process(service: &sgdea_engine::process::RetentionService) -> i64 {
    let row = create_reference(service, Subject::Document(12)).await;
    let now = Utc.with_ymd_and_hms(2025, 2, 1, 8, 0, 0).unwrap();
    let updated = service.auto_advance(row.id, now).await.unwrap().unwrap();
    assert_eq!(updated.state, "expired");
    row.id
}

#[sqlx::test(migrations = "../db/migrations")]
async fn conservation_lands_in_conserved(pool: PgPool) {
    let service = service(&pool);
    let id = expired_process(&service).await;

    let updated = service
        .execute_disposition(id, DispositionAction::ConservationPermanent, &ctx())
        .await
        .unwrap();
    assert_eq!(updated.state, "conserved");
    assert_eq!(
        updated.disposition_action.as_deref(),
        Some("conservation_permanent")
    );
    assert!(updated.disposition_executed_at.is_some());
    assert_eq!(updated.disposition_user_id, Some(7));

    let page = AuditTrail::query(
        &pool,
        &AuditEntryQuery {
            process_id: Some(id),
            action_type: Some("disposition_executed".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.items[0].new_state.as_deref(), Some("conserved"));
}

#[sqlx::test(migrations = "../db/migrations")]
async fn elimination_while_blocked_changes_nothing(pool: PgPool) {
    let service = service(&pool);
    let id = expired_process(&service).await;
    service
        .block_elimination(id, "declared of historical value", &ctx())
        .await
        .unwrap();

    let result = service
        .execute_disposition(id, DispositionAction::Elimination, &ctx())
        .await;
    assert_matches!(result, Err(EngineError::Core(CoreError::Guard(_))));

    // State unchanged, and no disposition entry was written.
    let row = sgdea_db::repositories::RetentionProcessRepo::find_by_id(&pool, id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.state, "expired");
    assert!(row.disposition_action.is_none());

    let page = AuditTrail::query(
        &pool,
        &AuditEntryQuery {
            process_id: Some(id),
            action_type: Some("disposition_executed".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page.total, 0);

    // After unblocking, elimination goes through.
    service.unblock_elimination(id, &ctx()).await.unwrap();
    let updated = service
        .execute_disposition(id, DispositionAction::Elimination, &ctx())
        .await
        .unwrap();
    assert_eq!(updated.state, "eliminated");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn disposition_from_active_is_a_guard_violation(pool: PgPool) {
    let service = service(&pool);
    let row = create_reference(&service, Subject::Document(12)).await;

    let result = service
        .execute_disposition(row.id, DispositionAction::TransferHistorical, &ctx())
        .await;
    assert_matches!(result, Err(EngineError::Core(CoreError::Guard(_))));

    let reread = sgdea_db::repositories::RetentionProcessRepo::find_by_id(&pool, row.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reread.state, "active");
}

#[sqlx::test(migrations = "../db/migrations")]
async fn disposition_allowed_from_in_disposition(pool: PgPool) {
    let service = service(&pool);
    let id = expired_process(&service).await;

    let staged = service.begin_disposition(id, &ctx()).await.unwrap();
    assert_eq!(staged.state, "in_disposition");

    let updated = service
        .execute_disposition(id, DispositionAction::TransferHistorical, &ctx())
        .await
        .unwrap();
    assert_eq!(updated.state, "transferred");
}

// ---------------------------------------------------------------------------
// Suspension
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn suspend_and_reactivate(pool: PgPool) {
    let service = service(&pool);
    let row = create_reference(&service, Subject::Document(12)).await;

    let suspended = service
        .suspend(row.id, "records review", &ctx())
        .await
        .unwrap();
    assert_eq!(suspended.state, "suspended");

    // Suspended processes are parked: automatic advance ignores them.
    let far_future = Utc.with_ymd_and_hms(2040, 1, 1, 0, 0, 0).unwrap();
    assert!(service.auto_advance(row.id, far_future).await.unwrap().is_none());

    let reactivated = service.reactivate(row.id, &ctx()).await.unwrap();
    assert_eq!(reactivated.state, "active");
}

// ---------------------------------------------------------------------------
// Integrity and deletion
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn out_of_band_edit_is_detected(pool: PgPool) {
    let service = service(&pool);
    let row = create_reference(&service, Subject::Document(12)).await;
    assert!(service.verify_integrity(row.id).await.unwrap());

    // Tamper behind the engine's back: the stored hash no longer matches.
    sqlx::query("UPDATE retention_processes SET state = 'eliminated' WHERE id = $1")
        .bind(row.id)
        .execute(&pool)
        .await
        .unwrap();

    assert!(!service.verify_integrity(row.id).await.unwrap());
}

#[sqlx::test(migrations = "../db/migrations")]
async fn soft_delete_hides_and_audits(pool: PgPool) {
    let service = service(&pool);
    let row = create_reference(&service, Subject::Document(12)).await;

    service.soft_delete(row.id, &ctx()).await.unwrap();

    assert!(
        sgdea_db::repositories::RetentionProcessRepo::find_by_id(&pool, row.id)
            .await
            .unwrap()
            .is_none()
    );

    let page = AuditTrail::query(
        &pool,
        &AuditEntryQuery {
            process_id: Some(row.id),
            action_type: Some("soft_delete".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page.total, 1);

    // Operations on a deleted process report NotFound.
    let result = service.suspend(row.id, "too late", &ctx()).await;
    assert_matches!(result, Err(EngineError::Core(CoreError::NotFound { .. })));
}

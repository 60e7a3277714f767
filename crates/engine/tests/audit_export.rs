//! Integration tests for the audit trail query surface, ledger
//! verification, and compliance export.

mod common;

use chrono::{Duration, Utc};
use sqlx::PgPool;

use sgdea_core::retention::Subject;
use sgdea_db::models::audit_entry::AuditEntryQuery;
use sgdea_db::repositories::AuditEntryRepo;
use sgdea_engine::audit_trail::{export_csv, export_json, export_xml, AuditTrail};

use common::{create_reference, ctx, service};

/// A process with a short audited history: creation, block, unblock.
async fn seeded_process(pool: &PgPool) -> i64 {
    let service = service(pool);
    let row = create_reference(&service, Subject::Document(12)).await;
    service
        .block_elimination(row.id, "historical value assessment", &ctx())
        .await
        .unwrap();
    service.unblock_elimination(row.id, &ctx()).await.unwrap();
    row.id
}

// ---------------------------------------------------------------------------
// Query surface
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn query_filters_by_action_actor_and_range(pool: PgPool) {
    let id = seeded_process(&pool).await;

    let all = AuditTrail::query(
        &pool,
        &AuditEntryQuery {
            process_id: Some(id),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(all.total, 3);

    let blocks = AuditTrail::query(
        &pool,
        &AuditEntryQuery {
            process_id: Some(id),
            action_type: Some("elimination_blocked".to_string()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(blocks.total, 1);

    let by_actor = AuditTrail::query(
        &pool,
        &AuditEntryQuery {
            actor_id: Some(7),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(by_actor.total, 3);

    let outside_range = AuditTrail::query(
        &pool,
        &AuditEntryQuery {
            process_id: Some(id),
            to: Some(Utc::now() - Duration::days(1)),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(outside_range.total, 0);

    // Pagination honours limit while total counts everything.
    let page = AuditTrail::query(
        &pool,
        &AuditEntryQuery {
            process_id: Some(id),
            limit: Some(2),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.total, 3);
}

// ---------------------------------------------------------------------------
// Ledger verification
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn freshly_written_ledger_verifies(pool: PgPool) {
    let id = seeded_process(&pool).await;

    let verification = AuditTrail::verify_process_ledger(&pool, id).await.unwrap();
    assert_eq!(verification.verified, 3);
    assert!(verification.valid);
    assert!(verification.first_mismatch.is_none());
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../db/migrations")]
async fn exports_preserve_every_field(pool: PgPool) {
    let id = seeded_process(&pool).await;

    let entries = AuditEntryRepo::export_range(
        &pool,
        Utc::now() - Duration::hours(1),
        Utc::now() + Duration::hours(1),
    )
    .await
    .unwrap();
    assert_eq!(entries.len(), 3);

    let csv = export_csv(&entries);
    assert_eq!(csv.lines().count(), 4); // header + 3 rows
    for entry in &entries {
        assert!(csv.contains(&entry.integrity_hash));
    }

    let xml = export_xml(&entries);
    assert!(xml.starts_with("<?xml"));
    assert_eq!(xml.matches("<entry>").count(), 3);
    assert!(xml.contains("<integrity-hash>"));

    let json = export_json(&entries).unwrap();
    let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed.as_array().unwrap().len(), 3);
    assert_eq!(parsed[0]["action_type"], "creation");
    assert_eq!(parsed[0]["integrity_hash"], entries[0].integrity_hash);
    assert_eq!(parsed[0]["ip_address"], "10.0.0.8");
}

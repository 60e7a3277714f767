//! Repository for the `retention_processes` table and its code counters.

use sqlx::{PgConnection, PgPool};

use sgdea_core::types::DbId;

use crate::models::retention_process::{NewRetentionProcess, ProcessMutation, RetentionProcess};

/// Column list for `retention_processes` SELECT queries.
const COLUMNS: &str = "\
    id, process_code, subject_type, document_id, case_file_id, \
    schedule_id, series_id, subseries_id, subject_created_on, \
    management_years, central_years, management_expiry, central_expiry, \
    pre_alert_on, state, deferred, deferral_start, deferral_end, \
    deferral_reason, deferral_user_id, disposition_action, \
    disposition_executed_at, disposition_user_id, elimination_blocked, \
    elimination_block_reason, alerts_active, integrity_hash, \
    created_at, updated_at, deleted_at";

/// States the periodic sweep scans.
const SWEEPABLE_STATES: &[&str] = &["active", "pre_alert", "deferred"];

/// Provides query and mutation operations for retention processes.
pub struct RetentionProcessRepo;

impl RetentionProcessRepo {
    /// Allocate the next per-year sequence number for a process code.
    ///
    /// Upsert on the year row: concurrent creates serialize on the row
    /// lock, so sequences are gap-free within the transaction's commit
    /// order.
    pub async fn next_code_seq(conn: &mut PgConnection, year: i32) -> Result<i64, sqlx::Error> {
        sqlx::query_scalar(
            "INSERT INTO process_code_counters (year, last_seq) VALUES ($1, 1) \
             ON CONFLICT (year) DO UPDATE \
             SET last_seq = process_code_counters.last_seq + 1 \
             RETURNING last_seq",
        )
        .bind(year)
        .fetch_one(conn)
        .await
    }

    /// Insert a new process row.
    pub async fn insert(
        conn: &mut PgConnection,
        dto: &NewRetentionProcess,
    ) -> Result<RetentionProcess, sqlx::Error> {
        let query = format!(
            "INSERT INTO retention_processes (\
                process_code, subject_type, document_id, case_file_id, \
                schedule_id, series_id, subseries_id, subject_created_on, \
                management_years, central_years, management_expiry, \
                central_expiry, pre_alert_on, state, alerts_active, \
                integrity_hash) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RetentionProcess>(&query)
            .bind(&dto.process_code)
            .bind(&dto.subject_type)
            .bind(dto.document_id)
            .bind(dto.case_file_id)
            .bind(dto.schedule_id)
            .bind(dto.series_id)
            .bind(dto.subseries_id)
            .bind(dto.subject_created_on)
            .bind(dto.management_years)
            .bind(dto.central_years)
            .bind(dto.management_expiry)
            .bind(dto.central_expiry)
            .bind(dto.pre_alert_on)
            .bind(&dto.state)
            .bind(dto.alerts_active)
            .bind(&dto.integrity_hash)
            .fetch_one(conn)
            .await
    }

    /// Find a process by id, excluding soft-deleted rows.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<RetentionProcess>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM retention_processes \
             WHERE id = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, RetentionProcess>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a process by its code, excluding soft-deleted rows.
    pub async fn find_by_code(
        pool: &PgPool,
        code: &str,
    ) -> Result<Option<RetentionProcess>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM retention_processes \
             WHERE process_code = $1 AND deleted_at IS NULL"
        );
        sqlx::query_as::<_, RetentionProcess>(&query)
            .bind(code)
            .fetch_optional(pool)
            .await
    }

    /// Load a process row with `FOR UPDATE`, blocking concurrent writers.
    ///
    /// Every state-mutating operation goes through this inside its
    /// transaction -- at most one writer per process at a time.
    pub async fn lock_by_id(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<RetentionProcess>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM retention_processes \
             WHERE id = $1 AND deleted_at IS NULL \
             FOR UPDATE"
        );
        sqlx::query_as::<_, RetentionProcess>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Page through processes the periodic sweep must evaluate
    /// (active, pre-alert, deferred; not soft-deleted).
    ///
    /// Keyset pagination on `id`: rows advanced out of the sweepable set
    /// mid-sweep cannot shift later pages the way OFFSET paging would.
    pub async fn list_sweepable_after(
        pool: &PgPool,
        after_id: DbId,
        limit: i64,
    ) -> Result<Vec<RetentionProcess>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM retention_processes \
             WHERE id > $1 AND state = ANY($2) AND deleted_at IS NULL \
             ORDER BY id ASC \
             LIMIT $3"
        );
        sqlx::query_as::<_, RetentionProcess>(&query)
            .bind(after_id)
            .bind(SWEEPABLE_STATES)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Write back the full mutable column set plus `updated_at`.
    pub async fn apply_mutation(
        conn: &mut PgConnection,
        id: DbId,
        mutation: &ProcessMutation,
    ) -> Result<RetentionProcess, sqlx::Error> {
        let query = format!(
            "UPDATE retention_processes SET \
                state = $2, deferred = $3, deferral_start = $4, \
                deferral_end = $5, deferral_reason = $6, deferral_user_id = $7, \
                disposition_action = $8, disposition_executed_at = $9, \
                disposition_user_id = $10, elimination_blocked = $11, \
                elimination_block_reason = $12, alerts_active = $13, \
                integrity_hash = $14, updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RetentionProcess>(&query)
            .bind(id)
            .bind(&mutation.state)
            .bind(mutation.deferred)
            .bind(mutation.deferral_start)
            .bind(mutation.deferral_end)
            .bind(&mutation.deferral_reason)
            .bind(mutation.deferral_user_id)
            .bind(&mutation.disposition_action)
            .bind(mutation.disposition_executed_at)
            .bind(mutation.disposition_user_id)
            .bind(mutation.elimination_blocked)
            .bind(&mutation.elimination_block_reason)
            .bind(mutation.alerts_active)
            .bind(&mutation.integrity_hash)
            .fetch_one(conn)
            .await
    }

    /// Soft-delete a process. Returns `false` if it was already deleted
    /// or does not exist.
    pub async fn soft_delete(conn: &mut PgConnection, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE retention_processes \
             SET deleted_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

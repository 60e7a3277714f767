//! Repository for the `retention_alerts` table.

use sqlx::{PgConnection, PgPool};

use sgdea_core::types::{DbId, Timestamp};

use crate::models::alert::{NewRetentionAlert, RetentionAlert};

/// Column list for `retention_alerts` queries.
const COLUMNS: &str = "\
    id, process_id, alert_type, priority, title, message, due_on, \
    recipient_user_ids, recipient_roles, channels, state, sent_at, \
    read_at, attended_at, repeat_until_attended, repeat_interval_hours, \
    max_repeats, repeats_sent, created_at";

/// Provides CRUD operations for retention alerts.
pub struct AlertRepo;

impl AlertRepo {
    /// Insert a new alert in `pending` state.
    ///
    /// Collides with `uq_retention_alerts_daily` when an alert of the same
    /// type was already created for the process today -- callers treat that
    /// unique violation as "duplicate, fetch the existing one".
    pub async fn insert(
        conn: &mut PgConnection,
        dto: &NewRetentionAlert,
    ) -> Result<RetentionAlert, sqlx::Error> {
        let query = format!(
            "INSERT INTO retention_alerts (\
                process_id, alert_type, priority, title, message, due_on, \
                recipient_user_ids, recipient_roles, channels, \
                repeat_until_attended, repeat_interval_hours, max_repeats) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RetentionAlert>(&query)
            .bind(dto.process_id)
            .bind(&dto.alert_type)
            .bind(&dto.priority)
            .bind(&dto.title)
            .bind(&dto.message)
            .bind(dto.due_on)
            .bind(&dto.recipient_user_ids)
            .bind(&dto.recipient_roles)
            .bind(&dto.channels)
            .bind(dto.repeat_until_attended)
            .bind(dto.repeat_interval_hours)
            .bind(dto.max_repeats)
            .fetch_one(conn)
            .await
    }

    /// Find an alert by id.
    pub async fn find_by_id(
        pool: &PgPool,
        id: DbId,
    ) -> Result<Option<RetentionAlert>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM retention_alerts WHERE id = $1");
        sqlx::query_as::<_, RetentionAlert>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Most recent alert of a given type for a process created at or after
    /// `since` -- the de-dup window lookup.
    pub async fn find_recent_same_type(
        pool: &PgPool,
        process_id: DbId,
        alert_type: &str,
        since: Timestamp,
    ) -> Result<Option<RetentionAlert>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM retention_alerts \
             WHERE process_id = $1 AND alert_type = $2 AND created_at >= $3 \
             ORDER BY created_at DESC \
             LIMIT 1"
        );
        sqlx::query_as::<_, RetentionAlert>(&query)
            .bind(process_id)
            .bind(alert_type)
            .bind(since)
            .fetch_optional(pool)
            .await
    }

    /// List alerts for a process, newest first.
    pub async fn list_for_process(
        pool: &PgPool,
        process_id: DbId,
    ) -> Result<Vec<RetentionAlert>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM retention_alerts \
             WHERE process_id = $1 \
             ORDER BY created_at DESC"
        );
        sqlx::query_as::<_, RetentionAlert>(&query)
            .bind(process_id)
            .fetch_all(pool)
            .await
    }

    /// List pending alerts awaiting first delivery.
    pub async fn list_pending(pool: &PgPool, limit: i64) -> Result<Vec<RetentionAlert>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM retention_alerts \
             WHERE state = 'pending' \
             ORDER BY created_at ASC \
             LIMIT $1"
        );
        sqlx::query_as::<_, RetentionAlert>(&query)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Candidates for a repeat delivery pass: sent, repeating, under the
    /// cap, and past the repeat interval as of `now`.
    pub async fn list_repeat_due(
        pool: &PgPool,
        now: Timestamp,
        limit: i64,
    ) -> Result<Vec<RetentionAlert>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM retention_alerts \
             WHERE state = 'sent' \
               AND repeat_until_attended \
               AND repeats_sent < max_repeats \
               AND sent_at IS NOT NULL \
               AND sent_at + make_interval(hours => repeat_interval_hours) <= $1 \
             ORDER BY sent_at ASC \
             LIMIT $2"
        );
        sqlx::query_as::<_, RetentionAlert>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Transition `pending -> sent`, stamping `sent_at`.
    ///
    /// Guarded by the expected prior state in the WHERE clause so a racing
    /// transition loses cleanly (returns `None`).
    pub async fn mark_sent(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<RetentionAlert>, sqlx::Error> {
        let query = format!(
            "UPDATE retention_alerts \
             SET state = 'sent', sent_at = NOW() \
             WHERE id = $1 AND state = 'pending' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RetentionAlert>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Transition `sent -> read`, stamping `read_at`.
    pub async fn mark_read(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<RetentionAlert>, sqlx::Error> {
        let query = format!(
            "UPDATE retention_alerts \
             SET state = 'read', read_at = NOW() \
             WHERE id = $1 AND state = 'sent' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RetentionAlert>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Transition `read -> attended`, stamping `attended_at`.
    pub async fn mark_attended(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<RetentionAlert>, sqlx::Error> {
        let query = format!(
            "UPDATE retention_alerts \
             SET state = 'attended', attended_at = NOW() \
             WHERE id = $1 AND state = 'read' \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RetentionAlert>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Transition `pending|sent -> dismissed`.
    pub async fn dismiss(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<RetentionAlert>, sqlx::Error> {
        let query = format!(
            "UPDATE retention_alerts \
             SET state = 'dismissed' \
             WHERE id = $1 AND state IN ('pending', 'sent') \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RetentionAlert>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }

    /// Register one repeat delivery: bump the counter and refresh
    /// `sent_at`, staying in `sent`.
    ///
    /// The cap is re-checked here so two racing delivery sweeps cannot
    /// push `repeats_sent` past `max_repeats`.
    pub async fn register_repeat(
        conn: &mut PgConnection,
        id: DbId,
    ) -> Result<Option<RetentionAlert>, sqlx::Error> {
        let query = format!(
            "UPDATE retention_alerts \
             SET repeats_sent = repeats_sent + 1, sent_at = NOW() \
             WHERE id = $1 AND state = 'sent' AND repeats_sent < max_repeats \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, RetentionAlert>(&query)
            .bind(id)
            .fetch_optional(conn)
            .await
    }
}

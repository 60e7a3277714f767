//! Repository for the `audit_entries` ledger.
//!
//! Deliberately append-only: there are no update or delete methods here,
//! and the schema triggers reject UPDATE/DELETE issued from anywhere else.

use sqlx::{PgConnection, PgPool};

use sgdea_core::types::{DbId, Timestamp};

use crate::models::audit_entry::{AuditEntry, AuditEntryQuery, NewAuditEntry};

// ---------------------------------------------------------------------------
// Column lists
// ---------------------------------------------------------------------------

/// Column list for `audit_entries` SELECT queries.
const COLUMNS: &str = "\
    id, process_id, action_type, prior_state, new_state, description, \
    details, occurred_at, actor_id, ip_address, user_agent, \
    integrity_hash, created_at";

/// Column list for INSERT (excludes auto-generated `id`, `created_at`).
const INSERT_COLUMNS: &str = "\
    process_id, action_type, prior_state, new_state, description, \
    details, occurred_at, actor_id, ip_address, user_agent, integrity_hash";

// ---------------------------------------------------------------------------
// AuditEntryRepo
// ---------------------------------------------------------------------------

/// Provides append and query operations for audit entries.
pub struct AuditEntryRepo;

impl AuditEntryRepo {
    /// Append one entry inside the caller's transaction.
    pub async fn insert(
        conn: &mut PgConnection,
        dto: &NewAuditEntry,
    ) -> Result<AuditEntry, sqlx::Error> {
        let query = format!(
            "INSERT INTO audit_entries ({INSERT_COLUMNS}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, AuditEntry>(&query)
            .bind(dto.process_id)
            .bind(&dto.action_type)
            .bind(&dto.prior_state)
            .bind(&dto.new_state)
            .bind(&dto.description)
            .bind(&dto.details)
            .bind(dto.occurred_at)
            .bind(dto.actor_id)
            .bind(&dto.ip_address)
            .bind(&dto.user_agent)
            .bind(&dto.integrity_hash)
            .fetch_one(conn)
            .await
    }

    /// Find a single entry by id.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<AuditEntry>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM audit_entries WHERE id = $1");
        sqlx::query_as::<_, AuditEntry>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Query entries with filtering and pagination, newest first.
    pub async fn query(
        pool: &PgPool,
        params: &AuditEntryQuery,
    ) -> Result<Vec<AuditEntry>, sqlx::Error> {
        let limit = params.limit.unwrap_or(50).min(500);
        let offset = params.offset.unwrap_or(0);

        let (where_clause, bind_values, bind_idx) = build_filter(params);

        let query = format!(
            "SELECT {COLUMNS} FROM audit_entries {where_clause} \
             ORDER BY occurred_at DESC \
             LIMIT ${bind_idx} OFFSET ${}",
            bind_idx + 1
        );

        let q = bind_values_as(sqlx::query_as::<_, AuditEntry>(&query), &bind_values);
        q.bind(limit).bind(offset).fetch_all(pool).await
    }

    /// Count entries matching the given filter (for pagination metadata).
    pub async fn count(pool: &PgPool, params: &AuditEntryQuery) -> Result<i64, sqlx::Error> {
        let (where_clause, bind_values, _) = build_filter(params);

        let query = format!("SELECT COUNT(*)::BIGINT FROM audit_entries {where_clause}");

        let q = bind_values_scalar(sqlx::query_scalar::<_, i64>(&query), &bind_values);
        q.fetch_one(pool).await
    }

    /// Export all entries within a time range, oldest first.
    pub async fn export_range(
        pool: &PgPool,
        from: Timestamp,
        to: Timestamp,
    ) -> Result<Vec<AuditEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_entries \
             WHERE occurred_at >= $1 AND occurred_at <= $2 \
             ORDER BY occurred_at ASC"
        );
        sqlx::query_as::<_, AuditEntry>(&query)
            .bind(from)
            .bind(to)
            .fetch_all(pool)
            .await
    }

    /// Fetch entries for a process in id order, for verification passes.
    pub async fn list_for_process(
        pool: &PgPool,
        process_id: DbId,
    ) -> Result<Vec<AuditEntry>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM audit_entries \
             WHERE process_id = $1 \
             ORDER BY id ASC"
        );
        sqlx::query_as::<_, AuditEntry>(&query)
            .bind(process_id)
            .fetch_all(pool)
            .await
    }
}

// ---------------------------------------------------------------------------
// Internal helpers for dynamic query building
// ---------------------------------------------------------------------------

/// Typed bind value for dynamically-built ledger queries.
enum BindValue {
    BigInt(i64),
    Text(String),
    Timestamp(Timestamp),
}

/// Build a WHERE clause and bind values from the filter parameters.
///
/// Returns `(where_clause, bind_values, next_bind_index)`. The clause is
/// empty when no filters are active, or starts with `WHERE `.
fn build_filter(params: &AuditEntryQuery) -> (String, Vec<BindValue>, u32) {
    let mut conditions: Vec<String> = Vec::new();
    let mut bind_idx = 1u32;
    let mut bind_values: Vec<BindValue> = Vec::new();

    if let Some(process_id) = params.process_id {
        conditions.push(format!("process_id = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::BigInt(process_id));
    }

    if let Some(actor_id) = params.actor_id {
        conditions.push(format!("actor_id = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::BigInt(actor_id));
    }

    if let Some(ref action_type) = params.action_type {
        conditions.push(format!("action_type = ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Text(action_type.clone()));
    }

    if let Some(from) = params.from {
        conditions.push(format!("occurred_at >= ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Timestamp(from));
    }

    if let Some(to) = params.to {
        conditions.push(format!("occurred_at <= ${bind_idx}"));
        bind_idx += 1;
        bind_values.push(BindValue::Timestamp(to));
    }

    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };

    (where_clause, bind_values, bind_idx)
}

/// Bind a slice of `BindValue` to a sqlx `QueryAs`.
fn bind_values_as<'q, O>(
    mut q: sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments>,
    bind_values: &'q [BindValue],
) -> sqlx::query::QueryAs<'q, sqlx::Postgres, O, sqlx::postgres::PgArguments> {
    for val in bind_values {
        match val {
            BindValue::BigInt(v) => q = q.bind(*v),
            BindValue::Text(v) => q = q.bind(v.as_str()),
            BindValue::Timestamp(v) => q = q.bind(*v),
        }
    }
    q
}

/// Bind a slice of `BindValue` to a sqlx `QueryScalar`.
fn bind_values_scalar<'q>(
    mut q: sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments>,
    bind_values: &'q [BindValue],
) -> sqlx::query::QueryScalar<'q, sqlx::Postgres, i64, sqlx::postgres::PgArguments> {
    for val in bind_values {
        match val {
            BindValue::BigInt(v) => q = q.bind(*v),
            BindValue::Text(v) => q = q.bind(v.as_str()),
            BindValue::Timestamp(v) => q = q.bind(*v),
        }
    }
    q
}

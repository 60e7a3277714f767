//! Audit ledger entity model and DTOs.
//!
//! Entries are immutable once created -- there is no update DTO and no
//! `updated_at` column, and the schema-level triggers reject UPDATE/DELETE.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use sgdea_core::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A single audit entry. Immutable once created.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct AuditEntry {
    pub id: DbId,
    pub process_id: Option<DbId>,
    pub action_type: String,
    pub prior_state: Option<String>,
    pub new_state: Option<String>,
    pub description: String,
    pub details: Option<serde_json::Value>,
    pub occurred_at: Timestamp,
    pub actor_id: Option<DbId>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub integrity_hash: String,
    pub created_at: Timestamp,
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// DTO for appending a new audit entry. The hash is computed by the caller
/// (engine) over the canonical field set before insert.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAuditEntry {
    pub process_id: Option<DbId>,
    pub action_type: String,
    pub prior_state: Option<String>,
    pub new_state: Option<String>,
    pub description: String,
    pub details: Option<serde_json::Value>,
    pub occurred_at: Timestamp,
    pub actor_id: Option<DbId>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub integrity_hash: String,
}

// ---------------------------------------------------------------------------
// Query parameters
// ---------------------------------------------------------------------------

/// Filter parameters for querying the ledger.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuditEntryQuery {
    pub process_id: Option<DbId>,
    pub actor_id: Option<DbId>,
    pub action_type: Option<String>,
    pub from: Option<Timestamp>,
    pub to: Option<Timestamp>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Paginated response for ledger queries.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntryPage {
    pub items: Vec<AuditEntry>,
    pub total: i64,
}

/// Result of a ranged ledger verification pass.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerVerification {
    /// Number of entries whose hash was recomputed.
    pub verified: i64,
    /// Whether every entry matched its stored hash.
    pub valid: bool,
    /// ID of the first mismatching entry, if any.
    pub first_mismatch: Option<DbId>,
}

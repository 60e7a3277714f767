//! Audit ledger constants and entry-hash computation.
//!
//! One structured entry is appended per logical transition; the action type
//! is the tag and the changed-field diff rides in the entry's `details`
//! payload. The integrity hash is computed once at append time over a
//! fixed, sorted-key canonical encoding and is never recomputed for
//! storage -- verification recomputes and compares.

use chrono::SecondsFormat;

use crate::hashing;
use crate::types::{DbId, Timestamp};

// ---------------------------------------------------------------------------
// Action type constants
// ---------------------------------------------------------------------------

/// Known action types for audit entries.
pub mod action_types {
    pub const CREATION: &str = "creation";
    pub const AUTOMATIC_STATE_CHANGE: &str = "automatic_state_change";
    pub const DISPOSITION_STARTED: &str = "disposition_started";
    pub const DISPOSITION_EXECUTED: &str = "disposition_executed";
    pub const DEFERRAL: &str = "deferral";
    pub const SUSPENSION: &str = "suspension";
    pub const REACTIVATION: &str = "reactivation";
    pub const ELIMINATION_BLOCKED: &str = "elimination_blocked";
    pub const ELIMINATION_UNBLOCKED: &str = "elimination_unblocked";
    pub const ALERT_READ: &str = "alert_read";
    pub const ALERT_ATTENDED: &str = "alert_attended";
    pub const SOFT_DELETE: &str = "soft_delete";
}

/// All known action types (filter validation, reporting).
pub const ALL_ACTION_TYPES: &[&str] = &[
    action_types::CREATION,
    action_types::AUTOMATIC_STATE_CHANGE,
    action_types::DISPOSITION_STARTED,
    action_types::DISPOSITION_EXECUTED,
    action_types::DEFERRAL,
    action_types::SUSPENSION,
    action_types::REACTIVATION,
    action_types::ELIMINATION_BLOCKED,
    action_types::ELIMINATION_UNBLOCKED,
    action_types::ALERT_READ,
    action_types::ALERT_ATTENDED,
    action_types::SOFT_DELETE,
];

// ---------------------------------------------------------------------------
// Entry hash
// ---------------------------------------------------------------------------

/// The fixed field set covered by an entry's integrity hash.
///
/// Anything outside this set (user agent, details payload) can be enriched
/// by reporting without affecting verifiability.
#[derive(Debug, Clone)]
pub struct EntryHashFields<'a> {
    pub process_id: Option<DbId>,
    pub action_type: &'a str,
    pub prior_state: Option<&'a str>,
    pub new_state: Option<&'a str>,
    pub description: &'a str,
    pub occurred_at: Timestamp,
    pub actor_id: Option<DbId>,
    pub ip_address: Option<&'a str>,
}

/// Compute the SHA-256 integrity hash for an audit entry.
///
/// Timestamps are rendered as RFC 3339 with microsecond precision so the
/// digest survives a round trip through TIMESTAMPTZ.
pub fn compute_entry_hash(fields: &EntryHashFields<'_>) -> String {
    let value = serde_json::json!({
        "process_id": fields.process_id,
        "action_type": fields.action_type,
        "prior_state": fields.prior_state,
        "new_state": fields.new_state,
        "description": fields.description,
        "occurred_at": fields.occurred_at.to_rfc3339_opts(SecondsFormat::Micros, true),
        "actor_id": fields.actor_id,
        "ip_address": fields.ip_address,
    });
    hashing::hash_json(&value)
}

// ---------------------------------------------------------------------------
// Changed-field diff
// ---------------------------------------------------------------------------

/// Build the changed-field diff payload stored in an entry's `details`.
///
/// `changes` pairs a field name with its `(before, after)` values; fields
/// whose values are equal are skipped.
pub fn field_diff(
    changes: &[(&str, serde_json::Value, serde_json::Value)],
) -> serde_json::Value {
    let mut diff = serde_json::Map::new();
    for (field, before, after) in changes {
        if before == after {
            continue;
        }
        diff.insert(
            (*field).to_string(),
            serde_json::json!({"before": before, "after": after}),
        );
    }
    serde_json::Value::Object(diff)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

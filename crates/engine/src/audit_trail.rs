//! Append-only audit trail: hashing at append time, forensic verification,
//! the query surface, and compliance export (JSON/CSV/XML).

use chrono::Utc;
use sqlx::{PgConnection, PgPool};

use sgdea_core::audit::{compute_entry_hash, EntryHashFields};
use sgdea_core::retention::ProcessState;
use sgdea_core::types::DbId;

use sgdea_db::models::audit_entry::{
    AuditEntry, AuditEntryPage, AuditEntryQuery, LedgerVerification, NewAuditEntry,
};
use sgdea_db::repositories::AuditEntryRepo;

use crate::context::ActionContext;
use crate::error::EngineResult;

// ---------------------------------------------------------------------------
// Append
// ---------------------------------------------------------------------------

/// One action to record in the ledger.
#[derive(Debug, Clone)]
pub struct AuditAction {
    pub process_id: Option<DbId>,
    pub action_type: &'static str,
    pub prior_state: Option<ProcessState>,
    pub new_state: Option<ProcessState>,
    pub description: String,
    /// Structured payload; state-changing operations put the
    /// changed-field diff here.
    pub details: Option<serde_json::Value>,
}

/// The append-only ledger of disposition actions.
pub struct AuditTrail;

impl AuditTrail {
    /// Append one entry inside the caller's transaction.
    ///
    /// Stamps `occurred_at`, computes the integrity hash over the canonical
    /// field set, and inserts. The entry is frozen from this point on.
    pub async fn append(
        conn: &mut PgConnection,
        action: AuditAction,
        ctx: &ActionContext,
    ) -> EngineResult<AuditEntry> {
        let occurred_at = Utc::now();
        let prior_state = action.prior_state.map(|s| s.as_str().to_string());
        let new_state = action.new_state.map(|s| s.as_str().to_string());

        let integrity_hash = compute_entry_hash(&EntryHashFields {
            process_id: action.process_id,
            action_type: action.action_type,
            prior_state: prior_state.as_deref(),
            new_state: new_state.as_deref(),
            description: &action.description,
            occurred_at,
            actor_id: ctx.actor_id,
            ip_address: ctx.ip_address.as_deref(),
        });

        let dto = NewAuditEntry {
            process_id: action.process_id,
            action_type: action.action_type.to_string(),
            prior_state,
            new_state,
            description: action.description,
            details: action.details,
            occurred_at,
            actor_id: ctx.actor_id,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
            integrity_hash,
        };

        Ok(AuditEntryRepo::insert(conn, &dto).await?)
    }

    /// Recompute an entry's hash from its own stored fields and compare.
    ///
    /// Used for audit/forensic checks only -- never for storage decisions.
    pub fn verify(entry: &AuditEntry) -> bool {
        let recomputed = compute_entry_hash(&EntryHashFields {
            process_id: entry.process_id,
            action_type: &entry.action_type,
            prior_state: entry.prior_state.as_deref(),
            new_state: entry.new_state.as_deref(),
            description: &entry.description,
            occurred_at: entry.occurred_at,
            actor_id: entry.actor_id,
            ip_address: entry.ip_address.as_deref(),
        });
        recomputed == entry.integrity_hash
    }

    /// Verify every entry of a process's ledger, id order.
    ///
    /// A mismatch is reported, never repaired -- repairing would defeat the
    /// tamper evidence.
    pub async fn verify_process_ledger(
        pool: &PgPool,
        process_id: DbId,
    ) -> EngineResult<LedgerVerification> {
        let entries = AuditEntryRepo::list_for_process(pool, process_id).await?;

        let mut first_mismatch = None;
        for entry in &entries {
            if !Self::verify(entry) {
                tracing::warn!(
                    entry_id = entry.id,
                    process_id,
                    "Audit entry failed hash verification"
                );
                first_mismatch = Some(entry.id);
                break;
            }
        }

        Ok(LedgerVerification {
            verified: entries.len() as i64,
            valid: first_mismatch.is_none(),
            first_mismatch,
        })
    }

    /// Filtered, paginated ledger query with totals.
    pub async fn query(pool: &PgPool, params: &AuditEntryQuery) -> EngineResult<AuditEntryPage> {
        let items = AuditEntryRepo::query(pool, params).await?;
        let total = AuditEntryRepo::count(pool, params).await?;
        Ok(AuditEntryPage { items, total })
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Serialize entries as pretty JSON, field-for-field.
pub fn export_json(entries: &[AuditEntry]) -> EngineResult<String> {
    serde_json::to_string_pretty(entries)
        .map_err(|e| sgdea_core::error::CoreError::Internal(e.to_string()).into())
}

/// Serialize entries as CSV, one row per entry, hash included.
pub fn export_csv(entries: &[AuditEntry]) -> String {
    let mut out = String::from(
        "id,process_id,action_type,prior_state,new_state,description,\
         details,occurred_at,actor_id,ip_address,user_agent,\
         integrity_hash,created_at\n",
    );
    for entry in entries {
        let fields = [
            entry.id.to_string(),
            entry.process_id.map_or(String::new(), |id| id.to_string()),
            entry.action_type.clone(),
            entry.prior_state.clone().unwrap_or_default(),
            entry.new_state.clone().unwrap_or_default(),
            entry.description.clone(),
            entry
                .details
                .as_ref()
                .map_or(String::new(), |d| d.to_string()),
            entry.occurred_at.to_rfc3339(),
            entry.actor_id.map_or(String::new(), |id| id.to_string()),
            entry.ip_address.clone().unwrap_or_default(),
            entry.user_agent.clone().unwrap_or_default(),
            entry.integrity_hash.clone(),
            entry.created_at.to_rfc3339(),
        ];
        let row: Vec<String> = fields.iter().map(|f| csv_field(f)).collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Serialize entries as flat XML, hash included.
pub fn export_xml(entries: &[AuditEntry]) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<audit-entries>\n");
    for entry in entries {
        out.push_str("  <entry>\n");
        xml_element(&mut out, "id", &entry.id.to_string());
        xml_opt_element(&mut out, "process-id", entry.process_id.map(|v| v.to_string()));
        xml_element(&mut out, "action-type", &entry.action_type);
        xml_opt_element(&mut out, "prior-state", entry.prior_state.clone());
        xml_opt_element(&mut out, "new-state", entry.new_state.clone());
        xml_element(&mut out, "description", &entry.description);
        xml_opt_element(
            &mut out,
            "details",
            entry.details.as_ref().map(|d| d.to_string()),
        );
        xml_element(&mut out, "occurred-at", &entry.occurred_at.to_rfc3339());
        xml_opt_element(&mut out, "actor-id", entry.actor_id.map(|v| v.to_string()));
        xml_opt_element(&mut out, "ip-address", entry.ip_address.clone());
        xml_opt_element(&mut out, "user-agent", entry.user_agent.clone());
        xml_element(&mut out, "integrity-hash", &entry.integrity_hash);
        xml_element(&mut out, "created-at", &entry.created_at.to_rfc3339());
        out.push_str("  </entry>\n");
    }
    out.push_str("</audit-entries>\n");
    out
}

/// Quote a CSV field when it contains a delimiter, quote, or newline.
fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

fn xml_element(out: &mut String, name: &str, value: &str) {
    out.push_str(&format!("    <{name}>{}</{name}>\n", xml_escape(value)));
}

fn xml_opt_element(out: &mut String, name: &str, value: Option<String>) {
    match value {
        Some(v) => xml_element(out, name, &v),
        None => out.push_str(&format!("    <{name}/>\n")),
    }
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

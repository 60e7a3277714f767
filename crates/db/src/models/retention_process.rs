//! Retention process entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use sgdea_core::error::CoreError;
use sgdea_core::retention::{
    AdvanceSnapshot, DispositionAction, ProcessHashFields, ProcessState, Subject,
};
use sgdea_core::types::{CalendarDate, DbId, Timestamp};

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A row from the `retention_processes` table.
///
/// State and action columns are stored as TEXT; the typed accessors below
/// parse them into the core enums and fail loudly on unknown values rather
/// than defaulting.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RetentionProcess {
    pub id: DbId,
    pub process_code: String,
    pub subject_type: String,
    pub document_id: Option<DbId>,
    pub case_file_id: Option<DbId>,
    pub schedule_id: DbId,
    pub series_id: DbId,
    pub subseries_id: Option<DbId>,
    pub subject_created_on: CalendarDate,
    pub management_years: i32,
    pub central_years: i32,
    pub management_expiry: Option<CalendarDate>,
    pub central_expiry: Option<CalendarDate>,
    pub pre_alert_on: Option<CalendarDate>,
    pub state: String,
    pub deferred: bool,
    pub deferral_start: Option<Timestamp>,
    pub deferral_end: Option<Timestamp>,
    pub deferral_reason: Option<String>,
    pub deferral_user_id: Option<DbId>,
    pub disposition_action: Option<String>,
    pub disposition_executed_at: Option<Timestamp>,
    pub disposition_user_id: Option<DbId>,
    pub elimination_blocked: bool,
    pub elimination_block_reason: Option<String>,
    pub alerts_active: bool,
    pub integrity_hash: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl RetentionProcess {
    /// Parsed lifecycle state.
    pub fn process_state(&self) -> Result<ProcessState, CoreError> {
        ProcessState::parse(&self.state)
    }

    /// Parsed subject reference.
    pub fn subject(&self) -> Result<Subject, CoreError> {
        Subject::from_columns(&self.subject_type, self.document_id, self.case_file_id)
    }

    /// Parsed disposition action, if one has been executed.
    pub fn disposition(&self) -> Result<Option<DispositionAction>, CoreError> {
        self.disposition_action
            .as_deref()
            .map(DispositionAction::parse)
            .transpose()
    }

    /// The field view automatic advancement evaluates.
    pub fn advance_snapshot(&self) -> Result<AdvanceSnapshot, CoreError> {
        Ok(AdvanceSnapshot {
            state: self.process_state()?,
            deferred: self.deferred,
            deferral_end: self.deferral_end,
            pre_alert_on: self.pre_alert_on,
            management_expiry: self.management_expiry,
        })
    }

    /// The canonical field set covered by `integrity_hash`.
    pub fn hash_fields(&self) -> Result<ProcessHashFields<'_>, CoreError> {
        Ok(ProcessHashFields {
            process_code: &self.process_code,
            subject: self.subject()?,
            schedule_id: self.schedule_id,
            series_id: self.series_id,
            subseries_id: self.subseries_id,
            subject_created_on: self.subject_created_on,
            management_years: self.management_years,
            central_years: self.central_years,
            management_expiry: self.management_expiry,
            central_expiry: self.central_expiry,
            pre_alert_on: self.pre_alert_on,
            state: self.process_state()?,
            deferred: self.deferred,
            disposition_action: self.disposition()?,
            elimination_blocked: self.elimination_blocked,
        })
    }
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// Insert DTO for a new retention process.
///
/// The engine computes the process code, derived dates, and integrity hash
/// before building this.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRetentionProcess {
    pub process_code: String,
    pub subject_type: String,
    pub document_id: Option<DbId>,
    pub case_file_id: Option<DbId>,
    pub schedule_id: DbId,
    pub series_id: DbId,
    pub subseries_id: Option<DbId>,
    pub subject_created_on: CalendarDate,
    pub management_years: i32,
    pub central_years: i32,
    pub management_expiry: Option<CalendarDate>,
    pub central_expiry: Option<CalendarDate>,
    pub pre_alert_on: Option<CalendarDate>,
    pub state: String,
    pub alerts_active: bool,
    pub integrity_hash: String,
}

// ---------------------------------------------------------------------------
// Mutation DTO
// ---------------------------------------------------------------------------

/// Full set of mutable columns, written back in one UPDATE.
///
/// Every engine operation loads the locked row, edits this struct, has the
/// core recompute the hash, and persists the whole set -- there is no
/// field-at-a-time update path that could skip hash recomputation.
#[derive(Debug, Clone)]
pub struct ProcessMutation {
    pub state: String,
    pub deferred: bool,
    pub deferral_start: Option<Timestamp>,
    pub deferral_end: Option<Timestamp>,
    pub deferral_reason: Option<String>,
    pub deferral_user_id: Option<DbId>,
    pub disposition_action: Option<String>,
    pub disposition_executed_at: Option<Timestamp>,
    pub disposition_user_id: Option<DbId>,
    pub elimination_blocked: bool,
    pub elimination_block_reason: Option<String>,
    pub alerts_active: bool,
    pub integrity_hash: String,
}

impl ProcessMutation {
    /// Start from the row's current values.
    pub fn from_row(row: &RetentionProcess) -> Self {
        Self {
            state: row.state.clone(),
            deferred: row.deferred,
            deferral_start: row.deferral_start,
            deferral_end: row.deferral_end,
            deferral_reason: row.deferral_reason.clone(),
            deferral_user_id: row.deferral_user_id,
            disposition_action: row.disposition_action.clone(),
            disposition_executed_at: row.disposition_executed_at,
            disposition_user_id: row.disposition_user_id,
            elimination_blocked: row.elimination_blocked,
            elimination_block_reason: row.elimination_block_reason.clone(),
            alerts_active: row.alerts_active,
            integrity_hash: row.integrity_hash.clone(),
        }
    }
}

//! Retention-process state machine: states, disposition actions, the
//! transition table, automatic advancement, and the process snapshot hash.
//!
//! This module lives in `core` (zero internal deps) so it can be used by
//! both the repository layer and the worker.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::hashing;
use crate::types::{CalendarDate, DbId, Timestamp};

// ---------------------------------------------------------------------------
// Subject reference
// ---------------------------------------------------------------------------

/// What a retention process tracks: exactly one of a document or a case
/// file (expediente). The sum type makes both-null and both-set rows
/// unrepresentable above the schema edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Subject {
    Document(DbId),
    CaseFile(DbId),
}

impl Subject {
    /// Discriminant as stored in the `subject_type` column.
    pub fn type_str(&self) -> &'static str {
        match self {
            Subject::Document(_) => "document",
            Subject::CaseFile(_) => "case_file",
        }
    }

    /// The referenced entity id, whichever side it lives on.
    pub fn entity_id(&self) -> DbId {
        match self {
            Subject::Document(id) | Subject::CaseFile(id) => *id,
        }
    }

    /// Rebuild from the `(subject_type, document_id, case_file_id)` columns.
    pub fn from_columns(
        subject_type: &str,
        document_id: Option<DbId>,
        case_file_id: Option<DbId>,
    ) -> Result<Self, CoreError> {
        match (subject_type, document_id, case_file_id) {
            ("document", Some(id), None) => Ok(Subject::Document(id)),
            ("case_file", None, Some(id)) => Ok(Subject::CaseFile(id)),
            _ => Err(CoreError::Validation(format!(
                "Invalid subject columns: type '{subject_type}', document {document_id:?}, case file {case_file_id:?}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Process states
// ---------------------------------------------------------------------------

/// Lifecycle state of a retention process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Active,
    PreAlert,
    Expired,
    InDisposition,
    Transferred,
    Eliminated,
    Conserved,
    Deferred,
    Suspended,
}

/// All states, in declaration order.
pub const ALL_STATES: &[ProcessState] = &[
    ProcessState::Active,
    ProcessState::PreAlert,
    ProcessState::Expired,
    ProcessState::InDisposition,
    ProcessState::Transferred,
    ProcessState::Eliminated,
    ProcessState::Conserved,
    ProcessState::Deferred,
    ProcessState::Suspended,
];

impl ProcessState {
    /// Stable string form as stored in the `state` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Active => "active",
            ProcessState::PreAlert => "pre_alert",
            ProcessState::Expired => "expired",
            ProcessState::InDisposition => "in_disposition",
            ProcessState::Transferred => "transferred",
            ProcessState::Eliminated => "eliminated",
            ProcessState::Conserved => "conserved",
            ProcessState::Deferred => "deferred",
            ProcessState::Suspended => "suspended",
        }
    }

    /// Parse the stored column value back into a state.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        ALL_STATES
            .iter()
            .copied()
            .find(|state| state.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown process state: '{s}'")))
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessState::Transferred | ProcessState::Eliminated | ProcessState::Conserved
        )
    }
}

impl std::fmt::Display for ProcessState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Disposition actions
// ---------------------------------------------------------------------------

/// Final disposition applied to a record at end of retention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispositionAction {
    ConservationPermanent,
    Elimination,
    TransferHistorical,
    Selection,
    Microfilm,
    DigitizationPermanent,
}

/// All disposition actions, in declaration order.
pub const ALL_ACTIONS: &[DispositionAction] = &[
    DispositionAction::ConservationPermanent,
    DispositionAction::Elimination,
    DispositionAction::TransferHistorical,
    DispositionAction::Selection,
    DispositionAction::Microfilm,
    DispositionAction::DigitizationPermanent,
];

impl DispositionAction {
    /// Stable string form as stored in the `disposition_action` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            DispositionAction::ConservationPermanent => "conservation_permanent",
            DispositionAction::Elimination => "elimination",
            DispositionAction::TransferHistorical => "transfer_historical",
            DispositionAction::Selection => "selection",
            DispositionAction::Microfilm => "microfilm",
            DispositionAction::DigitizationPermanent => "digitization_permanent",
        }
    }

    /// Parse the stored column value back into an action.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        ALL_ACTIONS
            .iter()
            .copied()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("Unknown disposition action: '{s}'")))
    }

    /// Terminal process state a successful execution lands in.
    ///
    /// Selection, microfilm, and permanent digitization all keep the record
    /// (in sampled or reformatted form), so they resolve to `Conserved`.
    pub fn terminal_state(&self) -> ProcessState {
        match self {
            DispositionAction::Elimination => ProcessState::Eliminated,
            DispositionAction::TransferHistorical => ProcessState::Transferred,
            DispositionAction::ConservationPermanent
            | DispositionAction::Selection
            | DispositionAction::Microfilm
            | DispositionAction::DigitizationPermanent => ProcessState::Conserved,
        }
    }

    /// States from which this action may be executed.
    pub fn allowed_states(&self) -> &'static [ProcessState] {
        // Disposition is only meaningful once retention has run out.
        &[ProcessState::Expired, ProcessState::InDisposition]
    }
}

impl std::fmt::Display for DispositionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub mod state_machine {
    use super::ProcessState;
    use super::ProcessState::*;

    /// Returns the set of valid target states reachable from `from`.
    ///
    /// Terminal states return an empty slice because no further
    /// transitions are allowed.
    pub fn valid_transitions(from: ProcessState) -> &'static [ProcessState] {
        match from {
            Active => &[PreAlert, Expired, Deferred, Suspended],
            PreAlert => &[Expired, Deferred, Suspended, Active],
            Expired => &[
                InDisposition,
                Deferred,
                Suspended,
                Transferred,
                Eliminated,
                Conserved,
            ],
            InDisposition => &[Transferred, Eliminated, Conserved, Suspended],
            Deferred => &[Active],
            Suspended => &[Active],
            Transferred | Eliminated | Conserved => &[],
        }
    }

    /// Check whether a transition from `from` to `to` is valid.
    pub fn can_transition(from: ProcessState, to: ProcessState) -> bool {
        valid_transitions(from).contains(&to)
    }

    /// Validate a state transition, returning an error message for invalid ones.
    pub fn validate_transition(from: ProcessState, to: ProcessState) -> Result<(), String> {
        if can_transition(from, to) {
            Ok(())
        } else {
            Err(format!("Invalid transition: {from} -> {to}"))
        }
    }
}

// ---------------------------------------------------------------------------
// Automatic advancement
// ---------------------------------------------------------------------------

/// The fields of a process row that automatic advancement looks at.
#[derive(Debug, Clone, Copy)]
pub struct AdvanceSnapshot {
    pub state: ProcessState,
    pub deferred: bool,
    pub deferral_end: Option<Timestamp>,
    pub pre_alert_on: Option<CalendarDate>,
    pub management_expiry: Option<CalendarDate>,
}

/// What a sweep pass decided for one process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Deferral window elapsed: clear the deferral and revert to active.
    ResumeFromDeferral,
    /// A retention date was crossed: move to the given state.
    Transition(ProcessState),
}

/// Evaluate the automatic-advance rules against `now`.
///
/// Returns `None` when no threshold has been crossed -- the caller must
/// write no audit entry in that case. Applying the result and re-running
/// with the same `now` always yields `None` again (idempotence).
pub fn auto_advance(snapshot: &AdvanceSnapshot, now: Timestamp) -> Option<AdvanceOutcome> {
    if snapshot.state == ProcessState::Deferred {
        return match snapshot.deferral_end {
            Some(end) if now >= end => Some(AdvanceOutcome::ResumeFromDeferral),
            _ => None,
        };
    }

    if !matches!(
        snapshot.state,
        ProcessState::Active | ProcessState::PreAlert
    ) {
        return None;
    }

    let today = now.date_naive();
    if let Some(expiry) = snapshot.management_expiry {
        if today >= expiry {
            return Some(AdvanceOutcome::Transition(ProcessState::Expired));
        }
    }
    if snapshot.state == ProcessState::Active {
        if let Some(pre_alert) = snapshot.pre_alert_on {
            if today >= pre_alert {
                return Some(AdvanceOutcome::Transition(ProcessState::PreAlert));
            }
        }
    }

    None
}

/// True iff the process currently requires alert generation: alerts are
/// enabled, the process is active, and a warning or expiry date has been
/// reached.
pub fn needs_alert(
    alerts_active: bool,
    state: ProcessState,
    pre_alert_on: Option<CalendarDate>,
    management_expiry: Option<CalendarDate>,
    now: Timestamp,
) -> bool {
    if !alerts_active || state != ProcessState::Active {
        return false;
    }
    let today = now.date_naive();
    pre_alert_on.is_some_and(|d| today >= d) || management_expiry.is_some_and(|d| today >= d)
}

// ---------------------------------------------------------------------------
// Snapshot hash
// ---------------------------------------------------------------------------

/// Canonical field set hashed into a process row's `integrity_hash`.
///
/// Every persisted mutation recomputes this; verification recomputes and
/// compares against the stored value.
#[derive(Debug, Clone)]
pub struct ProcessHashFields<'a> {
    pub process_code: &'a str,
    pub subject: Subject,
    pub schedule_id: DbId,
    pub series_id: DbId,
    pub subseries_id: Option<DbId>,
    pub subject_created_on: CalendarDate,
    pub management_years: i32,
    pub central_years: i32,
    pub management_expiry: Option<CalendarDate>,
    pub central_expiry: Option<CalendarDate>,
    pub pre_alert_on: Option<CalendarDate>,
    pub state: ProcessState,
    pub deferred: bool,
    pub disposition_action: Option<DispositionAction>,
    pub elimination_blocked: bool,
}

/// Compute the snapshot hash for a process row.
pub fn compute_process_hash(fields: &ProcessHashFields<'_>) -> String {
    let value = serde_json::json!({
        "process_code": fields.process_code,
        "subject_type": fields.subject.type_str(),
        "subject_id": fields.subject.entity_id(),
        "schedule_id": fields.schedule_id,
        "series_id": fields.series_id,
        "subseries_id": fields.subseries_id,
        "subject_created_on": fields.subject_created_on.to_string(),
        "management_years": fields.management_years,
        "central_years": fields.central_years,
        "management_expiry": fields.management_expiry.map(|d| d.to_string()),
        "central_expiry": fields.central_expiry.map(|d| d.to_string()),
        "pre_alert_on": fields.pre_alert_on.map(|d| d.to_string()),
        "state": fields.state.as_str(),
        "deferred": fields.deferred,
        "disposition_action": fields.disposition_action.map(|a| a.as_str()),
        "elimination_blocked": fields.elimination_blocked,
    });
    hashing::hash_json(&value)
}

// ---------------------------------------------------------------------------
// Process codes
// ---------------------------------------------------------------------------

/// Format a process code from its year and per-year sequence number.
///
/// `RET-2026-00000042` -- the sequence is zero-padded to eight digits.
pub fn format_process_code(year: i32, seq: i64) -> String {
    format!("RET-{year}-{seq:08}")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn at(y: i32, m: u32, d: u32) -> Timestamp {
        Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap()
    }

    // -----------------------------------------------------------------------
    // Subject
    // -----------------------------------------------------------------------

    #[test]
    fn subject_round_trips_through_columns() {
        let subject = Subject::Document(7);
        let rebuilt = Subject::from_columns(subject.type_str(), Some(7), None).unwrap();
        assert_eq!(subject, rebuilt);

        let subject = Subject::CaseFile(9);
        let rebuilt = Subject::from_columns(subject.type_str(), None, Some(9)).unwrap();
        assert_eq!(subject, rebuilt);
    }

    #[test]
    fn subject_rejects_invalid_column_combinations() {
        assert!(Subject::from_columns("document", None, None).is_err());
        assert!(Subject::from_columns("document", Some(1), Some(2)).is_err());
        assert!(Subject::from_columns("case_file", Some(1), None).is_err());
        assert!(Subject::from_columns("folder", Some(1), None).is_err());
    }

    // -----------------------------------------------------------------------
    // State parsing
    // -----------------------------------------------------------------------

    #[test]
    fn state_round_trips_through_strings() {
        for state in ALL_STATES {
            assert_eq!(ProcessState::parse(state.as_str()).unwrap(), *state);
        }
    }

    #[test]
    fn unknown_state_rejected() {
        assert!(ProcessState::parse("archived").is_err());
    }

    #[test]
    fn action_round_trips_through_strings() {
        for action in ALL_ACTIONS {
            assert_eq!(DispositionAction::parse(action.as_str()).unwrap(), *action);
        }
    }

    // -----------------------------------------------------------------------
    // Transition table
    // -----------------------------------------------------------------------

    #[test]
    fn active_to_pre_alert() {
        assert!(state_machine::can_transition(
            ProcessState::Active,
            ProcessState::PreAlert
        ));
    }

    #[test]
    fn pre_alert_to_expired() {
        assert!(state_machine::can_transition(
            ProcessState::PreAlert,
            ProcessState::Expired
        ));
    }

    #[test]
    fn expired_to_terminal_states() {
        assert!(state_machine::can_transition(
            ProcessState::Expired,
            ProcessState::Conserved
        ));
        assert!(state_machine::can_transition(
            ProcessState::Expired,
            ProcessState::Eliminated
        ));
        assert!(state_machine::can_transition(
            ProcessState::Expired,
            ProcessState::Transferred
        ));
    }

    #[test]
    fn deferred_only_resumes_to_active() {
        assert_eq!(
            state_machine::valid_transitions(ProcessState::Deferred),
            &[ProcessState::Active]
        );
    }

    #[test]
    fn terminal_states_have_no_transitions() {
        assert!(state_machine::valid_transitions(ProcessState::Conserved).is_empty());
        assert!(state_machine::valid_transitions(ProcessState::Eliminated).is_empty());
        assert!(state_machine::valid_transitions(ProcessState::Transferred).is_empty());
    }

    #[test]
    fn eliminated_to_active_invalid() {
        let err = state_machine::validate_transition(
            ProcessState::Eliminated,
            ProcessState::Active,
        )
        .unwrap_err();
        assert!(err.contains("eliminated"));
        assert!(err.contains("active"));
    }

    // -----------------------------------------------------------------------
    // Disposition table
    // -----------------------------------------------------------------------

    #[test]
    fn elimination_terminates_in_eliminated() {
        assert_eq!(
            DispositionAction::Elimination.terminal_state(),
            ProcessState::Eliminated
        );
    }

    #[test]
    fn conservation_family_terminates_in_conserved() {
        for action in [
            DispositionAction::ConservationPermanent,
            DispositionAction::Selection,
            DispositionAction::Microfilm,
            DispositionAction::DigitizationPermanent,
        ] {
            assert_eq!(action.terminal_state(), ProcessState::Conserved);
        }
    }

    #[test]
    fn actions_only_allowed_from_expired_or_in_disposition() {
        for action in ALL_ACTIONS {
            assert_eq!(
                action.allowed_states(),
                &[ProcessState::Expired, ProcessState::InDisposition]
            );
        }
    }

    // -----------------------------------------------------------------------
    // Automatic advancement
    // -----------------------------------------------------------------------

    fn snapshot(state: ProcessState) -> AdvanceSnapshot {
        AdvanceSnapshot {
            state,
            deferred: false,
            deferral_end: None,
            pre_alert_on: Some(date(2024, 12, 2)),
            management_expiry: Some(date(2025, 1, 1)),
        }
    }

    #[test]
    fn active_before_pre_alert_is_noop() {
        assert_eq!(auto_advance(&snapshot(ProcessState::Active), at(2024, 6, 1)), None);
    }

    #[test]
    fn active_past_pre_alert_moves_to_pre_alert() {
        assert_eq!(
            auto_advance(&snapshot(ProcessState::Active), at(2024, 12, 15)),
            Some(AdvanceOutcome::Transition(ProcessState::PreAlert))
        );
    }

    #[test]
    fn active_past_expiry_moves_straight_to_expired() {
        assert_eq!(
            auto_advance(&snapshot(ProcessState::Active), at(2025, 2, 1)),
            Some(AdvanceOutcome::Transition(ProcessState::Expired))
        );
    }

    #[test]
    fn pre_alert_past_expiry_moves_to_expired() {
        assert_eq!(
            auto_advance(&snapshot(ProcessState::PreAlert), at(2025, 1, 1)),
            Some(AdvanceOutcome::Transition(ProcessState::Expired))
        );
    }

    #[test]
    fn pre_alert_before_expiry_is_noop() {
        assert_eq!(
            auto_advance(&snapshot(ProcessState::PreAlert), at(2024, 12, 20)),
            None
        );
    }

    #[test]
    fn advance_is_idempotent() {
        // Apply the outcome, re-evaluate with the same clock: no-op.
        let now = at(2024, 12, 15);
        let mut snap = snapshot(ProcessState::Active);
        if let Some(AdvanceOutcome::Transition(next)) = auto_advance(&snap, now) {
            snap.state = next;
        }
        assert_eq!(snap.state, ProcessState::PreAlert);
        assert_eq!(auto_advance(&snap, now), None);
    }

    #[test]
    fn elapsed_deferral_resumes() {
        let snap = AdvanceSnapshot {
            state: ProcessState::Deferred,
            deferred: true,
            deferral_end: Some(at(2024, 1, 1)),
            pre_alert_on: None,
            management_expiry: None,
        };
        assert_eq!(
            auto_advance(&snap, at(2024, 2, 1)),
            Some(AdvanceOutcome::ResumeFromDeferral)
        );
    }

    #[test]
    fn running_deferral_is_noop() {
        let snap = AdvanceSnapshot {
            state: ProcessState::Deferred,
            deferred: true,
            deferral_end: Some(at(2024, 6, 1)),
            pre_alert_on: Some(date(2023, 1, 1)),
            management_expiry: Some(date(2023, 6, 1)),
        };
        assert_eq!(auto_advance(&snap, at(2024, 2, 1)), None);
    }

    #[test]
    fn suspended_and_terminal_states_never_advance() {
        for state in [
            ProcessState::Suspended,
            ProcessState::InDisposition,
            ProcessState::Conserved,
            ProcessState::Eliminated,
            ProcessState::Transferred,
        ] {
            assert_eq!(auto_advance(&snapshot(state), at(2026, 1, 1)), None);
        }
    }

    // -----------------------------------------------------------------------
    // Alert requirement predicate
    // -----------------------------------------------------------------------

    #[test]
    fn needs_alert_when_active_and_past_pre_alert() {
        assert!(needs_alert(
            true,
            ProcessState::Active,
            Some(date(2024, 12, 2)),
            Some(date(2025, 1, 1)),
            at(2024, 12, 15),
        ));
    }

    #[test]
    fn no_alert_when_disabled_or_not_active() {
        assert!(!needs_alert(
            false,
            ProcessState::Active,
            Some(date(2024, 12, 2)),
            None,
            at(2024, 12, 15),
        ));
        assert!(!needs_alert(
            true,
            ProcessState::Expired,
            Some(date(2024, 12, 2)),
            None,
            at(2024, 12, 15),
        ));
    }

    #[test]
    fn no_alert_before_thresholds() {
        assert!(!needs_alert(
            true,
            ProcessState::Active,
            Some(date(2024, 12, 2)),
            Some(date(2025, 1, 1)),
            at(2024, 6, 1),
        ));
    }

    // -----------------------------------------------------------------------
    // Snapshot hash
    // -----------------------------------------------------------------------

    fn hash_fields(state: ProcessState) -> ProcessHashFields<'static> {
        ProcessHashFields {
            process_code: "RET-2026-00000001",
            subject: Subject::Document(12),
            schedule_id: 3,
            series_id: 40,
            subseries_id: None,
            subject_created_on: date(2020, 1, 1),
            management_years: 5,
            central_years: 10,
            management_expiry: Some(date(2025, 1, 1)),
            central_expiry: Some(date(2035, 1, 1)),
            pre_alert_on: Some(date(2024, 12, 2)),
            state,
            deferred: false,
            disposition_action: None,
            elimination_blocked: false,
        }
    }

    #[test]
    fn process_hash_is_deterministic() {
        assert_eq!(
            compute_process_hash(&hash_fields(ProcessState::Active)),
            compute_process_hash(&hash_fields(ProcessState::Active)),
        );
    }

    #[test]
    fn process_hash_changes_with_state() {
        assert_ne!(
            compute_process_hash(&hash_fields(ProcessState::Active)),
            compute_process_hash(&hash_fields(ProcessState::Expired)),
        );
    }

    // -----------------------------------------------------------------------
    // Process codes
    // -----------------------------------------------------------------------

    #[test]
    fn process_code_is_zero_padded() {
        assert_eq!(format_process_code(2026, 42), "RET-2026-00000042");
        assert_eq!(format_process_code(2026, 12_345_678), "RET-2026-12345678");
    }
}

//! Retention process lifecycle operations.
//!
//! Each operation is one transaction over the same skeleton: lock the row,
//! guard-check the transition, mutate, recompute the snapshot hash, persist,
//! append a single structured audit entry carrying the changed-field diff.

use chrono::{Datelike, Utc};
use serde::Deserialize;
use sqlx::PgPool;
use validator::Validate;

use sgdea_core::audit::{action_types, field_diff};
use sgdea_core::error::CoreError;
use sgdea_core::retention::{
    self, state_machine, AdvanceOutcome, DispositionAction, ProcessHashFields, ProcessState,
    Subject,
};
use sgdea_core::schedule::{self, RetentionPeriods};
use sgdea_core::types::{CalendarDate, DbId, Timestamp};

use sgdea_db::models::retention_process::{
    NewRetentionProcess, ProcessMutation, RetentionProcess,
};
use sgdea_db::repositories::RetentionProcessRepo;

use crate::audit_trail::{AuditAction, AuditTrail};
use crate::boundary::{ScheduleLookup, SubjectLookup};
use crate::context::ActionContext;
use crate::error::{EngineError, EngineResult};

// ---------------------------------------------------------------------------
// Inputs
// ---------------------------------------------------------------------------

/// Input for creating a retention process with already-resolved periods.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateProcess {
    pub subject: Subject,
    pub schedule_id: DbId,
    pub series_id: DbId,
    pub subseries_id: Option<DbId>,
    pub subject_created_on: CalendarDate,
    #[validate(range(min = 0, max = 200))]
    pub management_years: i32,
    #[validate(range(min = 0, max = 200))]
    pub central_years: i32,
    /// Days before management expiry at which warnings start; calculator
    /// default when absent.
    #[validate(range(min = 0, max = 3650))]
    pub pre_alert_days: Option<i64>,
    /// Explicit expiry dates; when absent the calculator derives them.
    pub management_expiry: Option<CalendarDate>,
    pub central_expiry: Option<CalendarDate>,
    pub pre_alert_on: Option<CalendarDate>,
    pub alerts_active: bool,
}

/// Input for deferring (aplazamiento) a process.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct DeferProcess {
    pub deferral_end: Timestamp,
    #[validate(length(min = 1, max = 2000))]
    pub reason: String,
}

// ---------------------------------------------------------------------------
// Service
// ---------------------------------------------------------------------------

/// Orchestrates all state-mutating operations on retention processes.
#[derive(Clone)]
pub struct RetentionService {
    pool: PgPool,
}

impl RetentionService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    // -----------------------------------------------------------------------
    // Creation
    // -----------------------------------------------------------------------

    /// Create a retention process, deriving dates from the schedule periods
    /// unless explicit expiry dates were supplied.
    ///
    /// Allocates the next `RET-<year>-<seq>` code, computes the initial
    /// snapshot hash, and writes the "creation" audit entry, all in one
    /// transaction.
    pub async fn create(
        &self,
        input: CreateProcess,
        ctx: &ActionContext,
    ) -> EngineResult<RetentionProcess> {
        input
            .validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;

        let (management_expiry, central_expiry, pre_alert_on) = resolve_dates(&input)?;

        let mut tx = self.pool.begin().await?;

        let year = Utc::now().year();
        let seq = RetentionProcessRepo::next_code_seq(&mut tx, year).await?;
        let process_code = retention::format_process_code(year, seq);

        let state = ProcessState::Active;
        let integrity_hash = retention::compute_process_hash(&ProcessHashFields {
            process_code: &process_code,
            subject: input.subject,
            schedule_id: input.schedule_id,
            series_id: input.series_id,
            subseries_id: input.subseries_id,
            subject_created_on: input.subject_created_on,
            management_years: input.management_years,
            central_years: input.central_years,
            management_expiry,
            central_expiry,
            pre_alert_on,
            state,
            deferred: false,
            disposition_action: None,
            elimination_blocked: false,
        });

        let dto = NewRetentionProcess {
            process_code: process_code.clone(),
            subject_type: input.subject.type_str().to_string(),
            document_id: match input.subject {
                Subject::Document(id) => Some(id),
                Subject::CaseFile(_) => None,
            },
            case_file_id: match input.subject {
                Subject::CaseFile(id) => Some(id),
                Subject::Document(_) => None,
            },
            schedule_id: input.schedule_id,
            series_id: input.series_id,
            subseries_id: input.subseries_id,
            subject_created_on: input.subject_created_on,
            management_years: input.management_years,
            central_years: input.central_years,
            management_expiry,
            central_expiry,
            pre_alert_on,
            state: state.as_str().to_string(),
            alerts_active: input.alerts_active,
            integrity_hash,
        };

        let row = RetentionProcessRepo::insert(&mut tx, &dto).await?;

        AuditTrail::append(
            &mut tx,
            AuditAction {
                process_id: Some(row.id),
                action_type: action_types::CREATION,
                prior_state: None,
                new_state: Some(state),
                description: format!("Retention process {process_code} created"),
                details: Some(serde_json::json!({
                    "subject_type": input.subject.type_str(),
                    "subject_id": input.subject.entity_id(),
                    "schedule_id": input.schedule_id,
                    "management_expiry": management_expiry,
                    "central_expiry": central_expiry,
                })),
            },
            ctx,
        )
        .await?;

        tx.commit().await?;
        Ok(row)
    }

    /// Create a process by resolving the subject and schedule through the
    /// external boundary collaborators first.
    pub async fn create_for_subject(
        &self,
        subject: Subject,
        schedule_id: DbId,
        subjects: &dyn SubjectLookup,
        schedules: &dyn ScheduleLookup,
        ctx: &ActionContext,
    ) -> EngineResult<RetentionProcess> {
        let info = subjects
            .subject_info(subject)
            .await?
            .ok_or_else(|| CoreError::Validation(format!(
                "Subject {} {} does not exist",
                subject.type_str(),
                subject.entity_id()
            )))?;

        let periods: Option<RetentionPeriods> =
            schedules.retention_periods(schedule_id).await?;
        let Some(periods) = periods else {
            return Err(CoreError::Validation(format!(
                "Retention schedule {schedule_id} does not exist"
            ))
            .into());
        };

        self.create(
            CreateProcess {
                subject,
                schedule_id,
                series_id: info.series_id,
                subseries_id: info.subseries_id,
                subject_created_on: info.created_on,
                management_years: periods.management_years,
                central_years: periods.central_years,
                pre_alert_days: None,
                management_expiry: None,
                central_expiry: None,
                pre_alert_on: None,
                alerts_active: true,
            },
            ctx,
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Automatic advancement
    // -----------------------------------------------------------------------

    /// Apply the automatic-advance rules to one process.
    ///
    /// Returns `Ok(None)` -- and writes nothing, audit included -- when no
    /// threshold has been crossed. Safe to re-run: once advanced, the same
    /// evaluation yields a no-op.
    pub async fn auto_advance(
        &self,
        process_id: DbId,
        now: Timestamp,
    ) -> EngineResult<Option<RetentionProcess>> {
        let mut tx = self.pool.begin().await?;

        let row = RetentionProcessRepo::lock_by_id(&mut tx, process_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "retention_process",
                id: process_id,
            })?;

        let snapshot = row.advance_snapshot()?;
        let Some(outcome) = retention::auto_advance(&snapshot, now) else {
            return Ok(None);
        };

        let prior = snapshot.state;
        let mut mutation = ProcessMutation::from_row(&row);
        let (target, description) = match outcome {
            AdvanceOutcome::ResumeFromDeferral => {
                mutation.deferred = false;
                mutation.deferral_start = None;
                mutation.deferral_end = None;
                mutation.deferral_reason = None;
                mutation.deferral_user_id = None;
                (
                    ProcessState::Active,
                    "Deferral period elapsed, process resumed".to_string(),
                )
            }
            AdvanceOutcome::Transition(next) => (
                next,
                format!("Retention date crossed: {prior} -> {next}"),
            ),
        };

        state_machine::validate_transition(prior, target).map_err(CoreError::Guard)?;
        mutation.state = target.as_str().to_string();
        mutation.integrity_hash = mutation_hash(&row, &mutation)?;

        let details = field_diff(&[
            (
                "state",
                serde_json::json!(prior.as_str()),
                serde_json::json!(target.as_str()),
            ),
            (
                "deferred",
                serde_json::json!(row.deferred),
                serde_json::json!(mutation.deferred),
            ),
        ]);

        let updated = RetentionProcessRepo::apply_mutation(&mut tx, process_id, &mutation).await?;

        AuditTrail::append(
            &mut tx,
            AuditAction {
                process_id: Some(process_id),
                action_type: action_types::AUTOMATIC_STATE_CHANGE,
                prior_state: Some(prior),
                new_state: Some(target),
                description,
                details: Some(details),
            },
            &ActionContext::system(),
        )
        .await?;

        tx.commit().await?;
        Ok(Some(updated))
    }

    // -----------------------------------------------------------------------
    // Deferral
    // -----------------------------------------------------------------------

    /// Defer the disposition countdown until `deferral_end`.
    pub async fn defer(
        &self,
        process_id: DbId,
        input: DeferProcess,
        ctx: &ActionContext,
    ) -> EngineResult<RetentionProcess> {
        input
            .validate()
            .map_err(|e| CoreError::Validation(e.to_string()))?;
        let now = Utc::now();
        if input.deferral_end <= now {
            return Err(CoreError::Validation(
                "Deferral end date must be in the future".to_string(),
            )
            .into());
        }

        let mut tx = self.pool.begin().await?;
        let row = RetentionProcessRepo::lock_by_id(&mut tx, process_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "retention_process",
                id: process_id,
            })?;

        let prior = row.process_state()?;
        state_machine::validate_transition(prior, ProcessState::Deferred)
            .map_err(CoreError::Guard)?;

        let mut mutation = ProcessMutation::from_row(&row);
        mutation.state = ProcessState::Deferred.as_str().to_string();
        mutation.deferred = true;
        mutation.deferral_start = Some(now);
        mutation.deferral_end = Some(input.deferral_end);
        mutation.deferral_reason = Some(input.reason.clone());
        mutation.deferral_user_id = ctx.actor_id;
        mutation.integrity_hash = mutation_hash(&row, &mutation)?;

        let details = field_diff(&[
            (
                "state",
                serde_json::json!(prior.as_str()),
                serde_json::json!(mutation.state),
            ),
            (
                "deferred",
                serde_json::json!(row.deferred),
                serde_json::json!(true),
            ),
            (
                "deferral_end",
                serde_json::json!(row.deferral_end),
                serde_json::json!(input.deferral_end),
            ),
        ]);

        let updated = RetentionProcessRepo::apply_mutation(&mut tx, process_id, &mutation).await?;

        AuditTrail::append(
            &mut tx,
            AuditAction {
                process_id: Some(process_id),
                action_type: action_types::DEFERRAL,
                prior_state: Some(prior),
                new_state: Some(ProcessState::Deferred),
                description: format!("Disposition deferred: {}", input.reason),
                details: Some(details),
            },
            ctx,
        )
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Disposition
    // -----------------------------------------------------------------------

    /// Move an expired process into disposition handling.
    pub async fn begin_disposition(
        &self,
        process_id: DbId,
        ctx: &ActionContext,
    ) -> EngineResult<RetentionProcess> {
        self.transition(
            process_id,
            ProcessState::InDisposition,
            action_types::DISPOSITION_STARTED,
            "Disposition handling started".to_string(),
            ctx,
        )
        .await
    }

    /// Execute a final disposition action.
    ///
    /// Guards: the action must be allowed from the current state, and
    /// elimination is rejected while the process is blocked. On any
    /// failure the transaction rolls back -- the state is left at its
    /// pre-attempt value and no "disposition_executed" entry exists.
    ///
    /// Slow destruction/transfer workflows run outside this transaction:
    /// callers dispatch them after the commit, against the terminal row.
    pub async fn execute_disposition(
        &self,
        process_id: DbId,
        action: DispositionAction,
        ctx: &ActionContext,
    ) -> EngineResult<RetentionProcess> {
        let result = self.try_execute_disposition(process_id, action, ctx).await;
        if let Err(err) = &result {
            tracing::error!(
                process_id,
                action = %action,
                error = %err,
                "Disposition execution failed; process state unchanged"
            );
        }
        result
    }

    async fn try_execute_disposition(
        &self,
        process_id: DbId,
        action: DispositionAction,
        ctx: &ActionContext,
    ) -> EngineResult<RetentionProcess> {
        let mut tx = self.pool.begin().await?;
        let row = RetentionProcessRepo::lock_by_id(&mut tx, process_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "retention_process",
                id: process_id,
            })?;

        let prior = row.process_state()?;
        if !action.allowed_states().contains(&prior) {
            return Err(CoreError::Guard(format!(
                "Disposition action {action} is not allowed from state {prior}"
            ))
            .into());
        }
        if action == DispositionAction::Elimination && row.elimination_blocked {
            let reason = row
                .elimination_block_reason
                .as_deref()
                .unwrap_or("no reason recorded");
            return Err(CoreError::Guard(format!(
                "Process {} is blocked from elimination: {reason}",
                row.process_code
            ))
            .into());
        }

        let target = action.terminal_state();
        state_machine::validate_transition(prior, target).map_err(CoreError::Guard)?;

        let now = Utc::now();
        let mut mutation = ProcessMutation::from_row(&row);
        mutation.state = target.as_str().to_string();
        mutation.disposition_action = Some(action.as_str().to_string());
        mutation.disposition_executed_at = Some(now);
        mutation.disposition_user_id = ctx.actor_id;
        mutation.integrity_hash = mutation_hash(&row, &mutation)?;

        let details = field_diff(&[
            (
                "state",
                serde_json::json!(prior.as_str()),
                serde_json::json!(target.as_str()),
            ),
            (
                "disposition_action",
                serde_json::json!(row.disposition_action),
                serde_json::json!(action.as_str()),
            ),
        ]);

        let updated = RetentionProcessRepo::apply_mutation(&mut tx, process_id, &mutation).await?;

        AuditTrail::append(
            &mut tx,
            AuditAction {
                process_id: Some(process_id),
                action_type: action_types::DISPOSITION_EXECUTED,
                prior_state: Some(prior),
                new_state: Some(target),
                description: format!("Disposition executed: {action}"),
                details: Some(details),
            },
            ctx,
        )
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Suspension
    // -----------------------------------------------------------------------

    /// Suspend a process (legal hold, pending review).
    pub async fn suspend(
        &self,
        process_id: DbId,
        reason: &str,
        ctx: &ActionContext,
    ) -> EngineResult<RetentionProcess> {
        self.transition(
            process_id,
            ProcessState::Suspended,
            action_types::SUSPENSION,
            format!("Process suspended: {reason}"),
            ctx,
        )
        .await
    }

    /// Return a suspended process to active tracking.
    pub async fn reactivate(
        &self,
        process_id: DbId,
        ctx: &ActionContext,
    ) -> EngineResult<RetentionProcess> {
        self.transition(
            process_id,
            ProcessState::Active,
            action_types::REACTIVATION,
            "Process reactivated".to_string(),
            ctx,
        )
        .await
    }

    // -----------------------------------------------------------------------
    // Elimination lock
    // -----------------------------------------------------------------------

    /// Block the process from elimination, independent of its state.
    pub async fn block_elimination(
        &self,
        process_id: DbId,
        reason: &str,
        ctx: &ActionContext,
    ) -> EngineResult<RetentionProcess> {
        self.set_elimination_block(process_id, true, Some(reason), ctx)
            .await
    }

    /// Lift an elimination block.
    pub async fn unblock_elimination(
        &self,
        process_id: DbId,
        ctx: &ActionContext,
    ) -> EngineResult<RetentionProcess> {
        self.set_elimination_block(process_id, false, None, ctx).await
    }

    async fn set_elimination_block(
        &self,
        process_id: DbId,
        blocked: bool,
        reason: Option<&str>,
        ctx: &ActionContext,
    ) -> EngineResult<RetentionProcess> {
        let mut tx = self.pool.begin().await?;
        let row = RetentionProcessRepo::lock_by_id(&mut tx, process_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "retention_process",
                id: process_id,
            })?;

        let state = row.process_state()?;
        let mut mutation = ProcessMutation::from_row(&row);
        mutation.elimination_blocked = blocked;
        mutation.elimination_block_reason = reason.map(|r| r.to_string());
        mutation.integrity_hash = mutation_hash(&row, &mutation)?;

        let details = field_diff(&[(
            "elimination_blocked",
            serde_json::json!(row.elimination_blocked),
            serde_json::json!(blocked),
        )]);

        let (action_type, description) = if blocked {
            (
                action_types::ELIMINATION_BLOCKED,
                format!(
                    "Elimination blocked: {}",
                    reason.unwrap_or("no reason given")
                ),
            )
        } else {
            (
                action_types::ELIMINATION_UNBLOCKED,
                "Elimination block lifted".to_string(),
            )
        };

        let updated = RetentionProcessRepo::apply_mutation(&mut tx, process_id, &mutation).await?;

        AuditTrail::append(
            &mut tx,
            AuditAction {
                process_id: Some(process_id),
                action_type,
                prior_state: Some(state),
                new_state: Some(state),
                description,
                details: Some(details),
            },
            ctx,
        )
        .await?;

        tx.commit().await?;
        Ok(updated)
    }

    // -----------------------------------------------------------------------
    // Integrity and deletion
    // -----------------------------------------------------------------------

    /// Recompute the snapshot hash from the current row and compare to the
    /// stored value. `false` signals tampering; the record is flagged to
    /// the caller, never repaired.
    pub async fn verify_integrity(&self, process_id: DbId) -> EngineResult<bool> {
        let row = RetentionProcessRepo::find_by_id(&self.pool, process_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "retention_process",
                id: process_id,
            })?;

        let recomputed = retention::compute_process_hash(&row.hash_fields()?);
        let valid = recomputed == row.integrity_hash;
        if !valid {
            tracing::warn!(
                process_id,
                process_code = %row.process_code,
                "Process snapshot hash mismatch"
            );
        }
        Ok(valid)
    }

    /// Soft-delete a process. The row -- itself an auditable record -- stays
    /// in storage; only the `deleted_at` marker is set.
    pub async fn soft_delete(&self, process_id: DbId, ctx: &ActionContext) -> EngineResult<()> {
        let mut tx = self.pool.begin().await?;
        let row = RetentionProcessRepo::lock_by_id(&mut tx, process_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "retention_process",
                id: process_id,
            })?;

        let state = row.process_state()?;
        RetentionProcessRepo::soft_delete(&mut tx, process_id).await?;

        AuditTrail::append(
            &mut tx,
            AuditAction {
                process_id: Some(process_id),
                action_type: action_types::SOFT_DELETE,
                prior_state: Some(state),
                new_state: Some(state),
                description: format!("Retention process {} soft-deleted", row.process_code),
                details: None,
            },
            ctx,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Shared transition skeleton
    // -----------------------------------------------------------------------

    async fn transition(
        &self,
        process_id: DbId,
        target: ProcessState,
        action_type: &'static str,
        description: String,
        ctx: &ActionContext,
    ) -> EngineResult<RetentionProcess> {
        let mut tx = self.pool.begin().await?;
        let row = RetentionProcessRepo::lock_by_id(&mut tx, process_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "retention_process",
                id: process_id,
            })?;

        let prior = row.process_state()?;
        state_machine::validate_transition(prior, target).map_err(CoreError::Guard)?;

        let mut mutation = ProcessMutation::from_row(&row);
        mutation.state = target.as_str().to_string();
        mutation.integrity_hash = mutation_hash(&row, &mutation)?;

        let details = field_diff(&[(
            "state",
            serde_json::json!(prior.as_str()),
            serde_json::json!(target.as_str()),
        )]);

        let updated = RetentionProcessRepo::apply_mutation(&mut tx, process_id, &mutation).await?;

        AuditTrail::append(
            &mut tx,
            AuditAction {
                process_id: Some(process_id),
                action_type,
                prior_state: Some(prior),
                new_state: Some(target),
                description,
                details: Some(details),
            },
            ctx,
        )
        .await?;

        tx.commit().await?;
        Ok(updated)
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Resolve the three lifecycle dates for a create request: explicit dates
/// win (validated for ordering), otherwise the calculator derives them.
fn resolve_dates(
    input: &CreateProcess,
) -> Result<
    (
        Option<CalendarDate>,
        Option<CalendarDate>,
        Option<CalendarDate>,
    ),
    EngineError,
> {
    if let (Some(management), Some(central)) = (input.management_expiry, input.central_expiry) {
        if management > central {
            return Err(CoreError::Validation(
                "management_expiry must not be after central_expiry".to_string(),
            )
            .into());
        }
        let pre_alert = match input.pre_alert_on {
            Some(d) => d,
            None => management
                - chrono::Days::new(
                    input
                        .pre_alert_days
                        .unwrap_or(schedule::DEFAULT_PRE_ALERT_DAYS)
                        .max(0) as u64,
                ),
        };
        if pre_alert > management {
            return Err(CoreError::Validation(
                "pre_alert_on must not be after management_expiry".to_string(),
            )
            .into());
        }
        return Ok((Some(management), Some(central), Some(pre_alert)));
    }

    // No explicit dates: derive, tolerating an unresolvable schedule by
    // leaving the dates unset.
    let dates = schedule::compute_dates(
        input.subject_created_on,
        Some(RetentionPeriods {
            management_years: input.management_years,
            central_years: input.central_years,
        }),
        input.pre_alert_days,
    );
    Ok(match dates {
        Some(d) => (
            Some(d.management_expiry),
            Some(d.central_expiry),
            Some(d.pre_alert_on),
        ),
        None => (None, None, None),
    })
}

/// Snapshot hash for a pending mutation: immutable columns from the loaded
/// row, mutable columns from the mutation.
fn mutation_hash(row: &RetentionProcess, m: &ProcessMutation) -> Result<String, CoreError> {
    let state = ProcessState::parse(&m.state)?;
    let disposition_action = m
        .disposition_action
        .as_deref()
        .map(DispositionAction::parse)
        .transpose()?;
    Ok(retention::compute_process_hash(&ProcessHashFields {
        process_code: &row.process_code,
        subject: row.subject()?,
        schedule_id: row.schedule_id,
        series_id: row.series_id,
        subseries_id: row.subseries_id,
        subject_created_on: row.subject_created_on,
        management_years: row.management_years,
        central_years: row.central_years,
        management_expiry: row.management_expiry,
        central_expiry: row.central_expiry,
        pre_alert_on: row.pre_alert_on,
        state,
        deferred: m.deferred,
        disposition_action,
        elimination_blocked: m.elimination_blocked,
    }))
}

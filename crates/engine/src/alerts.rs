//! Alert generation, de-duplication, lifecycle, and repeat delivery.
//!
//! The engine decides whether an alert is warranted, who receives it, and
//! over which channels; actual channel delivery happens behind
//! [`NotificationDispatch`].

use std::sync::Arc;

use chrono::Duration;
use sqlx::PgPool;

use sgdea_core::alerting::{
    self, channels_for, classify, recipient_roles, repeat_policy, AlertState,
};
use sgdea_core::audit::action_types;
use sgdea_core::error::CoreError;
use sgdea_core::retention::ProcessState;
use sgdea_core::types::{DbId, Timestamp};

use sgdea_db::models::alert::{NewRetentionAlert, RetentionAlert};
use sgdea_db::models::retention_process::RetentionProcess;
use sgdea_db::repositories::AlertRepo;

use crate::audit_trail::{AuditAction, AuditTrail};
use crate::boundary::{NotificationDispatch, SubjectLookup};
use crate::context::ActionContext;
use crate::error::{is_unique_violation, EngineError, EngineResult};

/// Rolling de-dup window: one alert of a given type per process per day.
const DEDUP_WINDOW_HOURS: i64 = 24;

/// Outcome of an alert-generation check that found an alert warranted.
#[derive(Debug, Clone)]
pub enum GeneratedAlert {
    /// A new alert was stored.
    Created(RetentionAlert),
    /// An alert of the same type already existed within the de-dup window.
    Existing(RetentionAlert),
}

impl GeneratedAlert {
    pub fn alert(&self) -> &RetentionAlert {
        match self {
            GeneratedAlert::Created(a) | GeneratedAlert::Existing(a) => a,
        }
    }

    pub fn into_alert(self) -> RetentionAlert {
        match self {
            GeneratedAlert::Created(a) | GeneratedAlert::Existing(a) => a,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, GeneratedAlert::Created(_))
    }
}

/// Generates, tracks, and re-fires retention alerts.
#[derive(Clone)]
pub struct AlertEngine {
    pool: PgPool,
    subjects: Arc<dyn SubjectLookup>,
}

impl AlertEngine {
    pub fn new(pool: PgPool, subjects: Arc<dyn SubjectLookup>) -> Self {
        Self { pool, subjects }
    }

    // -----------------------------------------------------------------------
    // Generation
    // -----------------------------------------------------------------------

    /// Generate an alert for the process if its dates warrant one.
    ///
    /// Returns the pre-existing alert instead of a new one when the same
    /// type was already raised for this process within the last 24 hours;
    /// under concurrent sweeps the daily unique index settles the race the
    /// same way.
    pub async fn generate_if_needed(
        &self,
        process: &RetentionProcess,
        now: Timestamp,
    ) -> EngineResult<Option<GeneratedAlert>> {
        if !process.alerts_active {
            return Ok(None);
        }
        let state = process.process_state()?;
        if !matches!(
            state,
            ProcessState::Active | ProcessState::PreAlert | ProcessState::Expired
        ) {
            return Ok(None);
        }
        let Some(expiry) = process.management_expiry else {
            return Ok(None);
        };

        let days = alerting::days_remaining(expiry, now);
        let Some((alert_type, priority)) = classify(days) else {
            return Ok(None);
        };

        let since = now - Duration::hours(DEDUP_WINDOW_HOURS);
        if let Some(existing) =
            AlertRepo::find_recent_same_type(&self.pool, process.id, alert_type.as_str(), since)
                .await?
        {
            return Ok(Some(GeneratedAlert::Existing(existing)));
        }

        // The subject's creating user joins the role-based recipients.
        let mut user_ids: Vec<DbId> = Vec::new();
        if let Some(info) = self.subjects.subject_info(process.subject()?).await? {
            if let Some(user_id) = info.created_by {
                user_ids.push(user_id);
            }
        }

        let roles = recipient_roles(state);
        let channels: Vec<&str> = channels_for(priority).iter().map(|c| c.as_str()).collect();
        let policy = repeat_policy(priority);

        let (title, message) = render_alert(process, days);

        let dto = NewRetentionAlert {
            process_id: process.id,
            alert_type: alert_type.as_str().to_string(),
            priority: priority.as_str().to_string(),
            title,
            message,
            due_on: Some(expiry),
            recipient_user_ids: serde_json::json!(user_ids),
            recipient_roles: serde_json::json!(roles),
            channels: serde_json::json!(channels),
            repeat_until_attended: policy.repeat_until_attended,
            repeat_interval_hours: policy.interval_hours,
            max_repeats: policy.max_repeats,
        };

        let mut conn = self.pool.acquire().await?;
        match AlertRepo::insert(&mut conn, &dto).await {
            Ok(alert) => Ok(Some(GeneratedAlert::Created(alert))),
            Err(err) if is_unique_violation(&err, "uq_retention_alerts_daily") => {
                // A concurrent sweep won the insert; return its alert.
                drop(conn);
                let existing = AlertRepo::find_recent_same_type(
                    &self.pool,
                    process.id,
                    alert_type.as_str(),
                    since,
                )
                .await?;
                Ok(existing.map(GeneratedAlert::Existing))
            }
            Err(err) => Err(err.into()),
        }
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Mark a pending alert as sent (first delivery done).
    pub async fn mark_sent(&self, alert_id: DbId) -> EngineResult<RetentionAlert> {
        let mut conn = self.pool.acquire().await?;
        match AlertRepo::mark_sent(&mut conn, alert_id).await? {
            Some(alert) => Ok(alert),
            None => Err(self.lifecycle_failure(alert_id, AlertState::Sent).await),
        }
    }

    /// Mark a sent alert as read. Appends an `alert_read` entry to the
    /// owning process's trail in the same transaction.
    pub async fn mark_read(
        &self,
        alert_id: DbId,
        ctx: &ActionContext,
    ) -> EngineResult<RetentionAlert> {
        let mut tx = self.pool.begin().await?;
        let Some(alert) = AlertRepo::mark_read(&mut tx, alert_id).await? else {
            drop(tx);
            return Err(self.lifecycle_failure(alert_id, AlertState::Read).await);
        };

        AuditTrail::append(
            &mut tx,
            AuditAction {
                process_id: Some(alert.process_id),
                action_type: action_types::ALERT_READ,
                prior_state: None,
                new_state: None,
                description: format!("Alert {} read: {}", alert.id, alert.title),
                details: Some(serde_json::json!({"alert_id": alert.id})),
            },
            ctx,
        )
        .await?;

        tx.commit().await?;
        Ok(alert)
    }

    /// Mark a read alert as attended -- the repeat loop stops considering
    /// it. Appends an `alert_attended` entry to the process trail.
    pub async fn mark_attended(
        &self,
        alert_id: DbId,
        ctx: &ActionContext,
    ) -> EngineResult<RetentionAlert> {
        let mut tx = self.pool.begin().await?;
        let Some(alert) = AlertRepo::mark_attended(&mut tx, alert_id).await? else {
            drop(tx);
            return Err(self.lifecycle_failure(alert_id, AlertState::Attended).await);
        };

        AuditTrail::append(
            &mut tx,
            AuditAction {
                process_id: Some(alert.process_id),
                action_type: action_types::ALERT_ATTENDED,
                prior_state: None,
                new_state: None,
                description: format!("Alert {} attended: {}", alert.id, alert.title),
                details: Some(serde_json::json!({"alert_id": alert.id})),
            },
            ctx,
        )
        .await?;

        tx.commit().await?;
        Ok(alert)
    }

    /// Dismiss a pending or sent alert.
    pub async fn dismiss(&self, alert_id: DbId) -> EngineResult<RetentionAlert> {
        let mut conn = self.pool.acquire().await?;
        match AlertRepo::dismiss(&mut conn, alert_id).await? {
            Some(alert) => Ok(alert),
            None => Err(self.lifecycle_failure(alert_id, AlertState::Dismissed).await),
        }
    }

    /// Distinguish "no such alert" from "wrong lifecycle state" after a
    /// guarded transition matched no row.
    async fn lifecycle_failure(&self, alert_id: DbId, target: AlertState) -> EngineError {
        match AlertRepo::find_by_id(&self.pool, alert_id).await {
            Ok(Some(alert)) => CoreError::Guard(format!(
                "Alert {alert_id} cannot move from '{}' to '{}'",
                alert.state,
                target.as_str()
            ))
            .into(),
            Ok(None) => CoreError::NotFound {
                entity: "retention_alert",
                id: alert_id,
            }
            .into(),
            Err(err) => err.into(),
        }
    }

    // -----------------------------------------------------------------------
    // Delivery passes
    // -----------------------------------------------------------------------

    /// First delivery for pending alerts. Returns how many were sent.
    pub async fn deliver_pending(
        &self,
        dispatch: &dyn NotificationDispatch,
        limit: i64,
    ) -> EngineResult<u32> {
        let pending = AlertRepo::list_pending(&self.pool, limit).await?;
        let mut sent = 0u32;
        for alert in pending {
            if let Err(err) = dispatch.deliver(&alert).await {
                tracing::error!(alert_id = alert.id, error = %err, "Alert delivery failed");
                continue;
            }
            let mut conn = self.pool.acquire().await?;
            if AlertRepo::mark_sent(&mut conn, alert.id).await?.is_some() {
                sent += 1;
            }
        }
        Ok(sent)
    }

    /// Re-deliver unattended critical alerts whose repeat interval has
    /// elapsed. The repeat slot is claimed first (guarded, cap-checked
    /// update), so two racing delivery sweeps cannot double-send.
    pub async fn deliver_due_repeats(
        &self,
        dispatch: &dyn NotificationDispatch,
        now: Timestamp,
        limit: i64,
    ) -> EngineResult<u32> {
        let due = AlertRepo::list_repeat_due(&self.pool, now, limit).await?;
        let mut repeated = 0u32;
        for alert in due {
            // SQL narrows the candidates; the domain predicate decides.
            if !alerting::repeat_due(&alert.repeat_snapshot()?, now) {
                continue;
            }
            let mut conn = self.pool.acquire().await?;
            let Some(claimed) = AlertRepo::register_repeat(&mut conn, alert.id).await? else {
                continue;
            };
            drop(conn);
            if let Err(err) = dispatch.deliver(&claimed).await {
                tracing::error!(
                    alert_id = claimed.id,
                    repeats_sent = claimed.repeats_sent,
                    error = %err,
                    "Alert repeat delivery failed"
                );
                continue;
            }
            repeated += 1;
        }
        Ok(repeated)
    }
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

/// Title and message for a generated alert.
fn render_alert(process: &RetentionProcess, days_remaining: i64) -> (String, String) {
    let code = &process.process_code;
    if days_remaining <= 0 {
        let overdue = -days_remaining;
        (
            format!("Retention period expired: {code}"),
            format!(
                "The management-archive retention period for process {code} \
                 expired {overdue} day(s) ago. A disposition decision is required."
            ),
        )
    } else {
        (
            format!("Retention period expiring soon: {code}"),
            format!(
                "The management-archive retention period for process {code} \
                 expires in {days_remaining} day(s)."
            ),
        )
    }
}

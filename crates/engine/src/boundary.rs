//! Boundary traits for the subsystems the engine consumes but does not
//! own: subject metadata, TRD schedules, the user directory, and
//! notification channel delivery.
//!
//! Lookup failures are [`CoreError::External`] so callers can retry or
//! page an operator -- they are never folded into "no data". A lookup that
//! succeeds but finds nothing returns `Ok(None)`.

use async_trait::async_trait;

use sgdea_core::error::CoreError;
use sgdea_core::retention::Subject;
use sgdea_core::schedule::RetentionPeriods;
use sgdea_core::types::{CalendarDate, DbId};

use sgdea_db::models::alert::RetentionAlert;

// ---------------------------------------------------------------------------
// Subject lookup
// ---------------------------------------------------------------------------

/// What the engine needs to know about a document or case file.
#[derive(Debug, Clone)]
pub struct SubjectInfo {
    pub created_on: CalendarDate,
    /// User who created the subject; included among alert recipients.
    pub created_by: Option<DbId>,
    pub series_id: DbId,
    pub subseries_id: Option<DbId>,
}

/// Resolves a subject reference against the document/case-file store.
#[async_trait]
pub trait SubjectLookup: Send + Sync {
    async fn subject_info(&self, subject: Subject) -> Result<Option<SubjectInfo>, CoreError>;
}

// ---------------------------------------------------------------------------
// Schedule lookup
// ---------------------------------------------------------------------------

/// Resolves a TRD schedule reference to its retention periods.
#[async_trait]
pub trait ScheduleLookup: Send + Sync {
    async fn retention_periods(
        &self,
        schedule_id: DbId,
    ) -> Result<Option<RetentionPeriods>, CoreError>;
}

// ---------------------------------------------------------------------------
// User directory
// ---------------------------------------------------------------------------

/// Display data for audit and alert rendering.
#[derive(Debug, Clone)]
pub struct UserInfo {
    pub display_name: String,
    pub email: Option<String>,
}

/// Resolves user ids against the identity subsystem.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn user_info(&self, user_id: DbId) -> Result<Option<UserInfo>, CoreError>;
}

// ---------------------------------------------------------------------------
// Notification dispatch
// ---------------------------------------------------------------------------

/// Delivers an alert over its resolved channels.
///
/// The engine decides *whether* and *to whom*; how each channel delivers
/// (SMTP, push gateway, in-app inbox) lives behind this trait.
#[async_trait]
pub trait NotificationDispatch: Send + Sync {
    async fn deliver(&self, alert: &RetentionAlert) -> Result<(), CoreError>;
}

// ---------------------------------------------------------------------------
// Stand-in implementations
// ---------------------------------------------------------------------------

/// Subject lookup for deployments where the document store integration is
/// not wired: every subject resolves to "unknown" rather than an error, so
/// alert generation proceeds without a creating-user recipient.
pub struct UnresolvedSubjects;

#[async_trait]
impl SubjectLookup for UnresolvedSubjects {
    async fn subject_info(&self, _subject: Subject) -> Result<Option<SubjectInfo>, CoreError> {
        Ok(None)
    }
}

/// Dispatch that records deliveries in the log instead of fanning out to
/// channels. The in-app ("system") channel reads alerts straight from the
/// table, so this is enough for single-node deployments.
pub struct LogDispatch;

#[async_trait]
impl NotificationDispatch for LogDispatch {
    async fn deliver(&self, alert: &RetentionAlert) -> Result<(), CoreError> {
        tracing::info!(
            alert_id = alert.id,
            process_id = alert.process_id,
            alert_type = %alert.alert_type,
            priority = %alert.priority,
            channels = %alert.channels,
            "Alert delivery"
        );
        Ok(())
    }
}

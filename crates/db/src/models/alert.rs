//! Retention alert entity model and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use sgdea_core::alerting::{AlertState, RepeatSnapshot};
use sgdea_core::error::CoreError;
use sgdea_core::types::{CalendarDate, DbId, Timestamp};

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A row from the `retention_alerts` table.
///
/// Recipient and channel lists are JSONB columns -- flat arrays, no
/// relational normalization.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RetentionAlert {
    pub id: DbId,
    pub process_id: DbId,
    pub alert_type: String,
    pub priority: String,
    pub title: String,
    pub message: String,
    pub due_on: Option<CalendarDate>,
    pub recipient_user_ids: serde_json::Value,
    pub recipient_roles: serde_json::Value,
    pub channels: serde_json::Value,
    pub state: String,
    pub sent_at: Option<Timestamp>,
    pub read_at: Option<Timestamp>,
    pub attended_at: Option<Timestamp>,
    pub repeat_until_attended: bool,
    pub repeat_interval_hours: i32,
    pub max_repeats: i32,
    pub repeats_sent: i32,
    pub created_at: Timestamp,
}

impl RetentionAlert {
    /// Parsed lifecycle state.
    pub fn alert_state(&self) -> Result<AlertState, CoreError> {
        AlertState::parse(&self.state)
    }

    /// The field view the repeat-due check evaluates.
    pub fn repeat_snapshot(&self) -> Result<RepeatSnapshot, CoreError> {
        Ok(RepeatSnapshot {
            state: self.alert_state()?,
            repeat_until_attended: self.repeat_until_attended,
            repeat_interval_hours: self.repeat_interval_hours,
            max_repeats: self.max_repeats,
            repeats_sent: self.repeats_sent,
            sent_at: self.sent_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Create DTO
// ---------------------------------------------------------------------------

/// DTO for inserting a new alert in `pending` state.
#[derive(Debug, Clone, Deserialize)]
pub struct NewRetentionAlert {
    pub process_id: DbId,
    pub alert_type: String,
    pub priority: String,
    pub title: String,
    pub message: String,
    pub due_on: Option<CalendarDate>,
    pub recipient_user_ids: serde_json::Value,
    pub recipient_roles: serde_json::Value,
    pub channels: serde_json::Value,
    pub repeat_until_attended: bool,
    pub repeat_interval_hours: i32,
    pub max_repeats: i32,
}

//! Alert classification rules: type/priority thresholds, recipient and
//! channel resolution, repeat policy, and the alert lifecycle table.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::retention::ProcessState;
use crate::types::{CalendarDate, Timestamp};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// What an alert is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    UpcomingExpiry,
    CurrentExpiry,
    ActionRequired,
    ProcessError,
    DispositionConfirmation,
}

impl AlertType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertType::UpcomingExpiry => "upcoming_expiry",
            AlertType::CurrentExpiry => "current_expiry",
            AlertType::ActionRequired => "action_required",
            AlertType::ProcessError => "process_error",
            AlertType::DispositionConfirmation => "disposition_confirmation",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "upcoming_expiry" => Ok(AlertType::UpcomingExpiry),
            "current_expiry" => Ok(AlertType::CurrentExpiry),
            "action_required" => Ok(AlertType::ActionRequired),
            "process_error" => Ok(AlertType::ProcessError),
            "disposition_confirmation" => Ok(AlertType::DispositionConfirmation),
            _ => Err(CoreError::Validation(format!("Unknown alert type: '{s}'"))),
        }
    }
}

/// How urgently an alert should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl AlertPriority {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertPriority::Low => "low",
            AlertPriority::Medium => "medium",
            AlertPriority::High => "high",
            AlertPriority::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "low" => Ok(AlertPriority::Low),
            "medium" => Ok(AlertPriority::Medium),
            "high" => Ok(AlertPriority::High),
            "critical" => Ok(AlertPriority::Critical),
            _ => Err(CoreError::Validation(format!(
                "Unknown alert priority: '{s}'"
            ))),
        }
    }
}

/// Delivery lifecycle of an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Pending,
    Sent,
    Read,
    Attended,
    Dismissed,
}

impl AlertState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Pending => "pending",
            AlertState::Sent => "sent",
            AlertState::Read => "read",
            AlertState::Attended => "attended",
            AlertState::Dismissed => "dismissed",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "pending" => Ok(AlertState::Pending),
            "sent" => Ok(AlertState::Sent),
            "read" => Ok(AlertState::Read),
            "attended" => Ok(AlertState::Attended),
            "dismissed" => Ok(AlertState::Dismissed),
            _ => Err(CoreError::Validation(format!("Unknown alert state: '{s}'"))),
        }
    }

    /// Returns the set of valid target states reachable from `self`.
    pub fn valid_transitions(&self) -> &'static [AlertState] {
        match self {
            AlertState::Pending => &[AlertState::Sent, AlertState::Dismissed],
            AlertState::Sent => &[AlertState::Read, AlertState::Dismissed],
            AlertState::Read => &[AlertState::Attended],
            AlertState::Attended | AlertState::Dismissed => &[],
        }
    }

    pub fn can_transition(&self, to: AlertState) -> bool {
        self.valid_transitions().contains(&to)
    }
}

/// Delivery channel for an alert. Actual delivery is a boundary concern;
/// the engine only decides the channel set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Email,
    System,
    Push,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::System => "system",
            Channel::Push => "push",
        }
    }
}

// ---------------------------------------------------------------------------
// Recipient roles
// ---------------------------------------------------------------------------

/// Role names resolved by the external user directory.
pub mod roles {
    pub const ARCHIVIST: &str = "archivist";
    pub const ADMINISTRATOR: &str = "administrator";
    pub const GENERAL_ADMINISTRATOR: &str = "general_administrator";
    pub const ARCHIVE_CHIEF: &str = "archive_chief";
}

/// Roles notified for a process in the given state.
///
/// Archivists and administrators always receive retention alerts; once the
/// process is in pre-alert or expired, escalation roles join.
pub fn recipient_roles(state: ProcessState) -> Vec<&'static str> {
    let mut out = vec![roles::ARCHIVIST, roles::ADMINISTRATOR];
    if matches!(state, ProcessState::Expired | ProcessState::PreAlert) {
        out.push(roles::GENERAL_ADMINISTRATOR);
        out.push(roles::ARCHIVE_CHIEF);
    }
    out
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

/// Signed days from `now` to the management expiry; negative means overdue.
pub fn days_remaining(management_expiry: CalendarDate, now: Timestamp) -> i64 {
    (management_expiry - now.date_naive()).num_days()
}

/// Classify days-remaining into an alert type and priority.
///
/// More than 30 days out, no alert is warranted and `None` is returned.
pub fn classify(days_remaining: i64) -> Option<(AlertType, AlertPriority)> {
    match days_remaining {
        d if d <= 0 => Some((AlertType::CurrentExpiry, AlertPriority::Critical)),
        d if d <= 7 => Some((AlertType::UpcomingExpiry, AlertPriority::High)),
        d if d <= 30 => Some((AlertType::UpcomingExpiry, AlertPriority::Medium)),
        _ => None,
    }
}

/// Delivery channels for a priority, in dispatch order.
pub fn channels_for(priority: AlertPriority) -> &'static [Channel] {
    match priority {
        AlertPriority::Critical => &[Channel::Email, Channel::System, Channel::Push],
        AlertPriority::High => &[Channel::Email, Channel::System],
        AlertPriority::Medium => &[Channel::System, Channel::Email],
        AlertPriority::Low => &[Channel::System],
    }
}

// ---------------------------------------------------------------------------
// Repeat policy
// ---------------------------------------------------------------------------

/// How often an unattended alert re-fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepeatPolicy {
    pub repeat_until_attended: bool,
    pub interval_hours: i32,
    pub max_repeats: i32,
}

/// Repeat policy for a priority: critical alerts nag every 4 hours up to
/// 10 times until attended; everything else gets a daily reminder, 3 max.
pub fn repeat_policy(priority: AlertPriority) -> RepeatPolicy {
    if priority == AlertPriority::Critical {
        RepeatPolicy {
            repeat_until_attended: true,
            interval_hours: 4,
            max_repeats: 10,
        }
    } else {
        RepeatPolicy {
            repeat_until_attended: false,
            interval_hours: 24,
            max_repeats: 3,
        }
    }
}

/// The alert fields the repeat-due check looks at.
#[derive(Debug, Clone, Copy)]
pub struct RepeatSnapshot {
    pub state: AlertState,
    pub repeat_until_attended: bool,
    pub repeat_interval_hours: i32,
    pub max_repeats: i32,
    pub repeats_sent: i32,
    pub sent_at: Option<Timestamp>,
}

/// True iff the alert is due for another delivery pass.
pub fn repeat_due(snapshot: &RepeatSnapshot, now: Timestamp) -> bool {
    if !snapshot.repeat_until_attended
        || snapshot.state != AlertState::Sent
        || snapshot.repeats_sent >= snapshot.max_repeats
    {
        return false;
    }
    match snapshot.sent_at {
        Some(sent_at) => {
            (now - sent_at).num_hours() >= i64::from(snapshot.repeat_interval_hours)
        }
        None => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

//! Retention schedule date derivation.
//!
//! Pure calendar arithmetic: given the subject's creation date and the TRD
//! retention periods, derive the management-archive expiry, central-archive
//! expiry, and pre-alert date. Year addition is calendar-based (Feb 29
//! clamps to Feb 28 on non-leap targets), never wall-clock.

use chrono::Months;

use crate::types::CalendarDate;

/// Days before management expiry at which advance warnings start, unless
/// the schedule specifies otherwise.
pub const DEFAULT_PRE_ALERT_DAYS: i64 = 30;

/// Retention periods resolved from a TRD schedule, in years.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPeriods {
    /// Years in the management archive (archivo de gestión).
    pub management_years: i32,
    /// Years in the central archive after management expiry.
    pub central_years: i32,
}

/// The three derived lifecycle dates for a retention process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleDates {
    pub management_expiry: CalendarDate,
    pub central_expiry: CalendarDate,
    pub pre_alert_on: CalendarDate,
}

/// Derive the lifecycle dates for a subject created on `created_on`.
///
/// Returns `None` when no schedule is available or the periods are not
/// usable (negative years, out-of-range dates) -- missing schedules leave
/// the dates unset rather than failing the whole operation.
pub fn compute_dates(
    created_on: CalendarDate,
    periods: Option<RetentionPeriods>,
    pre_alert_days: Option<i64>,
) -> Option<ScheduleDates> {
    let periods = periods?;
    if periods.management_years < 0 || periods.central_years < 0 {
        return None;
    }

    let management_expiry =
        created_on.checked_add_months(Months::new(periods.management_years as u32 * 12))?;
    let central_expiry =
        management_expiry.checked_add_months(Months::new(periods.central_years as u32 * 12))?;

    let days = pre_alert_days.unwrap_or(DEFAULT_PRE_ALERT_DAYS).max(0);
    let pre_alert_on = management_expiry.checked_sub_days(chrono::Days::new(days as u64))?;

    Some(ScheduleDates {
        management_expiry,
        central_expiry,
        pre_alert_on,
    })
}

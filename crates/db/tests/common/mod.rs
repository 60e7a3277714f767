//! Shared fixtures for db integration tests.

use sgdea_core::retention::{
    compute_process_hash, ProcessHashFields, ProcessState, Subject,
};
use sgdea_db::models::retention_process::NewRetentionProcess;

/// Build an insertable process DTO with a consistent snapshot hash.
pub fn new_process(code: &str, subject: Subject) -> NewRetentionProcess {
    let subject_created_on = chrono::NaiveDate::from_ymd_opt(2020, 1, 1).unwrap();
    let management_expiry = chrono::NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
    let central_expiry = chrono::NaiveDate::from_ymd_opt(2035, 1, 1).unwrap();
    let pre_alert_on = chrono::NaiveDate::from_ymd_opt(2024, 12, 2).unwrap();

    let integrity_hash = compute_process_hash(&ProcessHashFields {
        process_code: code,
        subject,
        schedule_id: 1,
        series_id: 1,
        subseries_id: None,
        subject_created_on,
        management_years: 5,
        central_years: 10,
        management_expiry: Some(management_expiry),
        central_expiry: Some(central_expiry),
        pre_alert_on: Some(pre_alert_on),
        state: ProcessState::Active,
        deferred: false,
        disposition_action: None,
        elimination_blocked: false,
    });

    NewRetentionProcess {
        process_code: code.to_string(),
        subject_type: subject.type_str().to_string(),
        document_id: match subject {
            Subject::Document(id) => Some(id),
            Subject::CaseFile(_) => None,
        },
        case_file_id: match subject {
            Subject::CaseFile(id) => Some(id),
            Subject::Document(_) => None,
        },
        schedule_id: 1,
        series_id: 1,
        subseries_id: None,
        subject_created_on,
        management_years: 5,
        central_years: 10,
        management_expiry: Some(management_expiry),
        central_expiry: Some(central_expiry),
        pre_alert_on: Some(pre_alert_on),
        state: ProcessState::Active.as_str().to_string(),
        alerts_active: true,
        integrity_hash,
    }
}

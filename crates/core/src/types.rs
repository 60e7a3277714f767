/// All database primary keys are PostgreSQL BIGSERIAL.
pub type DbId = i64;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Calendar dates (retention deadlines) carry no time-of-day component.
pub type CalendarDate = chrono::NaiveDate;

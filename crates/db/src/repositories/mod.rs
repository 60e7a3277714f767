//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` for standalone reads, or `&mut PgConnection` where the
//! caller owns the transaction (state mutation + audit append must commit
//! or roll back as a unit).

pub mod alert_repo;
pub mod audit_entry_repo;
pub mod retention_process_repo;

pub use alert_repo::AlertRepo;
pub use audit_entry_repo::AuditEntryRepo;
pub use retention_process_repo::RetentionProcessRepo;

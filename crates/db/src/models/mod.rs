//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - A `Deserialize` create DTO for inserts
//! - Query parameter structs where the table has a filter surface

pub mod alert;
pub mod audit_entry;
pub mod retention_process;

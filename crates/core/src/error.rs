use crate::types::DbId;

/// Domain error taxonomy for the retention engine.
///
/// `Validation` and `Guard` are recoverable and surfaced to the caller as
/// typed results. `Integrity` and `Immutable` are fatal for the operation
/// that raised them but never for the service as a whole -- the sweep keeps
/// going. `External` marks a boundary-collaborator failure so callers can
/// retry instead of misreading it as "no data".
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: &'static str, id: DbId },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Transition not allowed: {0}")]
    Guard(String),

    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error("Audit entries are immutable: {0}")]
    Immutable(String),

    #[error("External dependency failed: {0}")]
    External(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

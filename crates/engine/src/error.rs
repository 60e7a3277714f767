//! Engine-level error type over the core taxonomy.

use sgdea_core::error::CoreError;

/// Error type for engine operations.
///
/// Wraps [`CoreError`] for domain errors and adds the persistence layer.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A domain-level error from `sgdea_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Convenience type alias for engine return values.
pub type EngineResult<T> = Result<T, EngineError>;

/// True when the error is a PostgreSQL unique-constraint violation on the
/// given constraint (name prefix match, `uq_` convention).
pub fn is_unique_violation(err: &sqlx::Error, constraint: &str) -> bool {
    match err {
        sqlx::Error::Database(db_err) => {
            db_err.code().as_deref() == Some("23505")
                && db_err.constraint().is_some_and(|c| c.starts_with(constraint))
        }
        _ => false,
    }
}

/// True when the error came from the append-only trigger on the audit
/// ledger -- the schema's enforcement of entry immutability.
pub fn is_immutability_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.message().contains("append-only"),
        _ => false,
    }
}

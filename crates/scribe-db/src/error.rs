//! Database error types for scribe-db.

use scribe_core::errors::CoreError;
use thiserror::Error;

/// Errors from database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// A SQL query failed.
    #[error("Query failed: {0}")]
    Query(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    Migration(String),

    /// Expected a result row but none was returned.
    #[error("No result returned")]
    NoResult,

    /// Invalid state encountered (e.g., bad data in DB).
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A BEGIN, COMMIT, ROLLBACK, SAVEPOINT, or RELEASE was sent as a host
    /// statement.
    #[error("transaction control statement '{0}' rejected; use AuditTransaction::commit or rollback")]
    TransactionControl(String),

    /// The connection left the transaction before the audit rows were written.
    #[error("transaction is no longer active; audit records not written")]
    TransactionInactive,

    /// Building the audit records failed.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Underlying libSQL error.
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

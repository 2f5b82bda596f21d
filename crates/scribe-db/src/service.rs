//! Service layer tying the audit database to the process-wide auditor.
//!
//! `AuditService` wraps `ScribeDb` (raw database access) and an `Auditor`
//! (metadata, filter, resolvers). Transactions begin here; history queries
//! are implemented as `impl AuditService` in [`crate::repos`].

use std::sync::Arc;

use scribe_core::auditor::Auditor;

use crate::ScribeDb;
use crate::error::DatabaseError;
use crate::transaction::AuditTransaction;

/// Entry point for audited writes and audit history reads.
///
/// Every audited write follows this protocol:
/// 1. `begin()` a transaction
/// 2. `observe()` the host's pending changes
/// 3. Execute the host's SQL
/// 4. `commit()`: build records, write them, then COMMIT
pub struct AuditService {
    db: ScribeDb,
    auditor: Arc<Auditor>,
}

impl AuditService {
    /// Create a service over a local database.
    ///
    /// # Arguments
    ///
    /// * `db_path` - Path to the libSQL database file, or `":memory:"` for tests.
    /// * `auditor` - Metadata, filter and resolvers shared by every transaction.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened.
    pub async fn new_local(db_path: &str, auditor: Auditor) -> Result<Self, DatabaseError> {
        let db = ScribeDb::open_local(db_path).await?;
        Ok(Self::from_db(db, auditor))
    }

    /// Create from an existing `ScribeDb`.
    #[must_use]
    pub fn from_db(db: ScribeDb, auditor: Auditor) -> Self {
        Self {
            db,
            auditor: Arc::new(auditor),
        }
    }

    /// Access the underlying database handle.
    #[must_use]
    pub const fn db(&self) -> &ScribeDb {
        &self.db
    }

    #[must_use]
    pub fn auditor(&self) -> &Auditor {
        &self.auditor
    }

    /// Begin an audited transaction with an empty staging buffer.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::LibSql` if BEGIN fails, e.g. because another
    /// transaction is still open on the connection.
    pub async fn begin(&self) -> Result<AuditTransaction, DatabaseError> {
        let tx = self.db.conn().transaction().await?;
        Ok(AuditTransaction::new(tx, Arc::clone(&self.auditor)))
    }
}

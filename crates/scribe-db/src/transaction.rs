//! The audited transaction: host statements in, audit rows flushed before COMMIT.
//!
//! ```text
//! begin ─► execute/query … ─► observe(source) ─► execute/query … ─► commit(source)
//!                              │ stage, arm                           │ disarm
//!                              ▼                                      ▼
//!                         TransactionScope                  build records ─► flush ─► COMMIT
//!                                                                  │ error
//!                                                                  ▼
//!                                                              ROLLBACK
//! ```

use std::sync::Arc;

use libsql::params::IntoParams;
use scribe_core::auditor::Auditor;
use scribe_core::changes::ChangeSource;
use scribe_core::entity::EntitySnapshot;
use scribe_core::interceptor::{StatementVerdict, is_transaction_control};
use scribe_core::scope::TransactionScope;

use crate::error::DatabaseError;
use crate::flusher::Flusher;

/// Outcome of a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitSummary {
    /// Ids of the `audit_logs` rows written, in flush order.
    pub audit_ids: Vec<i64>,
}

impl CommitSummary {
    #[must_use]
    pub fn records(&self) -> usize {
        self.audit_ids.len()
    }
}

/// A database transaction whose commit also writes the audit trail.
///
/// Dropping it without calling [`AuditTransaction::commit`] rolls the
/// transaction back and discards everything staged.
pub struct AuditTransaction {
    tx: libsql::Transaction,
    scope: TransactionScope,
    auditor: Arc<Auditor>,
}

impl AuditTransaction {
    pub(crate) fn new(tx: libsql::Transaction, auditor: Arc<Auditor>) -> Self {
        Self {
            tx,
            scope: TransactionScope::new(),
            auditor,
        }
    }

    /// Execute a host statement inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::TransactionControl` for BEGIN, COMMIT, END,
    /// ROLLBACK, SAVEPOINT, or RELEASE, staged records or not, and
    /// `DatabaseError::LibSql` if the statement fails.
    pub async fn execute(&self, sql: &str, params: impl IntoParams) -> Result<u64, DatabaseError> {
        reject_transaction_control(sql)?;
        tracing::trace!(sql, "execute");
        Ok(self.tx.execute(sql, params).await?)
    }

    /// Run a host query inside the transaction.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::TransactionControl` like [`Self::execute`], or
    /// `DatabaseError::LibSql` if the query fails.
    pub async fn query(
        &self,
        sql: &str,
        params: impl IntoParams,
    ) -> Result<libsql::Rows, DatabaseError> {
        reject_transaction_control(sql)?;
        tracing::trace!(sql, "query");
        Ok(self.tx.query(sql, params).await?)
    }

    /// Key generated by the last INSERT on this transaction's connection.
    #[must_use]
    pub fn last_insert_rowid(&self) -> i64 {
        self.tx.last_insert_rowid()
    }

    /// Stage the pending changes of `source`. Call it once the host knows
    /// what it will write, before running the SQL for it. Returns the number
    /// of newly staged operations.
    pub fn observe(&mut self, source: &dyn ChangeSource) -> usize {
        self.scope.observe(&self.auditor, source)
    }

    /// Blame `actor` for every record of this transaction, overriding the
    /// auditor's blamer.
    pub fn blame_as(&mut self, actor: EntitySnapshot) {
        self.scope.blame_as(actor);
    }

    /// Whether staged records are waiting for the commit.
    #[must_use]
    pub const fn is_armed(&self) -> bool {
        self.scope.is_armed()
    }

    /// Flush staged records, then COMMIT.
    ///
    /// `source` is consulted again so keys generated by the host's INSERTs
    /// and changes made after `observe` end up in the records.
    ///
    /// # Errors
    ///
    /// If records cannot be built or written, the transaction is rolled back,
    /// the host's changes included, and the error is returned. Returns
    /// `DatabaseError::TransactionInactive` without writing anything if the
    /// connection already left the transaction.
    pub async fn commit(mut self, source: &dyn ChangeSource) -> Result<CommitSummary, DatabaseError> {
        let audit_ids = match self.scope.inspect("COMMIT") {
            StatementVerdict::Flush => match self.flush(source).await {
                Ok(ids) => ids,
                Err(err) => {
                    tracing::warn!(error = %err, "audit flush failed, rolling back");
                    if !self.tx.is_autocommit() {
                        if let Err(rollback) = self.tx.rollback().await {
                            tracing::warn!(error = %rollback, "rollback after failed flush");
                        }
                    }
                    return Err(err);
                }
            },
            StatementVerdict::PassThrough => {
                if self.tx.is_autocommit() {
                    return Err(DatabaseError::TransactionInactive);
                }
                Vec::new()
            }
        };

        self.tx.commit().await?;
        tracing::debug!(records = audit_ids.len(), "audited transaction committed");
        Ok(CommitSummary { audit_ids })
    }

    async fn flush(&mut self, source: &dyn ChangeSource) -> Result<Vec<i64>, DatabaseError> {
        let records = self.scope.before_commit(&self.auditor, source)?;
        if self.tx.is_autocommit() {
            tracing::warn!(records = records.len(), "transaction ended before flush");
            return Err(DatabaseError::TransactionInactive);
        }
        if records.is_empty() {
            return Ok(Vec::new());
        }
        let mut flusher = Flusher::prepare(&self.tx).await?;
        flusher.write_all(&records).await
    }

    /// Roll back the host's changes and discard staged records.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::LibSql` if ROLLBACK fails.
    pub async fn rollback(self) -> Result<(), DatabaseError> {
        let staged = self.scope.staged().len();
        self.tx.rollback().await?;
        tracing::debug!(discarded = staged, "audited transaction rolled back");
        Ok(())
    }
}

fn reject_transaction_control(sql: &str) -> Result<(), DatabaseError> {
    if is_transaction_control(sql) {
        return Err(DatabaseError::TransactionControl(sql.trim().to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use scribe_core::tracker::ChangeTracker;

    use super::*;
    use crate::test_support::helpers::{PRODUCT, count, test_service};

    #[tokio::test]
    async fn literal_commit_is_rejected_while_armed() {
        let svc = test_service().await;
        let mut uow = ChangeTracker::new();
        uow.persist(EntitySnapshot::detached(PRODUCT).with_field("title", "Widget"));

        let mut tx = svc.begin().await.unwrap();
        tx.observe(&uow);
        assert!(tx.is_armed());
        let err = tx.execute("commit;", ()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::TransactionControl(_)));

        let summary = tx.commit(&uow).await.unwrap();
        assert_eq!(summary.records(), 1);
    }

    #[tokio::test]
    async fn transaction_control_is_rejected_while_idle() {
        let svc = test_service().await;
        let uow = ChangeTracker::new();

        let tx = svc.begin().await.unwrap();
        assert!(!tx.is_armed());
        for sql in ["COMMIT", "savepoint sp1", "BEGIN"] {
            let err = tx.execute(sql, ()).await.unwrap_err();
            assert!(matches!(err, DatabaseError::TransactionControl(_)), "{sql}");
        }
        let err = tx.query("ROLLBACK", ()).await.unwrap_err();
        assert!(matches!(err, DatabaseError::TransactionControl(_)));

        tx.commit(&uow).await.unwrap();
    }

    #[tokio::test]
    async fn commit_without_staged_work_writes_nothing() {
        let svc = test_service().await;
        let uow = ChangeTracker::new();

        let mut tx = svc.begin().await.unwrap();
        assert_eq!(tx.observe(&uow), 0);
        assert!(!tx.is_armed());
        let summary = tx.commit(&uow).await.unwrap();

        assert_eq!(summary, CommitSummary::default());
        assert_eq!(count(&svc, "audit_logs").await, 0);
    }

    #[tokio::test]
    async fn rollback_discards_staged_records() {
        let svc = test_service().await;
        let mut uow = ChangeTracker::new();
        uow.persist(EntitySnapshot::detached(PRODUCT).with_field("title", "Widget"));

        let mut tx = svc.begin().await.unwrap();
        tx.observe(&uow);
        tx.rollback().await.unwrap();

        assert_eq!(count(&svc, "audit_logs").await, 0);
        assert_eq!(count(&svc, "audit_associations").await, 0);
    }
}

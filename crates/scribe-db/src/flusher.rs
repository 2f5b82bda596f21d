//! Writes built audit records inside the host's still-open transaction.
//!
//! Each record needs up to three association rows (source, target, actor)
//! written first so their generated keys can go into the log row. Both
//! INSERT statements are prepared once per flush.

use chrono::Utc;
use libsql::{Connection, Statement};
use scribe_core::record::{AuditRecord, Reference};

use crate::error::DatabaseError;

const INSERT_ASSOCIATION: &str = "INSERT INTO audit_associations (typ, tbl, label, fk, class)
     VALUES (?1, ?2, ?3, ?4, ?5)";

const INSERT_AUDIT_LOG: &str =
    "INSERT INTO audit_logs (action, tbl, source_id, target_id, blame_id, diff, logged_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)";

/// Prepared statements of one flush.
pub struct Flusher<'c> {
    conn: &'c Connection,
    association: Statement,
    audit_log: Statement,
}

impl<'c> Flusher<'c> {
    /// Prepare both statements on `conn`.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError::LibSql` if either statement cannot be prepared,
    /// e.g. because the audit tables are missing.
    pub async fn prepare(conn: &'c Connection) -> Result<Self, DatabaseError> {
        let association = conn.prepare(INSERT_ASSOCIATION).await?;
        let audit_log = conn.prepare(INSERT_AUDIT_LOG).await?;
        Ok(Self {
            conn,
            association,
            audit_log,
        })
    }

    /// Write every record in order and return the generated log ids.
    ///
    /// # Errors
    ///
    /// Returns the first write failure; earlier rows are left for the
    /// caller's rollback.
    pub async fn write_all(&mut self, records: &[AuditRecord]) -> Result<Vec<i64>, DatabaseError> {
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            ids.push(self.write_audit_record(record).await?);
        }
        tracing::debug!(count = ids.len(), "audit records flushed");
        Ok(ids)
    }

    /// Write one record: its association rows, then the log row.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if an INSERT fails or the diff cannot be encoded.
    pub async fn write_audit_record(&mut self, record: &AuditRecord) -> Result<i64, DatabaseError> {
        let source_id = self.write_association(&record.source).await?;
        let target_id = match &record.target {
            Some(target) => Some(self.write_association(target).await?),
            None => None,
        };
        let blame_id = match &record.blame {
            Some(blame) => Some(self.write_association(blame).await?),
            None => None,
        };
        let diff = record
            .diff
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| DatabaseError::Query(format!("Failed to encode diff: {e}")))?;

        self.audit_log
            .execute(libsql::params![
                record.action.as_str(),
                record.table.as_str(),
                source_id,
                target_id,
                blame_id,
                diff,
                Utc::now().to_rfc3339()
            ])
            .await?;
        self.audit_log.reset();
        let id = self.conn.last_insert_rowid();
        tracing::trace!(id, action = %record.action, table = %record.table, "audit log row written");
        Ok(id)
    }

    async fn write_association(&mut self, reference: &Reference) -> Result<i64, DatabaseError> {
        self.association
            .execute(libsql::params![
                reference.typ.as_str(),
                reference.table.as_deref(),
                reference.label.as_deref(),
                reference.foreign_key_text(),
                reference.class.as_str()
            ])
            .await?;
        self.association.reset();
        Ok(self.conn.last_insert_rowid())
    }
}

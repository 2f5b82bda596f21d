//! # scribe-db
//!
//! libSQL persistence for scribe audit records.
//!
//! Owns the audit schema, the audited transaction that intercepts COMMIT,
//! the flusher that writes association and log rows inside that transaction,
//! and the history queries behind `scribe log` / `scribe show`.
//!
//! Uses the `libsql` crate (C `SQLite` fork, v0.9.29) in local mode.

pub mod error;
pub mod flusher;
pub mod helpers;
mod migrations;
pub mod repos;
pub mod service;
pub mod transaction;

mod test_support;

use error::DatabaseError;
use libsql::Builder;

/// Database handle for the audit tables and the host's own tables.
///
/// Audit rows must commit atomically with the host's changes, so the host
/// runs its statements on this same connection through an
/// [`transaction::AuditTransaction`].
pub struct ScribeDb {
    #[allow(dead_code)]
    db: libsql::Database,
    conn: libsql::Connection,
}

impl ScribeDb {
    /// Open a local database at the given path with foreign keys enforced.
    ///
    /// Runs migrations automatically on first open.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local(path: &str) -> Result<Self, DatabaseError> {
        Self::open_local_with(path, true).await
    }

    /// Open a local database, choosing whether foreign keys are enforced.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the database cannot be opened or
    /// migrations fail.
    pub async fn open_local_with(path: &str, foreign_keys: bool) -> Result<Self, DatabaseError> {
        let db = Builder::new_local(path).build().await?;
        let conn = db.connect()?;

        // Per-connection in SQLite.
        let pragma = if foreign_keys {
            "PRAGMA foreign_keys = ON"
        } else {
            "PRAGMA foreign_keys = OFF"
        };
        conn.execute(pragma, ())
            .await
            .map_err(|e| DatabaseError::Migration(format!("{pragma}: {e}")))?;

        let scribe_db = Self { db, conn };
        scribe_db.run_migrations().await?;
        tracing::debug!(path, foreign_keys, "audit database opened");
        Ok(scribe_db)
    }

    /// Access the underlying libSQL connection for direct queries.
    #[must_use]
    pub const fn conn(&self) -> &libsql::Connection {
        &self.conn
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn test_db() -> ScribeDb {
        ScribeDb::open_local(":memory:").await.unwrap()
    }

    async fn has_table(db: &ScribeDb, table: &str) -> bool {
        let mut rows = db
            .conn()
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                [table],
            )
            .await
            .unwrap();
        rows.next().await.unwrap().is_some()
    }

    #[tokio::test]
    async fn open_local_creates_schema() {
        let db = test_db().await;
        for table in ["audit_associations", "audit_logs"] {
            assert!(has_table(&db, table).await, "table '{table}' should exist");
        }
    }

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let db = test_db().await;
        db.run_migrations().await.unwrap();
        assert!(has_table(&db, "audit_logs").await);
    }

    #[tokio::test]
    async fn foreign_keys_follow_the_flag() {
        let db = ScribeDb::open_local_with(":memory:", false).await.unwrap();
        let mut rows = db.conn().query("PRAGMA foreign_keys", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 0);

        let db = test_db().await;
        let mut rows = db.conn().query("PRAGMA foreign_keys", ()).await.unwrap();
        let row = rows.next().await.unwrap().unwrap();
        assert_eq!(row.get::<i64>(0).unwrap(), 1);
    }

    #[tokio::test]
    async fn audit_rows_require_a_source_association() {
        let db = test_db().await;
        let result = db
            .conn()
            .execute(
                "INSERT INTO audit_logs (action, tbl, source_id, logged_at)
                 VALUES ('insert', 'products', 999, '2026-01-01T00:00:00+00:00')",
                (),
            )
            .await;
        assert!(result.is_err(), "dangling source_id should violate the foreign key");
    }
}

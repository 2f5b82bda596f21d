//! Audit history repository.
//!
//! Log rows are append-only. Every query joins the association rows so
//! callers get the references exactly as they were written.

use scribe_core::enums::AuditAction;
use scribe_core::record::{AuditLogEntry, AuditRecord, Reference};
use serde_json::Value as Json;

use crate::error::DatabaseError;
use crate::helpers::{get_opt_string, parse_datetime, parse_enum, parse_optional_json};
use crate::service::AuditService;

const SELECT_ENTRY: &str = "SELECT l.id, l.action, l.tbl, l.diff, l.logged_at,
        s.typ, s.tbl, s.label, s.fk, s.class,
        t.typ, t.tbl, t.label, t.fk, t.class,
        b.typ, b.tbl, b.label, b.fk, b.class
     FROM audit_logs l
     JOIN audit_associations s ON s.id = l.source_id
     LEFT JOIN audit_associations t ON t.id = l.target_id
     LEFT JOIN audit_associations b ON b.id = l.blame_id";

/// Filter criteria for audit queries.
#[derive(Debug, Default, Clone)]
pub struct AuditFilter {
    pub action: Option<AuditAction>,
    /// Affected table (the join table for associate/dissociate).
    pub table: Option<String>,
    /// Class of the source entity.
    pub class: Option<String>,
    /// Key of the source entity as typed by a user. Matches a numeric or
    /// composite key with the same JSON text, or a string key equal to it.
    pub foreign_key: Option<String>,
    pub limit: Option<u32>,
}

fn read_reference(row: &libsql::Row, offset: i32) -> Result<Option<Reference>, DatabaseError> {
    let Some(class) = get_opt_string(row, offset + 4)? else {
        return Ok(None);
    };
    Ok(Some(Reference {
        typ: row.get::<String>(offset)?,
        table: get_opt_string(row, offset + 1)?,
        label: get_opt_string(row, offset + 2)?,
        foreign_key: Reference::decode_foreign_key(&row.get::<String>(offset + 3)?),
        class,
    }))
}

fn read_entry(row: &libsql::Row) -> Result<AuditLogEntry, DatabaseError> {
    let source = read_reference(row, 5)?
        .ok_or_else(|| DatabaseError::InvalidState("audit log without source".into()))?;
    Ok(AuditLogEntry {
        id: row.get::<i64>(0)?,
        record: AuditRecord {
            action: parse_enum(&row.get::<String>(1)?)?,
            table: row.get::<String>(2)?,
            diff: parse_optional_json(get_opt_string(row, 3)?.as_deref())?,
            source,
            target: read_reference(row, 10)?,
            blame: read_reference(row, 15)?,
        },
        logged_at: parse_datetime(&row.get::<String>(4)?)?,
    })
}

impl AuditService {
    /// Query audit entries with optional filters, newest first.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or a row cannot be parsed.
    pub async fn query_audit(
        &self,
        filter: &AuditFilter,
    ) -> Result<Vec<AuditLogEntry>, DatabaseError> {
        let mut conditions = Vec::new();
        let mut params: Vec<libsql::Value> = Vec::new();

        if let Some(action) = filter.action {
            params.push(libsql::Value::Text(action.as_str().to_string()));
            conditions.push(format!("l.action = ?{}", params.len()));
        }
        if let Some(ref table) = filter.table {
            params.push(libsql::Value::Text(table.clone()));
            conditions.push(format!("l.tbl = ?{}", params.len()));
        }
        if let Some(ref class) = filter.class {
            params.push(libsql::Value::Text(class.clone()));
            conditions.push(format!("s.class = ?{}", params.len()));
        }
        if let Some(ref fk) = filter.foreign_key {
            params.push(libsql::Value::Text(fk.clone()));
            params.push(libsql::Value::Text(Json::String(fk.clone()).to_string()));
            conditions.push(format!("s.fk IN (?{}, ?{})", params.len() - 1, params.len()));
        }

        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!("WHERE {}", conditions.join(" AND "))
        };

        let limit = filter.limit.unwrap_or(100);
        let sql = format!("{SELECT_ENTRY} {where_clause} ORDER BY l.id DESC LIMIT {limit}");

        let mut rows = self
            .db()
            .conn()
            .query(&sql, libsql::params_from_iter(params))
            .await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(read_entry(&row)?);
        }
        Ok(entries)
    }

    /// Fetch one audit entry by id.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails or the row cannot be parsed.
    pub async fn get_audit(&self, id: i64) -> Result<Option<AuditLogEntry>, DatabaseError> {
        let sql = format!("{SELECT_ENTRY} WHERE l.id = ?1");
        let mut rows = self.db().conn().query(&sql, [id]).await?;
        match rows.next().await? {
            Some(row) => Ok(Some(read_entry(&row)?)),
            None => Ok(None),
        }
    }

    /// Total number of audit log rows.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseError` if the query fails.
    pub async fn count_audit(&self) -> Result<u64, DatabaseError> {
        let mut rows = self
            .db()
            .conn()
            .query("SELECT COUNT(*) FROM audit_logs", ())
            .await?;
        let row = rows.next().await?.ok_or(DatabaseError::NoResult)?;
        u64::try_from(row.get::<i64>(0)?)
            .map_err(|e| DatabaseError::InvalidState(format!("negative row count: {e}")))
    }
}

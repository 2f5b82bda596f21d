//! Normalized audit records produced by the builder and written by the flusher.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::enums::AuditAction;

/// Snapshot of an entity's identity at the moment a record mentions it.
///
/// Persisted as one association row per mention; never shared between
/// records, so the label and key stay as they were when the change happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Reference {
    /// Fully-qualified class name.
    pub class: String,
    /// Dotted short name derived from `class`.
    pub typ: String,
    /// `None` when metadata could not be resolved.
    pub table: Option<String>,
    pub label: Option<String>,
    /// Primary key: a scalar, or a field → value map for composite keys.
    pub foreign_key: Json,
}

impl Reference {
    /// Replace the key with a snapshot captured earlier, for entities that
    /// may no longer be loadable at flush time.
    #[must_use]
    pub fn with_foreign_key(mut self, foreign_key: Json) -> Self {
        self.foreign_key = foreign_key;
        self
    }

    /// JSON encoding of the key used by the `fk` column. String keys are
    /// stored quoted so `"42"` and `42` stay distinct.
    #[must_use]
    pub fn foreign_key_text(&self) -> String {
        self.foreign_key.to_string()
    }

    /// Inverse of [`Reference::foreign_key_text`]. Text that is not JSON is
    /// read back as a string key.
    #[must_use]
    pub fn decode_foreign_key(text: &str) -> Json {
        serde_json::from_str(text).unwrap_or_else(|_| Json::String(text.to_string()))
    }

    /// The key for display: string keys bare, anything else as JSON.
    #[must_use]
    pub fn foreign_key_display(&self) -> String {
        match &self.foreign_key {
            Json::String(s) => s.clone(),
            other => other.to_string(),
        }
    }
}

/// One changed field inside a diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DiffEntry {
    pub old: Json,
    pub new: Json,
    /// Column (or join column) backing the field.
    pub col: String,
}

/// Field name → change.
pub type Diff = BTreeMap<String, DiffEntry>;

/// An audit record ready to be written. `logged_at` is assigned on write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AuditRecord {
    pub action: AuditAction,
    pub source: Reference,
    pub target: Option<Reference>,
    pub blame: Option<Reference>,
    pub diff: Option<Diff>,
    pub table: String,
}

/// An audit record as read back from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AuditLogEntry {
    pub id: i64,
    #[serde(flatten)]
    pub record: AuditRecord,
    pub logged_at: DateTime<Utc>,
}

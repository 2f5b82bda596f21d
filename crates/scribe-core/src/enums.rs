//! Actions, relation kinds, and column types for scribe.
//!
//! All enums use `snake_case` serialization via `#[serde(rename_all = "snake_case")]`
//! and expose `as_str()` for the representation stored in SQL.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::CoreError;

// ---------------------------------------------------------------------------
// AuditAction
// ---------------------------------------------------------------------------

/// Kind of mutation recorded by an audit log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Insert,
    Update,
    Remove,
    Associate,
    Dissociate,
}

impl AuditAction {
    pub const ALL: [Self; 5] = [
        Self::Insert,
        Self::Update,
        Self::Remove,
        Self::Associate,
        Self::Dissociate,
    ];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::Associate => "associate",
            Self::Dissociate => "dissociate",
        }
    }

    /// Whether records of this action carry a field diff.
    #[must_use]
    pub const fn has_diff(self) -> bool {
        matches!(self, Self::Insert | Self::Update)
    }

    /// Whether records of this action carry a target reference.
    #[must_use]
    pub const fn has_target(self) -> bool {
        matches!(self, Self::Associate | Self::Dissociate)
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| CoreError::Validation(format!("unknown audit action '{s}'")))
    }
}

// ---------------------------------------------------------------------------
// RelationKind
// ---------------------------------------------------------------------------

/// Cardinality of an association mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl RelationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OneToOne => "one_to_one",
            Self::ManyToOne => "many_to_one",
            Self::OneToMany => "one_to_many",
            Self::ManyToMany => "many_to_many",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// ColumnType
// ---------------------------------------------------------------------------

/// Storage type of a scalar column. Selects the codec used in diffs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    #[default]
    String,
    Text,
    Integer,
    SmallInt,
    BigInt,
    Decimal,
    Float,
    Boolean,
    DateTime,
    Date,
    Json,
}

impl ColumnType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Text => "text",
            Self::Integer => "integer",
            Self::SmallInt => "small_int",
            Self::BigInt => "big_int",
            Self::Decimal => "decimal",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::DateTime => "date_time",
            Self::Date => "date",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn audit_action_parses_its_own_representation() {
        for action in AuditAction::ALL {
            assert_eq!(action.as_str().parse::<AuditAction>().unwrap(), action);
        }
        assert!("created".parse::<AuditAction>().is_err());
    }

    #[test]
    fn only_writes_carry_diffs() {
        assert!(AuditAction::Insert.has_diff());
        assert!(AuditAction::Update.has_diff());
        assert!(!AuditAction::Remove.has_diff());
        assert!(AuditAction::Associate.has_target());
        assert!(!AuditAction::Insert.has_target());
    }

    #[test]
    fn serde_matches_sql_representation() {
        let json = serde_json::to_string(&AuditAction::Dissociate).unwrap();
        assert_eq!(json, "\"dissociate\"");
        let json = serde_json::to_string(&ColumnType::DateTime).unwrap();
        assert_eq!(json, format!("\"{}\"", ColumnType::DateTime.as_str()));
    }
}

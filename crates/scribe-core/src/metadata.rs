//! Entity metadata registry.
//!
//! Replaces runtime reflection: every audited class is described once, at
//! startup, by an [`EntityMeta`] (table, identifiers, fields, supertypes).
//! The registry is read-only once the [`crate::auditor::Auditor`] is built.

use std::collections::{BTreeMap, HashMap, HashSet};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::enums::{ColumnType, RelationKind};
use crate::errors::CoreError;

fn default_identifiers() -> Vec<String> {
    vec!["id".to_string()]
}

/// How a mapped field is stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A plain column.
    #[default]
    Scalar,
    /// A value object flattened into several columns. Never diffed.
    Embedded,
    /// A single-valued association stored in a join column.
    ToOne,
    /// A collection association. Tracked through associate/dissociate.
    ToMany,
}

/// Mapping of one field of an entity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldMeta {
    #[serde(default)]
    pub kind: FieldKind,
    /// Column name for scalars; defaults to the field name.
    #[serde(default)]
    pub column: Option<String>,
    /// Column type for scalars.
    #[serde(default, rename = "type")]
    pub column_type: ColumnType,
    /// Join column name for to-one associations.
    #[serde(default)]
    pub join_column: Option<String>,
}

impl FieldMeta {
    #[must_use]
    pub fn scalar(column_type: ColumnType) -> Self {
        Self {
            kind: FieldKind::Scalar,
            column_type,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn to_one(join_column: impl Into<String>) -> Self {
        Self {
            kind: FieldKind::ToOne,
            join_column: Some(join_column.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

/// Static description of one entity class.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EntityMeta {
    pub class: String,
    pub table: String,
    #[serde(default = "default_identifiers")]
    pub identifiers: Vec<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldMeta>,
    /// Direct supertypes and interfaces, used by subtype checks.
    #[serde(default)]
    pub parents: Vec<String>,
    /// Whether the class has its own string conversion usable as a label.
    #[serde(default)]
    pub stringable: bool,
}

impl EntityMeta {
    /// Describe a class stored in `table`, identified by an `id` integer column.
    #[must_use]
    pub fn new(class: impl Into<String>, table: impl Into<String>) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert("id".to_string(), FieldMeta::scalar(ColumnType::Integer));
        Self {
            class: class.into(),
            table: table.into(),
            identifiers: default_identifiers(),
            fields,
            parents: Vec::new(),
            stringable: false,
        }
    }

    /// Replace the identifier fields (composite keys list several).
    #[must_use]
    pub fn identified_by<I, S>(mut self, identifiers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.identifiers = identifiers.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn field(mut self, name: impl Into<String>, meta: FieldMeta) -> Self {
        self.fields.insert(name.into(), meta);
        self
    }

    #[must_use]
    pub fn scalar(self, name: impl Into<String>, column_type: ColumnType) -> Self {
        self.field(name, FieldMeta::scalar(column_type))
    }

    #[must_use]
    pub fn to_one(self, name: impl Into<String>, join_column: impl Into<String>) -> Self {
        self.field(name, FieldMeta::to_one(join_column))
    }

    #[must_use]
    pub fn to_many(self, name: impl Into<String>) -> Self {
        self.field(
            name,
            FieldMeta {
                kind: FieldKind::ToMany,
                ..FieldMeta::default()
            },
        )
    }

    #[must_use]
    pub fn embedded(self, name: impl Into<String>) -> Self {
        self.field(
            name,
            FieldMeta {
                kind: FieldKind::Embedded,
                ..FieldMeta::default()
            },
        )
    }

    #[must_use]
    pub fn parent(mut self, parent: impl Into<String>) -> Self {
        self.parents.push(parent.into());
        self
    }

    #[must_use]
    pub const fn stringable(mut self) -> Self {
        self.stringable = true;
        self
    }

    #[must_use]
    pub fn get_field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.get(name)
    }

    /// Whether `name` is a plain column (not embedded, not an association).
    #[must_use]
    pub fn has_scalar(&self, name: &str) -> bool {
        self.fields
            .get(name)
            .is_some_and(|f| f.kind == FieldKind::Scalar)
    }

    /// Column name of a scalar field.
    #[must_use]
    pub fn column_name<'a>(&'a self, name: &'a str) -> &'a str {
        self.fields
            .get(name)
            .and_then(|f| f.column.as_deref())
            .unwrap_or(name)
    }

    /// Join column name of a to-one association, defaulting to `{field}_id`.
    #[must_use]
    pub fn join_column_name(&self, name: &str) -> String {
        self.fields
            .get(name)
            .and_then(|f| f.join_column.clone())
            .unwrap_or_else(|| format!("{name}_id"))
    }
}

/// Mapping of a collection association as reported with a collection change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RelationMapping {
    pub field: String,
    pub kind: RelationKind,
    pub owning_side: bool,
    pub join_table: Option<String>,
}

impl RelationMapping {
    /// Owning side of a many-to-many relation written through `join_table`.
    #[must_use]
    pub fn many_to_many(field: impl Into<String>, join_table: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            kind: RelationKind::ManyToMany,
            owning_side: true,
            join_table: Some(join_table.into()),
        }
    }

    #[must_use]
    pub const fn inverse(mut self) -> Self {
        self.owning_side = false;
        self
    }

    /// Only owning-side many-to-many relations are audited; the other
    /// shapes are derivable from the owning side or from the child rows.
    #[must_use]
    pub const fn is_audited(&self) -> bool {
        self.owning_side && matches!(self.kind, RelationKind::ManyToMany)
    }

    #[must_use]
    pub fn join_table_name(&self) -> &str {
        self.join_table.as_deref().unwrap_or(&self.field)
    }
}

/// Class name → metadata lookup, populated at startup.
#[derive(Debug, Clone, Default)]
pub struct EntityRegistry {
    entities: HashMap<String, EntityMeta>,
}

impl EntityRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from a list of entity descriptions.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if a class is described twice or
    /// declares no identifier.
    pub fn from_entities<I>(entities: I) -> Result<Self, CoreError>
    where
        I: IntoIterator<Item = EntityMeta>,
    {
        let mut registry = Self::new();
        for meta in entities {
            registry.register(meta)?;
        }
        Ok(registry)
    }

    /// Add one entity description.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Validation` if the class is already registered or
    /// declares no identifier.
    pub fn register(&mut self, meta: EntityMeta) -> Result<(), CoreError> {
        if meta.identifiers.is_empty() {
            return Err(CoreError::Validation(format!(
                "entity {} declares no identifier",
                meta.class
            )));
        }
        if self.entities.contains_key(&meta.class) {
            return Err(CoreError::Validation(format!(
                "entity {} registered twice",
                meta.class
            )));
        }
        self.entities.insert(meta.class.clone(), meta);
        Ok(())
    }

    /// Metadata for `class`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::UnknownEntity` when nothing is registered for it.
    pub fn get(&self, class: &str) -> Result<&EntityMeta, CoreError> {
        self.entities
            .get(class)
            .ok_or_else(|| CoreError::UnknownEntity {
                class: class.to_string(),
            })
    }

    #[must_use]
    pub fn contains(&self, class: &str) -> bool {
        self.entities.contains_key(class)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EntityMeta> {
        self.entities.values()
    }

    /// Whether `class` is `ancestor` or inherits from it through `parents`.
    #[must_use]
    pub fn is_subtype(&self, class: &str, ancestor: &str) -> bool {
        let mut pending = vec![class];
        let mut seen = HashSet::new();
        while let Some(current) = pending.pop() {
            if current == ancestor {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            if let Some(meta) = self.entities.get(current) {
                pending.extend(meta.parents.iter().map(String::as_str));
            }
        }
        false
    }
}

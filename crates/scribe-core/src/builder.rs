//! Turns snapshots and changesets into references and diffs.

use serde_json::{Map, Value as Json};

use crate::changes::{ChangeSource, Changeset};
use crate::entity::EntitySnapshot;
use crate::errors::CoreError;
use crate::label::{Label, UNLABELED};
use crate::metadata::{EntityMeta, EntityRegistry, FieldKind};
use crate::naming::type_name;
use crate::record::{Diff, DiffEntry, Reference};
use crate::value::Value;

/// Builds the pieces of an audit record for one flush.
///
/// Borrows the host's change source so association fields holding object
/// handles can be resolved to the entities they point at.
pub struct RecordBuilder<'a> {
    registry: &'a EntityRegistry,
    source: &'a dyn ChangeSource,
    labeler: Option<&'a dyn Label>,
}

impl<'a> RecordBuilder<'a> {
    #[must_use]
    pub fn new(
        registry: &'a EntityRegistry,
        source: &'a dyn ChangeSource,
        labeler: Option<&'a dyn Label>,
    ) -> Self {
        Self {
            registry,
            source,
            labeler,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &'a EntityRegistry {
        self.registry
    }

    #[must_use]
    pub fn source(&self) -> &'a dyn ChangeSource {
        self.source
    }

    /// Field-level diff of `entity` for the given changeset.
    ///
    /// Scalars go through their column codec. To-one associations are
    /// rendered as references. Collections, embedded values and fields the
    /// metadata does not know are left out, so the result may be empty.
    ///
    /// # Errors
    ///
    /// Propagates a configuration error raised while labeling a referenced
    /// entity.
    pub fn build_diff(
        &self,
        entity: &EntitySnapshot,
        changeset: &Changeset,
    ) -> Result<Diff, CoreError> {
        let meta = match self.registry.get(&entity.class) {
            Ok(meta) => meta,
            Err(err) => {
                tracing::warn!(class = %entity.class, error = %err, "no metadata, diff skipped");
                return Ok(Diff::new());
            }
        };

        let mut diff = Diff::new();
        for (field, change) in changeset {
            let Some(field_meta) = meta.get_field(field) else {
                continue;
            };
            let entry = match field_meta.kind {
                FieldKind::Scalar => DiffEntry {
                    old: field_meta.column_type.encode(&change.old),
                    new: field_meta.column_type.encode(&change.new),
                    col: meta.column_name(field).to_string(),
                },
                FieldKind::ToOne => DiffEntry {
                    old: self.association_value(&change.old)?,
                    new: self.association_value(&change.new)?,
                    col: meta.join_column_name(field),
                },
                FieldKind::Embedded | FieldKind::ToMany => continue,
            };
            diff.insert(field.clone(), entry);
        }
        Ok(diff)
    }

    fn association_value(&self, value: &Value) -> Result<Json, CoreError> {
        let Some(object) = value.as_object() else {
            return Ok(value.to_json());
        };
        let Some(snapshot) = self.source.snapshot(object) else {
            tracing::warn!(%object, "associated entity not in unit of work");
            return Ok(Json::Null);
        };
        let reference = self.reference(&snapshot)?;
        serde_json::to_value(reference).map_err(|e| CoreError::Other(e.into()))
    }

    /// Reference for an optional entity; `None` in, `None` out.
    ///
    /// # Errors
    ///
    /// See [`RecordBuilder::reference`].
    pub fn build_reference(
        &self,
        entity: Option<&EntitySnapshot>,
    ) -> Result<Option<Reference>, CoreError> {
        entity.map(|e| self.reference(e)).transpose()
    }

    /// Reference for `entity`.
    ///
    /// When metadata, labeling or identifier lookup fails the reference
    /// falls back to the class and the raw `id` field.
    ///
    /// # Errors
    ///
    /// Only `CoreError::Configuration` is returned; every other failure is
    /// absorbed by the fallback.
    pub fn reference(&self, entity: &EntitySnapshot) -> Result<Reference, CoreError> {
        match self.resolve_reference(entity) {
            Ok(reference) => Ok(reference),
            Err(err) if err.is_configuration() => Err(err),
            Err(err) => {
                tracing::debug!(class = %entity.class, error = %err, "falling back to bare reference");
                Ok(Reference {
                    class: entity.class.clone(),
                    typ: type_name(&entity.class),
                    table: None,
                    label: None,
                    foreign_key: entity.get("id").to_json(),
                })
            }
        }
    }

    fn resolve_reference(&self, entity: &EntitySnapshot) -> Result<Reference, CoreError> {
        let meta = self.registry.get(&entity.class)?;
        let label = self.resolve_label(entity)?;
        let foreign_key = self.identifier(meta, entity)?;
        Ok(Reference {
            class: entity.class.clone(),
            typ: type_name(&entity.class),
            table: Some(meta.table.clone()),
            label: Some(label),
            foreign_key,
        })
    }

    /// Label from the configured labeler, `"Unlabeled"` without one.
    ///
    /// # Errors
    ///
    /// Whatever the labeler returns.
    pub fn resolve_label(&self, entity: &EntitySnapshot) -> Result<String, CoreError> {
        self.labeler
            .map_or_else(|| Ok(UNLABELED.to_string()), |l| l.label(entity))
    }

    /// Identifier snapshot: the single key value, or a map for composite keys.
    ///
    /// # Errors
    ///
    /// `CoreError::UnknownEntity` without metadata, or
    /// `CoreError::EntityUnavailable` when a to-one identifier points at an
    /// object the unit of work no longer knows.
    pub fn entity_id(&self, entity: &EntitySnapshot) -> Result<Json, CoreError> {
        let meta = self.registry.get(&entity.class)?;
        self.identifier(meta, entity)
    }

    fn identifier(&self, meta: &EntityMeta, entity: &EntitySnapshot) -> Result<Json, CoreError> {
        if let [single] = meta.identifiers.as_slice() {
            return self.identifier_value(meta, entity, single);
        }
        let mut composite = Map::new();
        for name in &meta.identifiers {
            composite.insert(name.clone(), self.identifier_value(meta, entity, name)?);
        }
        Ok(Json::Object(composite))
    }

    fn identifier_value(
        &self,
        meta: &EntityMeta,
        entity: &EntitySnapshot,
        name: &str,
    ) -> Result<Json, CoreError> {
        let value = entity.get(name);
        match meta.get_field(name) {
            Some(field) if field.kind == FieldKind::ToOne => match value.as_object() {
                Some(object) => {
                    let related = self.source.snapshot(object).ok_or_else(|| {
                        CoreError::EntityUnavailable {
                            object: object.to_string(),
                        }
                    })?;
                    self.entity_id(&related)
                }
                None => Ok(value.to_json()),
            },
            Some(field) => Ok(field.column_type.encode(value)),
            None => Ok(value.to_json()),
        }
    }
}

//! Per-transaction buffer of operations waiting to be audited.

use std::mem;

use serde_json::Value as Json;

use crate::builder::RecordBuilder;
use crate::changes::{Changeset, CollectionChange, accumulate_changesets, merge_changesets};
use crate::entity::{EntitySnapshot, ObjectId};
use crate::enums::AuditAction;
use crate::errors::CoreError;
use crate::filter::EntityFilter;
use crate::metadata::RelationMapping;
use crate::naming::type_name;
use crate::record::{AuditRecord, Reference};

/// A staged object and its state when it was last observed.
#[derive(Debug, Clone, PartialEq)]
pub struct Observed {
    pub object: ObjectId,
    pub snapshot: EntitySnapshot,
}

impl Observed {
    /// Current state from the change source, or the observed state once the
    /// host has let go of the object.
    fn resolve(self, builder: &RecordBuilder<'_>) -> EntitySnapshot {
        match builder.source().snapshot(self.object) {
            Some(current) => current,
            None => {
                tracing::debug!(
                    object = %self.object,
                    class = %self.snapshot.class,
                    "object gone from unit of work, using observed state"
                );
                self.snapshot
            }
        }
    }
}

/// An inserted or updated object and its accumulated changeset.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedChange {
    pub entity: Observed,
    pub changeset: Changeset,
}

/// A removed object. Its state and key are taken at observe time; both are
/// gone from storage by the time the records are built.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedRemoval {
    pub entity: Observed,
    pub id: Json,
}

/// An element added to an owning many-to-many collection.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedAssociation {
    pub source: Observed,
    pub target: Observed,
    pub mapping: RelationMapping,
}

/// An element removed from an owning many-to-many collection. The target's
/// key is taken at observe time.
#[derive(Debug, Clone, PartialEq)]
pub struct StagedDissociation {
    pub source: Observed,
    pub target: Observed,
    pub target_id: Json,
    pub mapping: RelationMapping,
}

/// One operation captured before the host's SQL ran.
#[derive(Debug, Clone, PartialEq)]
pub enum StagedOperation {
    Insert(StagedChange),
    Update(StagedChange),
    Remove(StagedRemoval),
    Associate(StagedAssociation),
    Dissociate(StagedDissociation),
}

/// Staged operations of one transaction, deduplicated.
///
/// Observing the same object twice merges its changesets; the same
/// associate, dissociate, or remove entry is kept once.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct StagingBuffer {
    inserted: Vec<StagedChange>,
    updated: Vec<StagedChange>,
    removed: Vec<StagedRemoval>,
    associated: Vec<StagedAssociation>,
    dissociated: Vec<StagedDissociation>,
}

fn stage_changeset(entries: &mut Vec<StagedChange>, entity: Observed, changeset: Changeset) {
    match entries
        .iter_mut()
        .find(|staged| staged.entity.object == entity.object)
    {
        Some(staged) => {
            staged.entity.snapshot = entity.snapshot;
            accumulate_changesets(&mut staged.changeset, changeset);
        }
        None => entries.push(StagedChange { entity, changeset }),
    }
}

fn stage_once<T>(entries: &mut Vec<T>, entry: T, same: impl Fn(&T, &T) -> bool) {
    if !entries.iter().any(|existing| same(existing, &entry)) {
        entries.push(entry);
    }
}

impl StagingBuffer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inserted.len()
            + self.updated.len()
            + self.removed.len()
            + self.associated.len()
            + self.dissociated.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Staged operations in flush order.
    #[must_use]
    pub fn operations(&self) -> Vec<StagedOperation> {
        let updates = self.updated.iter().cloned().map(StagedOperation::Update);
        let inserts = self.inserted.iter().cloned().map(StagedOperation::Insert);
        updates
            .chain(inserts)
            .chain(self.associated.iter().cloned().map(StagedOperation::Associate))
            .chain(self.dissociated.iter().cloned().map(StagedOperation::Dissociate))
            .chain(self.removed.iter().cloned().map(StagedOperation::Remove))
            .collect()
    }

    /// Capture the pending mutations of the builder's change source.
    ///
    /// Returns how many new entries were staged. Unaudited entities, unaudited
    /// collection targets, and collections other than owning many-to-many
    /// sides are skipped.
    pub fn observe(&mut self, builder: &RecordBuilder<'_>, filter: &EntityFilter) -> usize {
        let source = builder.source();
        let registry = builder.registry();
        let audited = |object: ObjectId| -> Option<Observed> {
            let Some(snapshot) = source.snapshot(object) else {
                tracing::warn!(%object, "scheduled object not in unit of work, skipped");
                return None;
            };
            (!filter.is_unaudited(&snapshot.class, registry)).then_some(Observed { object, snapshot })
        };
        let before = self.len();

        for id in source.scheduled_insertions() {
            if let Some(entity) = audited(id) {
                stage_changeset(&mut self.inserted, entity, source.changeset(id));
            }
        }
        for id in source.scheduled_updates() {
            if let Some(entity) = audited(id) {
                stage_changeset(&mut self.updated, entity, source.changeset(id));
            }
        }
        for id in source.scheduled_deletions() {
            if let Some(entity) = audited(id) {
                let id = identifier_snapshot(builder, &entity.snapshot);
                stage_once(&mut self.removed, StagedRemoval { entity, id }, |a, b| {
                    a.entity.object == b.entity.object
                });
            }
        }

        for change in source.scheduled_collection_updates() {
            let Some(owner) = audited_owner(&change, &audited) else {
                continue;
            };
            for target in &change.inserted {
                if let Some(target) = audited(*target) {
                    let association = StagedAssociation {
                        source: owner.clone(),
                        target,
                        mapping: change.mapping.clone(),
                    };
                    stage_once(&mut self.associated, association, |a, b| {
                        a.source.object == b.source.object
                            && a.target.object == b.target.object
                            && a.mapping == b.mapping
                    });
                }
            }
            self.stage_dissociations(builder, &owner, &change, &change.deleted, &audited);
        }
        for change in source.scheduled_collection_deletions() {
            if let Some(owner) = audited_owner(&change, &audited) {
                self.stage_dissociations(builder, &owner, &change, &change.elements, &audited);
            }
        }

        let staged = self.len() - before;
        if staged > 0 {
            tracing::debug!(staged, total = self.len(), "staged audit operations");
        }
        staged
    }

    fn stage_dissociations(
        &mut self,
        builder: &RecordBuilder<'_>,
        owner: &Observed,
        change: &CollectionChange,
        targets: &[ObjectId],
        audited: &impl Fn(ObjectId) -> Option<Observed>,
    ) {
        for target in targets {
            if let Some(target) = audited(*target) {
                let target_id = identifier_snapshot(builder, &target.snapshot);
                let dissociation = StagedDissociation {
                    source: owner.clone(),
                    target,
                    target_id,
                    mapping: change.mapping.clone(),
                };
                stage_once(&mut self.dissociated, dissociation, |a, b| {
                    a.source.object == b.source.object
                        && a.target.object == b.target.object
                        && a.mapping == b.mapping
                });
            }
        }
    }

    /// Drain the buffer and build one record per staged operation.
    ///
    /// The buffer is emptied before anything is built, so it is clear
    /// afterwards whether or not building succeeds. Updates, inserts, and
    /// association ends are re-read from the change source, which picks up
    /// keys generated after `observe`; objects the source no longer knows
    /// fall back to their observed state. Operations with an empty diff
    /// produce no record.
    ///
    /// # Errors
    ///
    /// Propagates configuration errors from reference building.
    pub fn build_records(
        &mut self,
        builder: &RecordBuilder<'_>,
        actor: Option<&EntitySnapshot>,
    ) -> Result<Vec<AuditRecord>, CoreError> {
        let staged = mem::take(self);
        let blame = builder.build_reference(actor)?;
        let blame = blame.as_ref();
        let mut records = Vec::with_capacity(staged.len());

        for (action, entries) in [
            (AuditAction::Update, staged.updated),
            (AuditAction::Insert, staged.inserted),
        ] {
            for change in entries {
                records.extend(changed_record(builder, action, change, blame)?);
            }
        }
        for association in staged.associated {
            records.push(association_record(builder, association, blame)?);
        }
        for dissociation in staged.dissociated {
            records.push(dissociation_record(builder, dissociation, blame)?);
        }
        for removal in staged.removed {
            records.push(removal_record(builder, removal, blame)?);
        }

        tracing::debug!(records = records.len(), "built audit records");
        Ok(records)
    }
}

fn audited_owner(
    change: &CollectionChange,
    audited: &impl Fn(ObjectId) -> Option<Observed>,
) -> Option<Observed> {
    if change.mapping.is_audited() {
        audited(change.owner)
    } else {
        None
    }
}

fn identifier_snapshot(builder: &RecordBuilder<'_>, entity: &EntitySnapshot) -> Json {
    builder.entity_id(entity).unwrap_or_else(|err| {
        tracing::debug!(class = %entity.class, error = %err, "identifier from raw id field");
        entity.get("id").to_json()
    })
}

fn table_of(builder: &RecordBuilder<'_>, entity: &EntitySnapshot) -> String {
    builder.registry().get(&entity.class).map_or_else(
        |_| {
            tracing::warn!(class = %entity.class, "no metadata, table name from type");
            type_name(&entity.class)
        },
        |meta| meta.table.clone(),
    )
}

fn changed_record(
    builder: &RecordBuilder<'_>,
    action: AuditAction,
    staged: StagedChange,
    blame: Option<&Reference>,
) -> Result<Option<AuditRecord>, CoreError> {
    let StagedChange {
        entity,
        mut changeset,
    } = staged;
    merge_changesets(&mut changeset, builder.source().changeset(entity.object));
    let entity = entity.resolve(builder);
    let diff = builder.build_diff(&entity, &changeset)?;
    if diff.is_empty() {
        return Ok(None);
    }
    Ok(Some(AuditRecord {
        action,
        source: builder.reference(&entity)?,
        target: None,
        blame: blame.cloned(),
        diff: Some(diff),
        table: table_of(builder, &entity),
    }))
}

fn association_record(
    builder: &RecordBuilder<'_>,
    staged: StagedAssociation,
    blame: Option<&Reference>,
) -> Result<AuditRecord, CoreError> {
    let source = staged.source.resolve(builder);
    let target = staged.target.resolve(builder);
    Ok(AuditRecord {
        action: AuditAction::Associate,
        source: builder.reference(&source)?,
        target: Some(builder.reference(&target)?),
        blame: blame.cloned(),
        diff: None,
        table: staged.mapping.join_table_name().to_string(),
    })
}

fn dissociation_record(
    builder: &RecordBuilder<'_>,
    staged: StagedDissociation,
    blame: Option<&Reference>,
) -> Result<AuditRecord, CoreError> {
    let source = staged.source.resolve(builder);
    let target = builder
        .reference(&staged.target.snapshot)?
        .with_foreign_key(staged.target_id);
    Ok(AuditRecord {
        action: AuditAction::Dissociate,
        source: builder.reference(&source)?,
        target: Some(target),
        blame: blame.cloned(),
        diff: None,
        table: staged.mapping.join_table_name().to_string(),
    })
}

fn removal_record(
    builder: &RecordBuilder<'_>,
    staged: StagedRemoval,
    blame: Option<&Reference>,
) -> Result<AuditRecord, CoreError> {
    let entity = staged.entity.snapshot;
    Ok(AuditRecord {
        action: AuditAction::Remove,
        source: builder.reference(&entity)?.with_foreign_key(staged.id),
        target: None,
        blame: blame.cloned(),
        diff: None,
        table: table_of(builder, &entity),
    })
}

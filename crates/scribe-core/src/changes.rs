//! The pending-change capability a host unit of work exposes to scribe.
//!
//! scribe never walks the host's object graph itself. At observe time and
//! again at flush time it asks a [`ChangeSource`] which objects are scheduled
//! for insertion, update, or deletion, which collections changed, what each
//! object's changeset is, and what its fields currently hold.

use std::collections::BTreeMap;

use crate::entity::{EntitySnapshot, ObjectId};
use crate::metadata::RelationMapping;
use crate::value::Value;

/// Old and new value of one field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

impl FieldChange {
    #[must_use]
    pub fn new(old: impl Into<Value>, new: impl Into<Value>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
        }
    }
}

/// Field name → change, as computed by the host.
pub type Changeset = BTreeMap<String, FieldChange>;

/// Merge a later changeset into an earlier one.
///
/// Fields present in `later` replace the pair recorded in `earlier`.
pub fn merge_changesets(earlier: &mut Changeset, later: Changeset) {
    earlier.extend(later);
}

/// Merge two changesets observed for the same object within one transaction:
/// the earliest `old` and the latest `new` win, so the result spans both.
pub fn accumulate_changesets(earlier: &mut Changeset, later: Changeset) {
    for (field, change) in later {
        match earlier.get_mut(&field) {
            Some(existing) => existing.new = change.new,
            None => {
                earlier.insert(field, change);
            }
        }
    }
}

/// A scheduled change of one collection association.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionChange {
    pub owner: ObjectId,
    pub mapping: RelationMapping,
    /// Elements added since the collection was loaded.
    pub inserted: Vec<ObjectId>,
    /// Elements removed since the collection was loaded.
    pub deleted: Vec<ObjectId>,
    /// Every element currently held; used when the whole collection is deleted.
    pub elements: Vec<ObjectId>,
}

/// Pending mutations of a host unit of work.
///
/// Implementations are consulted twice per transaction: once by
/// `observe` before any SQL runs, and once at commit time so the flush sees
/// generated keys and late changeset updates.
pub trait ChangeSource {
    fn scheduled_insertions(&self) -> Vec<ObjectId>;

    fn scheduled_updates(&self) -> Vec<ObjectId>;

    fn scheduled_deletions(&self) -> Vec<ObjectId>;

    fn scheduled_collection_updates(&self) -> Vec<CollectionChange>;

    fn scheduled_collection_deletions(&self) -> Vec<CollectionChange>;

    /// Current changeset of an object; empty when it has none.
    fn changeset(&self, object: ObjectId) -> Changeset;

    /// Current state of an object, loading it first if the host holds a
    /// lazy proxy. `None` when the host no longer knows the object.
    fn snapshot(&self, object: ObjectId) -> Option<EntitySnapshot>;
}

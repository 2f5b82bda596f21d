//! In-memory unit of work implementing [`ChangeSource`].
//!
//! Hosts without their own change tracking can drive a `ChangeTracker`
//! directly: register loaded objects, schedule inserts, field updates and
//! removals, edit collections, then hand the tracker to the audited
//! transaction. Generated keys are written back with [`ChangeTracker::assign`]
//! once the host's INSERT has run.

use std::collections::HashMap;

use crate::changes::{ChangeSource, Changeset, CollectionChange, FieldChange};
use crate::entity::{EntitySnapshot, ObjectId};
use crate::errors::CoreError;
use crate::metadata::RelationMapping;
use crate::value::Value;

#[derive(Debug, Default)]
pub struct ChangeTracker {
    next_object: u64,
    objects: HashMap<ObjectId, EntitySnapshot>,
    insertions: Vec<ObjectId>,
    updates: Vec<ObjectId>,
    deletions: Vec<ObjectId>,
    changesets: HashMap<ObjectId, Changeset>,
    collection_updates: Vec<CollectionChange>,
    collection_deletions: Vec<CollectionChange>,
    collections: HashMap<(ObjectId, String), Vec<ObjectId>>,
}

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, mut snapshot: EntitySnapshot) -> ObjectId {
        self.next_object += 1;
        let id = ObjectId::new(self.next_object);
        snapshot.object = Some(id);
        self.objects.insert(id, snapshot);
        id
    }

    fn object_mut(&mut self, id: ObjectId) -> Result<&mut EntitySnapshot, CoreError> {
        self.objects
            .get_mut(&id)
            .ok_or_else(|| CoreError::EntityUnavailable {
                object: id.to_string(),
            })
    }

    /// Track an object that already exists in storage.
    pub fn manage(&mut self, snapshot: EntitySnapshot) -> ObjectId {
        self.allocate(snapshot)
    }

    /// Track a new object and schedule its insertion. Every given field is
    /// part of the insert changeset with a null old value.
    pub fn persist(&mut self, snapshot: EntitySnapshot) -> ObjectId {
        let changeset = snapshot
            .fields
            .iter()
            .map(|(name, value)| (name.clone(), FieldChange::new(Value::Null, value.clone())))
            .collect();
        let id = self.allocate(snapshot);
        self.changesets.insert(id, changeset);
        self.insertions.push(id);
        id
    }

    /// Change a field of a tracked object and schedule the update.
    ///
    /// Setting a field to its current value records nothing.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EntityUnavailable` for an unknown handle.
    pub fn set(
        &mut self,
        id: ObjectId,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<(), CoreError> {
        let value = value.into();
        let object = self.object_mut(id)?;
        let old = object.fields.insert(field.to_string(), value.clone()).unwrap_or_default();
        if old == value {
            return Ok(());
        }

        let changeset = self.changesets.entry(id).or_default();
        match changeset.get_mut(field) {
            Some(change) => change.new = value,
            None => {
                changeset.insert(field.to_string(), FieldChange::new(old, value));
            }
        }
        if !self.insertions.contains(&id) && !self.updates.contains(&id) {
            self.updates.push(id);
        }
        Ok(())
    }

    /// Schedule an update without changing anything.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EntityUnavailable` for an unknown handle.
    pub fn touch(&mut self, id: ObjectId) -> Result<(), CoreError> {
        self.object_mut(id)?;
        if !self.insertions.contains(&id) && !self.updates.contains(&id) {
            self.updates.push(id);
        }
        Ok(())
    }

    /// Write a value the storage generated, such as an auto-increment key.
    /// Not part of any changeset.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EntityUnavailable` for an unknown handle.
    pub fn assign(
        &mut self,
        id: ObjectId,
        field: &str,
        value: impl Into<Value>,
    ) -> Result<(), CoreError> {
        self.object_mut(id)?
            .fields
            .insert(field.to_string(), value.into());
        Ok(())
    }

    /// Schedule a tracked object for removal.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::EntityUnavailable` for an unknown handle.
    pub fn remove(&mut self, id: ObjectId) -> Result<(), CoreError> {
        self.object_mut(id)?;
        self.updates.retain(|u| *u != id);
        if !self.deletions.contains(&id) {
            self.deletions.push(id);
        }
        Ok(())
    }

    /// Record the elements a collection held when it was loaded.
    pub fn load_collection(&mut self, owner: ObjectId, field: &str, elements: Vec<ObjectId>) {
        self.collections.insert((owner, field.to_string()), elements);
    }

    fn collection_change(&mut self, owner: ObjectId, mapping: &RelationMapping) -> &mut CollectionChange {
        let position = self
            .collection_updates
            .iter()
            .position(|c| c.owner == owner && c.mapping.field == mapping.field);
        let index = position.unwrap_or_else(|| {
            self.collection_updates.push(CollectionChange {
                owner,
                mapping: mapping.clone(),
                inserted: Vec::new(),
                deleted: Vec::new(),
                elements: Vec::new(),
            });
            self.collection_updates.len() - 1
        });
        &mut self.collection_updates[index]
    }

    /// Add `element` to the owner's collection.
    pub fn add_to_collection(&mut self, owner: ObjectId, mapping: &RelationMapping, element: ObjectId) {
        let elements = self
            .collections
            .entry((owner, mapping.field.clone()))
            .or_default();
        if elements.contains(&element) {
            return;
        }
        elements.push(element);
        let snapshot = elements.clone();

        let change = self.collection_change(owner, mapping);
        change.elements = snapshot;
        if let Some(pos) = change.deleted.iter().position(|e| *e == element) {
            change.deleted.remove(pos);
        } else {
            change.inserted.push(element);
        }
    }

    /// Remove `element` from the owner's collection.
    pub fn remove_from_collection(
        &mut self,
        owner: ObjectId,
        mapping: &RelationMapping,
        element: ObjectId,
    ) {
        let elements = self
            .collections
            .entry((owner, mapping.field.clone()))
            .or_default();
        let Some(pos) = elements.iter().position(|e| *e == element) else {
            return;
        };
        elements.remove(pos);
        let snapshot = elements.clone();

        let change = self.collection_change(owner, mapping);
        change.elements = snapshot;
        if let Some(pos) = change.inserted.iter().position(|e| *e == element) {
            change.inserted.remove(pos);
        } else {
            change.deleted.push(element);
        }
    }

    /// Schedule deletion of the whole collection.
    pub fn clear_collection(&mut self, owner: ObjectId, mapping: &RelationMapping) {
        let elements = self
            .collections
            .insert((owner, mapping.field.clone()), Vec::new())
            .unwrap_or_default();
        self.collection_updates
            .retain(|c| !(c.owner == owner && c.mapping.field == mapping.field));
        self.collection_deletions.push(CollectionChange {
            owner,
            mapping: mapping.clone(),
            inserted: Vec::new(),
            deleted: Vec::new(),
            elements,
        });
    }

    /// Forget all scheduled work, as a host does after its flush commits.
    pub fn reset(&mut self) {
        self.insertions.clear();
        self.updates.clear();
        for id in self.deletions.drain(..) {
            self.objects.remove(&id);
        }
        self.changesets.clear();
        self.collection_updates.clear();
        self.collection_deletions.clear();
    }

    #[must_use]
    pub fn get(&self, id: ObjectId) -> Option<&EntitySnapshot> {
        self.objects.get(&id)
    }
}

impl ChangeSource for ChangeTracker {
    fn scheduled_insertions(&self) -> Vec<ObjectId> {
        self.insertions.clone()
    }

    fn scheduled_updates(&self) -> Vec<ObjectId> {
        self.updates.clone()
    }

    fn scheduled_deletions(&self) -> Vec<ObjectId> {
        self.deletions.clone()
    }

    fn scheduled_collection_updates(&self) -> Vec<CollectionChange> {
        self.collection_updates.clone()
    }

    fn scheduled_collection_deletions(&self) -> Vec<CollectionChange> {
        self.collection_deletions.clone()
    }

    fn changeset(&self, object: ObjectId) -> Changeset {
        self.changesets.get(&object).cloned().unwrap_or_default()
    }

    fn snapshot(&self, object: ObjectId) -> Option<EntitySnapshot> {
        self.objects.get(&object).cloned()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn product(title: &str) -> EntitySnapshot {
        EntitySnapshot::detached("Shop\\Entity\\Product").with_field("title", title)
    }

    #[test]
    fn persist_schedules_insert_with_null_olds() {
        let mut uow = ChangeTracker::new();
        let id = uow.persist(product("Widget").with_field("qty", 5));

        assert_eq!(uow.scheduled_insertions(), vec![id]);
        let ch = uow.changeset(id);
        assert_eq!(ch["title"], FieldChange::new(Value::Null, "Widget"));
        assert_eq!(ch["qty"], FieldChange::new(Value::Null, 5));
    }

    #[test]
    fn set_records_first_old_and_latest_new() {
        let mut uow = ChangeTracker::new();
        let id = uow.manage(product("Widget"));
        uow.set(id, "title", "Gadget").unwrap();
        uow.set(id, "title", "Gizmo").unwrap();

        assert_eq!(uow.scheduled_updates(), vec![id]);
        assert_eq!(uow.changeset(id)["title"], FieldChange::new("Widget", "Gizmo"));
    }

    #[test]
    fn setting_same_value_records_nothing() {
        let mut uow = ChangeTracker::new();
        let id = uow.manage(product("Widget"));
        uow.set(id, "title", "Widget").unwrap();
        assert!(uow.scheduled_updates().is_empty());
        assert!(uow.changeset(id).is_empty());
    }

    #[test]
    fn assign_is_visible_in_snapshot_but_not_changeset() {
        let mut uow = ChangeTracker::new();
        let id = uow.persist(product("Widget"));
        uow.assign(id, "id", 17).unwrap();

        assert_eq!(uow.snapshot(id).unwrap().get("id"), &Value::Int(17));
        assert!(!uow.changeset(id).contains_key("id"));
    }

    #[test]
    fn collection_add_then_remove_cancels_out() {
        let mut uow = ChangeTracker::new();
        let owner = uow.manage(product("Widget"));
        let tag = uow.manage(EntitySnapshot::detached("Shop\\Entity\\Tag"));
        let mapping = RelationMapping::many_to_many("tags", "product_tags");

        uow.add_to_collection(owner, &mapping, tag);
        uow.remove_from_collection(owner, &mapping, tag);

        let changes = uow.scheduled_collection_updates();
        assert_eq!(changes.len(), 1);
        assert!(changes[0].inserted.is_empty());
        assert!(changes[0].deleted.is_empty());
    }

    #[test]
    fn clear_collection_moves_elements_to_deletion() {
        let mut uow = ChangeTracker::new();
        let owner = uow.manage(product("Widget"));
        let a = uow.manage(EntitySnapshot::detached("Shop\\Entity\\Tag"));
        let b = uow.manage(EntitySnapshot::detached("Shop\\Entity\\Tag"));
        let mapping = RelationMapping::many_to_many("tags", "product_tags");
        uow.load_collection(owner, "tags", vec![a, b]);

        uow.clear_collection(owner, &mapping);

        let deletions = uow.scheduled_collection_deletions();
        assert_eq!(deletions.len(), 1);
        assert_eq!(deletions[0].elements, vec![a, b]);
    }

    #[test]
    fn unknown_handles_are_reported() {
        let mut uow = ChangeTracker::new();
        let err = uow.set(ObjectId::new(99), "title", "x").unwrap_err();
        assert!(matches!(err, CoreError::EntityUnavailable { .. }));
    }

    #[test]
    fn reset_drops_schedules_and_removed_objects() {
        let mut uow = ChangeTracker::new();
        let kept = uow.manage(product("Widget"));
        let gone = uow.manage(product("Gadget"));
        uow.set(kept, "title", "Gizmo").unwrap();
        uow.remove(gone).unwrap();

        uow.reset();

        assert!(uow.scheduled_updates().is_empty());
        assert!(uow.scheduled_deletions().is_empty());
        assert!(uow.get(kept).is_some());
        assert!(uow.get(gone).is_none());
    }
}

//! Human-readable labels for referenced entities.

use std::sync::Arc;

use crate::entity::EntitySnapshot;
use crate::errors::CoreError;
use crate::metadata::EntityRegistry;

/// Label stored when nothing better is available.
pub const UNLABELED: &str = "Unlabeled";

const LABEL_FIELDS: [&str; 3] = ["title", "name", "label"];

/// Produces the label stored with every reference.
///
/// Labels are snapshotted when the record is written, so later renames never
/// rewrite history.
pub trait Label {
    /// Hand over the metadata registry. Called once by the `Auditor` builder.
    fn attach(&mut self, registry: Arc<EntityRegistry>);

    /// Label for `entity`.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::Configuration` when no registry is attached. Any
    /// other error is treated as a resolution failure by the caller.
    fn label(&self, entity: &EntitySnapshot) -> Result<String, CoreError>;
}

/// Default labeler: the first of `title`, `name`, `label` the entity maps,
/// then its own display string if it has one.
#[derive(Debug, Default, Clone)]
pub struct FieldLabeler {
    registry: Option<Arc<EntityRegistry>>,
}

impl FieldLabeler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Label for FieldLabeler {
    fn attach(&mut self, registry: Arc<EntityRegistry>) {
        self.registry = Some(registry);
    }

    fn label(&self, entity: &EntitySnapshot) -> Result<String, CoreError> {
        let Some(registry) = &self.registry else {
            return Err(CoreError::Configuration(
                "labeler has no entity metadata attached".to_string(),
            ));
        };
        let meta = registry.get(&entity.class)?;

        if let Some(field) = LABEL_FIELDS.iter().find(|f| meta.has_scalar(f)) {
            return Ok(entity.get(field).to_text());
        }
        if meta.stringable {
            if let Some(display) = &entity.display {
                return Ok(display.clone());
            }
        }
        Ok(UNLABELED.to_string())
    }
}

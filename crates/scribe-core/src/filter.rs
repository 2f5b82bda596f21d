//! Audited / unaudited entity filter.

use serde::{Deserialize, Serialize};

use crate::metadata::EntityRegistry;

/// Allow-list and deny-list of class names.
///
/// With a non-empty allow-list only its classes (and their subtypes) are
/// audited and the deny-list is ignored. Otherwise everything except the
/// deny-listed classes is audited. Both lists empty audits everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityFilter {
    #[serde(default)]
    pub audited: Vec<String>,
    #[serde(default)]
    pub unaudited: Vec<String>,
}

impl EntityFilter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn audit_only<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audited.extend(classes.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn ignore<I, S>(mut self, classes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unaudited.extend(classes.into_iter().map(Into::into));
        self
    }

    /// Whether mutations of `class` must not be recorded.
    #[must_use]
    pub fn is_unaudited(&self, class: &str, registry: &EntityRegistry) -> bool {
        if self.audited.is_empty() {
            self.unaudited
                .iter()
                .any(|denied| registry.is_subtype(class, denied))
        } else {
            !self
                .audited
                .iter()
                .any(|allowed| registry.is_subtype(class, allowed))
        }
    }
}

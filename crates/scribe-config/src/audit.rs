//! Which entity classes are audited.

use scribe_core::filter::EntityFilter;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AuditConfig {
    /// Allow-list of class names. When non-empty only these classes and
    /// their subtypes are audited.
    #[serde(default)]
    pub audited: Vec<String>,

    /// Deny-list of class names, ignored when `audited` is non-empty.
    #[serde(default)]
    pub unaudited: Vec<String>,
}

impl AuditConfig {
    pub fn filter(&self) -> EntityFilter {
        EntityFilter::new()
            .audit_only(self.audited.iter().cloned())
            .ignore(self.unaudited.iter().cloned())
    }
}

//! Tracked objects as seen by the capture pipeline.

use std::collections::BTreeMap;
use std::fmt;

use crate::value::Value;

/// Opaque handle of an object tracked by a host unit of work.
///
/// Handles are stable for the lifetime of the unit of work, so an entity that
/// gets its auto-increment key after it was staged can still be looked up
/// again at flush time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// Point-in-time view of a domain object: its class and current field values.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntitySnapshot {
    pub object: Option<ObjectId>,
    pub class: String,
    pub fields: BTreeMap<String, Value>,
    /// Output of the object's own string conversion, if it has one.
    pub display: Option<String>,
}

impl EntitySnapshot {
    /// Snapshot of an object that is not tracked by any unit of work, such as
    /// the authenticated user handed over by a security token.
    #[must_use]
    pub fn detached(class: impl Into<String>) -> Self {
        Self {
            object: None,
            class: class.into(),
            fields: BTreeMap::new(),
            display: None,
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(name.into(), value.into());
        self
    }

    #[must_use]
    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// Current value of a field; `Null` when the field is absent.
    #[must_use]
    pub fn get(&self, field: &str) -> &Value {
        static NULL: Value = Value::Null;
        self.fields.get(field).unwrap_or(&NULL)
    }
}

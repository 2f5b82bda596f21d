//! Audit database location.

use std::path::Path;

use serde::{Deserialize, Serialize};

fn default_path() -> String {
    ".scribe/audit.db".to_string()
}

const fn default_foreign_keys() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Local libSQL database file, or `:memory:`.
    #[serde(default = "default_path")]
    pub path: String,

    /// Whether to enforce `audit_logs` → `audit_associations` foreign keys.
    #[serde(default = "default_foreign_keys")]
    pub foreign_keys: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_path(),
            foreign_keys: default_foreign_keys(),
        }
    }
}

impl DatabaseConfig {
    pub fn is_configured(&self) -> bool {
        !self.path.trim().is_empty()
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == ":memory:"
    }

    pub fn path(&self) -> &Path {
        Path::new(&self.path)
    }
}

//! # scribe-config
//!
//! Layered configuration loading for scribe using figment.
//!
//! Configuration sources (in priority order, highest wins):
//! 1. Environment variables (`SCRIBE_*` prefix, `__` as separator)
//! 2. Project-level `.scribe/config.toml`
//! 3. User-level `~/.config/scribe/config.toml`
//! 4. Built-in defaults
//!
//! Figment maps `SCRIBE_DATABASE__PATH` -> `database.path`,
//! `SCRIBE_GENERAL__DEFAULT_LIMIT` -> `general.default_limit`, etc.
//!
//! # Usage
//!
//! ```no_run
//! use scribe_config::ScribeConfig;
//!
//! let config = ScribeConfig::load_with_dotenv().expect("config");
//! let registry = config.registry().expect("entities");
//! println!("{} audited entities in {}", registry.len(), config.database.path);
//! ```

mod audit;
mod database;
mod error;
mod general;

pub use audit::AuditConfig;
pub use database::DatabaseConfig;
pub use error::ConfigError;
pub use general::GeneralConfig;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use scribe_core::filter::EntityFilter;
use scribe_core::metadata::{EntityMeta, EntityRegistry};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ScribeConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub audit: AuditConfig,
    #[serde(default)]
    pub general: GeneralConfig,
    /// Entity metadata, one `[[entities]]` table per audited class.
    #[serde(default)]
    pub entities: Vec<EntityMeta>,
}

impl ScribeConfig {
    /// Load configuration from all sources (TOML files + environment variables).
    ///
    /// Does NOT call `dotenvy`; use [`Self::load_with_dotenv`] for `.env` support.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Figment` if a source cannot be parsed and
    /// `ConfigError::InvalidValue` if a value is out of range.
    pub fn load() -> Result<Self, ConfigError> {
        let config: Self = Self::figment().extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration after reading `.env` from the current directory.
    ///
    /// # Errors
    ///
    /// See [`Self::load`].
    pub fn load_with_dotenv() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::load()
    }

    /// Build the figment provider chain.
    ///
    /// Public so tests and the CLI can layer more providers on top.
    pub fn figment() -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                figment = figment.merge(Toml::file(global_path));
            }
        }

        let local_path = PathBuf::from(".scribe/config.toml");
        if local_path.exists() {
            figment = figment.merge(Toml::file(local_path));
        }

        figment.merge(Env::prefixed("SCRIBE_").split("__"))
    }

    /// Path to the user-global config file.
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("scribe").join("config.toml"))
    }

    /// Check values serde cannot.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` for a zero result limit.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.general.default_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "general.default_limit".into(),
                reason: "must be at least 1".into(),
            });
        }
        Ok(())
    }

    /// Database path, if one is configured.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::NotConfigured` when `database.path` is blank.
    pub fn database_path(&self) -> Result<&str, ConfigError> {
        if self.database.is_configured() {
            Ok(&self.database.path)
        } else {
            Err(ConfigError::NotConfigured {
                section: "database".into(),
            })
        }
    }

    pub fn filter(&self) -> EntityFilter {
        self.audit.filter()
    }

    /// Entity registry built from the `[[entities]]` tables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a class is listed twice or
    /// declares no identifier.
    pub fn registry(&self) -> Result<EntityRegistry, ConfigError> {
        EntityRegistry::from_entities(self.entities.iter().cloned()).map_err(|e| {
            ConfigError::InvalidValue {
                field: "entities".into(),
                reason: e.to_string(),
            }
        })
    }
}

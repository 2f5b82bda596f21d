//! Cross-cutting error types for scribe.
//!
//! Only configuration problems escape the record builder. Metadata failures
//! for individual entities are recovered where they happen (see
//! [`crate::builder::RecordBuilder::build_reference`]). Database errors are
//! defined in `scribe-db`.

use thiserror::Error;

/// Errors that can be raised by the capture pipeline.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A component was wired incorrectly, e.g. a labeler without metadata.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// No metadata is registered for the class.
    #[error("No entity metadata registered for {class}")]
    UnknownEntity { class: String },

    /// The host could not produce a snapshot for a tracked object.
    #[error("Entity {object} is not available in the unit of work")]
    EntityUnavailable { object: String },

    /// Data failed validation (registry contents, identifiers).
    #[error("Validation error: {0}")]
    Validation(String),

    /// Catch-all for unexpected errors.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl CoreError {
    /// Whether this error must abort the surrounding commit.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

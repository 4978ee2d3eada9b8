//! Error types for the rumor diffusion engine.

use thiserror::Error;

use crate::types::{AgentId, RumorId, VariantId};
use crate::validation::ValidationErrors;

/// Coarse classification of a [`RumorError`], used by calling layers to map
/// failures onto their own error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The rumor, variant or relationship does not exist.
    NotFound,
    /// The operation is not legal for the aggregate's current state.
    InvalidState,
    /// Malformed input fields.
    Validation,
    /// Another writer updated the aggregate first.
    Conflict,
    /// Storage, serialization or I/O failure.
    Storage,
    /// Invalid configuration.
    Config,
}

/// Top-level error type for all rumor operations.
#[derive(Error, Debug)]
pub enum RumorError {
    /// No rumor with the given ID exists.
    #[error("Rumor not found: {0}")]
    RumorNotFound(RumorId),

    /// No variant with the given ID exists in the lineage being queried.
    #[error("Variant not found: {0}")]
    VariantNotFound(VariantId),

    /// The acting agent has never heard the rumor.
    #[error("Agent {agent} has not heard rumor {rumor}")]
    AgentUnaware {
        /// The rumor being acted on.
        rumor: RumorId,
        /// The agent that is still unaware of it.
        agent: AgentId,
    },

    /// A variant ID that does not belong to this rumor's lineage.
    #[error("Variant {variant} does not belong to rumor {rumor}")]
    ForeignVariant {
        /// The rumor being acted on.
        rumor: RumorId,
        /// The unknown variant.
        variant: VariantId,
    },

    /// Input fields failed validation.
    #[error("Validation failed: {0}")]
    Validation(ValidationErrors),

    /// Optimistic concurrency check failed on update.
    #[error("Version conflict on rumor {rumor}: expected {expected}, stored {found}")]
    VersionConflict {
        /// The rumor being written.
        rumor: RumorId,
        /// The version the writer loaded.
        expected: u64,
        /// The version currently stored.
        found: u64,
    },

    /// A stored lineage violates the tree invariant.
    #[error("Corrupt variant lineage: {0}")]
    CorruptLineage(String),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite persistence error.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RumorError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::RumorNotFound(_) | Self::VariantNotFound(_) => ErrorKind::NotFound,
            Self::AgentUnaware { .. } | Self::ForeignVariant { .. } => ErrorKind::InvalidState,
            Self::Validation(_) => ErrorKind::Validation,
            Self::VersionConflict { .. } => ErrorKind::Conflict,
            Self::CorruptLineage(_)
            | Self::Serialization(_)
            | Self::Database(_)
            | Self::Io(_) => ErrorKind::Storage,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Whether this is a precondition failure raised by the orchestrator.
    #[must_use]
    pub fn is_precondition(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound | ErrorKind::InvalidState)
    }
}

impl From<ValidationErrors> for RumorError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

/// Convenience Result type alias.
pub type Result<T> = std::result::Result<T, RumorError>;

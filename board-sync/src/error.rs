//! Error types for the board engine
//!
//! Persistence failures are not errors here: a rejected or timed-out write is
//! reported as [`crate::CommitOutcome::RolledBack`]. `BoardError` covers
//! contract violations (busy card, bad drag transition) and invariant
//! violations that would corrupt the store if applied.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for board operations
pub type Result<T> = std::result::Result<T, BoardError>;

/// Errors that can occur in board operations
#[derive(Debug, Error)]
pub enum BoardError {
    /// Lane not found
    #[error("lane not found: {id}")]
    LaneNotFound { id: String },

    /// Card not found
    #[error("card not found: {id}")]
    CardNotFound { id: String },

    /// Lane still holds cards and cannot be removed
    #[error("lane '{id}' has {count} cards and cannot be removed")]
    LaneNotEmpty { id: String, count: usize },

    /// Duplicate ID
    #[error("duplicate {item_type} ID: {id}")]
    DuplicateId { item_type: String, id: String },

    /// A change would break a board invariant
    #[error("invariant violation: {message}")]
    InvariantViolation { message: String },

    /// A mutation on this card is still awaiting confirmation
    #[error("card busy: {id} has an unconfirmed mutation in flight")]
    CardBusy { id: String },

    /// A drag session is already active
    #[error("drag rejected: a drag session is already {state}")]
    DragRejected { state: String },

    /// Gesture event not valid in the current drag state
    #[error("invalid drag transition: {event} while {state}")]
    InvalidTransition { state: String, event: String },

    /// Invalid configuration value
    #[error("invalid config value for {field}: {message}")]
    Config { field: String, message: String },

    /// Configuration file could not be read
    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    /// The engine event loop has shut down
    #[error("board engine is closed")]
    EngineClosed,
}

impl BoardError {
    /// Create an invariant violation error
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }

    /// Create a config error
    pub fn config(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Config {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a duplicate ID error
    pub fn duplicate_id(item_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            item_type: item_type.into(),
            id: id.into(),
        }
    }

    /// Create a lane-not-found error
    pub fn lane_not_found(id: impl ToString) -> Self {
        Self::LaneNotFound { id: id.to_string() }
    }

    /// Create a card-not-found error
    pub fn card_not_found(id: impl ToString) -> Self {
        Self::CardNotFound { id: id.to_string() }
    }

    /// Whether this indicates a bug in a caller rather than a user-level condition
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::LaneNotFound { .. }
                | Self::CardNotFound { .. }
                | Self::LaneNotEmpty { .. }
                | Self::DuplicateId { .. }
                | Self::InvariantViolation { .. }
        )
    }

    /// Check if this is a retryable error
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::CardBusy { .. } | Self::DragRejected { .. })
    }
}

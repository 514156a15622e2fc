//! Error types for deckbridge-core.

use thiserror::Error;

/// Result type alias using RecordError.
pub type Result<T> = std::result::Result<T, RecordError>;

/// Errors raised while normalizing raw rows into records.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RecordError {
    #[error("record is missing field `{field}`")]
    MissingField { field: &'static str },

    #[error("record {id} has an invalid timestamp: {value}")]
    InvalidTimestamp { id: String, value: String },
}

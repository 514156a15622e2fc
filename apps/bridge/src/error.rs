//! Error types for a sync run.

use deckbridge_core::RecordError;
use serde::Serialize;
use thiserror::Error;

/// Errors that abort a sync run.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("Connection error: {0}")]
    Connectivity(String),

    #[error("Backend error in {action}: {message}")]
    Backend { action: String, message: String },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Data error: {0}")]
    Data(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Sync already in progress")]
    AlreadyInProgress,
}

impl From<RecordError> for SyncError {
    fn from(e: RecordError) -> Self {
        Self::Data(e.to_string())
    }
}

/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// A single item that failed inside an otherwise successful batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchFailure {
    pub step: &'static str,
    pub item: String,
    pub message: String,
}

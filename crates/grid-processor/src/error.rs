//! Error types for grid processing.

use edr_protocol::EdrError;
use thiserror::Error;

/// Errors that can occur during grid processing.
#[derive(Error, Debug)]
pub enum GridProcessorError {
    /// Failed to open the store or one of its arrays.
    #[error("failed to open store: {0}")]
    OpenFailed(String),

    /// Failed to read or decompress a chunk.
    #[error("failed to read grid data: {0}")]
    ReadFailed(String),

    /// The requested location or instant is outside the dataset.
    #[error("requested {requested} is outside dataset bounds {valid}")]
    OutOfBounds { requested: String, valid: String },

    /// The requested field is not part of the dataset.
    #[error("field '{name}' not found (available: {})", available.join(", "))]
    FieldNotFound { name: String, available: Vec<String> },

    /// Manifest, axis or array metadata is missing or inconsistent.
    #[error("invalid grid metadata: {0}")]
    InvalidMetadata(String),

    /// Storage/IO error.
    #[error("storage error: {0}")]
    StorageError(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    ConfigError(String),
}

impl GridProcessorError {
    /// Create an OpenFailed error.
    pub fn open_failed(msg: impl Into<String>) -> Self {
        Self::OpenFailed(msg.into())
    }

    /// Create a ReadFailed error.
    pub fn read_failed(msg: impl Into<String>) -> Self {
        Self::ReadFailed(msg.into())
    }

    /// Create an OutOfBounds error.
    pub fn out_of_bounds(requested: impl Into<String>, valid: impl Into<String>) -> Self {
        Self::OutOfBounds {
            requested: requested.into(),
            valid: valid.into(),
        }
    }

    /// Create an InvalidMetadata error.
    pub fn invalid_metadata(msg: impl Into<String>) -> Self {
        Self::InvalidMetadata(msg.into())
    }
}

impl From<std::io::Error> for GridProcessorError {
    fn from(err: std::io::Error) -> Self {
        Self::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for GridProcessorError {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidMetadata(err.to_string())
    }
}

impl From<GridProcessorError> for EdrError {
    fn from(err: GridProcessorError) -> Self {
        match err {
            GridProcessorError::OutOfBounds { requested, valid } => {
                EdrError::OutOfBounds { requested, valid }
            }
            GridProcessorError::FieldNotFound { name, available } => {
                EdrError::FieldNotFound { name, available }
            }
            other => EdrError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Result type for grid processor operations.
pub type Result<T> = std::result::Result<T, GridProcessorError>;

//! EDR API error types.

use thiserror::Error;

use crate::geometry::GeometryParseError;
use crate::responses::ExceptionResponse;
use crate::temporal::DateTimeParseError;

/// Errors that can occur answering an EDR query.
#[derive(Debug, Error)]
pub enum EdrError {
    /// The `coords` parameter could not be parsed or is not valid for the query.
    #[error("Coordinate error: {0}")]
    MalformedGeometry(#[from] GeometryParseError),

    /// The `datetime` parameter could not be parsed.
    #[error("Datetime error: {0}")]
    MalformedDateTime(#[from] DateTimeParseError),

    /// Requested location or instant lies entirely outside the dataset.
    #[error("Requested {requested} is outside the dataset extent {valid}")]
    OutOfBounds { requested: String, valid: String },

    /// Requested parameter is not served by the dataset.
    #[error("Parameter '{name}' not available. Available: {}", available.join(", "))]
    FieldNotFound { name: String, available: Vec<String> },

    /// Collection id does not match the loaded dataset.
    #[error("Collection not found: {0}")]
    CollectionNotFound(String),

    /// The backing store could not be read.
    #[error("Data store unavailable: {0}")]
    StoreUnavailable(String),
}

impl EdrError {
    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            EdrError::MalformedGeometry(_) => 400,
            EdrError::MalformedDateTime(_) => 400,
            EdrError::OutOfBounds { .. } => 400,
            EdrError::FieldNotFound { .. } => 400,
            EdrError::CollectionNotFound(_) => 404,
            EdrError::StoreUnavailable(_) => 503,
        }
    }

    /// Convert to an ExceptionResponse.
    pub fn to_exception(&self) -> ExceptionResponse {
        let detail = self.to_string();
        match self {
            EdrError::CollectionNotFound(_) => ExceptionResponse::not_found(detail),
            EdrError::StoreUnavailable(_) => ExceptionResponse::service_unavailable(detail),
            EdrError::MalformedGeometry(_)
            | EdrError::MalformedDateTime(_)
            | EdrError::OutOfBounds { .. }
            | EdrError::FieldNotFound { .. } => ExceptionResponse::bad_request(detail),
        }
    }
}

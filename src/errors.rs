use std::io;

use serde::Serialize;
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    BadRequest(String),
    #[error("web server failed: {0}")]
    Server(String),
}

/// Failures the validation pipeline reports to callers.
///
/// `EmptyBatch` and `MissingFields` reject a batch before any lookup runs,
/// `GeocodeProvider` is contained per key, and `Persistence` fails the
/// batch that triggered the write.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ValidationError {
    #[error("No body found on validate address request.")]
    EmptyBatch,
    #[error("Missing key(s): {}", .fields.join(","))]
    MissingFields { fields: Vec<String> },
    #[error("Error making request to Google Maps API")]
    GeocodeProvider { message: String },
    #[error("Error persisting data")]
    Persistence,
}

impl ValidationError {
    pub fn kind(&self) -> &'static str {
        match self {
            ValidationError::EmptyBatch => "empty_batch",
            ValidationError::MissingFields { .. } => "missing_fields",
            ValidationError::GeocodeProvider { .. } => "geocode_provider",
            ValidationError::Persistence => "persistence",
        }
    }

    pub fn provider(message: impl Into<String>) -> Self {
        ValidationError::GeocodeProvider {
            message: message.into(),
        }
    }

    /// Batch-level errors reject the whole request.
    pub fn is_batch_level(&self) -> bool {
        !matches!(self, ValidationError::GeocodeProvider { .. })
    }
}

impl AppError {
    /// Whether the error was caused by the request rather than the service.
    pub fn is_client_error(&self) -> bool {
        match self {
            AppError::Validation(err) => matches!(
                err,
                ValidationError::EmptyBatch | ValidationError::MissingFields { .. }
            ),
            AppError::BadRequest(_) | AppError::Json(_) => true,
            _ => false,
        }
    }
}

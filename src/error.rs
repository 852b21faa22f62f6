//! Error types for heading-harvest.
//!
//! Traversal and extraction problems are recovered locally and surface as
//! warnings; the variants here are the failures that cross a boundary
//! (repository, messaging, section construction).

use serde::{Deserialize, Serialize};

/// Error type for section, repository and overlay operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// A section or request failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The repository has no room left for the write.
    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Generic repository failure.
    #[error("Repository error: {0}")]
    Repository(String),

    /// The document or container cannot be used for extraction.
    #[error("Unusable page structure: {0}")]
    Structure(String),

    /// A URL could not be parsed or is not absolute.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// No mounted control carries the given button id.
    #[error("No control mounted with id {0}")]
    UnknownControl(String),

    /// A caller-supplied callback reported a failure.
    #[error("Callback failed: {0}")]
    Callback(String),
}

/// Machine-readable error codes handed to the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Validation failure.
    ValidationError,
    /// Capacity limit hit.
    QuotaExceeded,
    /// Storage failure.
    RepositoryError,
    /// Everything else.
    UnknownError,
}

impl Error {
    /// Classify the error for the messaging boundary.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) | Self::InvalidUrl(_) => ErrorCode::ValidationError,
            Self::QuotaExceeded(_) => ErrorCode::QuotaExceeded,
            Self::Repository(_) => ErrorCode::RepositoryError,
            Self::Structure(_) | Self::UnknownControl(_) | Self::Callback(_) => {
                ErrorCode::UnknownError
            }
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::InvalidUrl(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Repository(format!("serialization failed: {err}"))
    }
}

/// Result type alias for heading-harvest operations.
pub type Result<T> = std::result::Result<T, Error>;

//! Request/response payloads and error definitions.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http::envelope::{ErrorDetail, FieldError};
use crate::storage::StoreError;

/// Body of `POST /shorten`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ShortenRequest {
    pub url: String,
}

/// Successful `POST /shorten` reply.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ShortenResponse {
    pub short_url: String,
}

/// Errors that can occur while shortening or resolving.
#[derive(Debug, Error)]
pub enum ShortenerError {
    /// The submitted URL was rejected.
    #[error("invalid url: {0}")]
    InvalidUrl(String),

    /// The `Host` header cannot form a short URL.
    #[error("invalid host: {0}")]
    InvalidHost(String),

    /// The request body could not be decoded.
    #[error("malformed request body: {0}")]
    MalformedBody(String),

    /// No mapping for the code.
    #[error("short url not found")]
    NotFound(String),

    /// Every generated code collided.
    #[error("could not allocate a unique short code after {0} attempts")]
    Exhausted(u32),

    /// Underlying store failed. Details stay server-side.
    #[error("storage failure")]
    Storage(#[source] StoreError),

    /// Store did not answer a health probe.
    #[error("service unavailable")]
    Unavailable(#[source] StoreError),
}

/// Result type for shortener operations.
pub type ShortenerResult<T> = Result<T, ShortenerError>;

impl ErrorDetail for ShortenerError {
    fn status(&self) -> Option<StatusCode> {
        match self {
            ShortenerError::InvalidUrl(_)
            | ShortenerError::InvalidHost(_)
            | ShortenerError::MalformedBody(_) => Some(StatusCode::BAD_REQUEST),
            ShortenerError::NotFound(_) => Some(StatusCode::NOT_FOUND),
            ShortenerError::Exhausted(_) => Some(StatusCode::CONFLICT),
            ShortenerError::Unavailable(_) => Some(StatusCode::SERVICE_UNAVAILABLE),
            ShortenerError::Storage(_) => None,
        }
    }

    fn field_errors(&self) -> Vec<FieldError> {
        match self {
            ShortenerError::InvalidUrl(_) => vec![FieldError::new("url", self.to_string())],
            ShortenerError::InvalidHost(_) => vec![FieldError::new("host", self.to_string())],
            ShortenerError::MalformedBody(_) => vec![FieldError::new("", self.to_string())],
            _ => Vec::new(),
        }
    }
}

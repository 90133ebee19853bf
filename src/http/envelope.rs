//! Uniform error envelope.
//!
//! Every error leaving the service is rendered as:
//!
//! ```text
//! { "error": true,
//!   "message": "<string>",
//!   "errors": { "meta": { "errorsLength": <n>,
//!                         "first": { "fieldName": "<string>", "message": "<string>" } } } }
//! ```
//!
//! Domain errors describe themselves through [`ErrorDetail`]; anything else
//! is wrapped in [`OpaqueError`] and takes the caller's fallback status.

use std::fmt;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// One validation failure, or a wrapped underlying error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldError {
    /// Offending field; empty when the error is not tied to one.
    pub field_name: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field_name: field_name.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorMeta {
    /// Always at least 1.
    pub errors_length: usize,
    pub first: FieldError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorSummary {
    pub meta: ErrorMeta,
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    pub error: bool,
    pub message: String,
    pub errors: ErrorSummary,
}

impl ErrorEnvelope {
    fn new(message: String, errors_length: usize, first: FieldError) -> Self {
        Self {
            error: true,
            message,
            errors: ErrorSummary {
                meta: ErrorMeta {
                    errors_length,
                    first,
                },
            },
        }
    }
}

/// Structured detail an error can expose to the HTTP boundary.
///
/// Both methods default to "no detail", so implementing the trait with an
/// empty body yields an opaque error.
pub trait ErrorDetail: fmt::Display {
    /// Status code the error maps to, if it has an opinion.
    fn status(&self) -> Option<StatusCode> {
        None
    }

    /// Field-level failures, in the order they were found.
    fn field_errors(&self) -> Vec<FieldError> {
        Vec::new()
    }
}

/// Error with no structured detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueError(String);

impl OpaqueError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

impl fmt::Display for OpaqueError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for OpaqueError {}

impl ErrorDetail for OpaqueError {}

const UNKNOWN_ERROR: &str = "unknown error";

/// Convert any error into a status code and envelope.
///
/// The error's own status wins; `fallback` applies when it has none. With
/// exactly one field error, that error's message becomes the top-level
/// message. Without field errors the envelope carries the error's text as
/// its single entry.
pub fn normalize<E>(err: &E, fallback: StatusCode) -> (StatusCode, ErrorEnvelope)
where
    E: ErrorDetail + ?Sized,
{
    let status = err.status().unwrap_or(fallback);
    let mut message = err.to_string();
    if message.trim().is_empty() {
        message = UNKNOWN_ERROR.to_string();
    }

    let fields = err.field_errors();
    let envelope = match fields.first() {
        Some(first) => {
            if fields.len() == 1 {
                message = first.message.clone();
            }
            ErrorEnvelope::new(message, fields.len(), first.clone())
        }
        None => {
            let first = FieldError::new("", message.clone());
            ErrorEnvelope::new(message, 1, first)
        }
    };
    (status, envelope)
}

/// Normalize and render as a JSON response.
pub fn error_response<E>(err: &E, fallback: StatusCode) -> Response
where
    E: ErrorDetail + ?Sized,
{
    let (status, envelope) = normalize(err, fallback);
    (status, Json(envelope)).into_response()
}

/// Bare `{"message": ...}` body used by the routing fallbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageBody {
    pub message: String,
}

pub fn message_response(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(MessageBody {
            message: message.to_string(),
        }),
    )
        .into_response()
}

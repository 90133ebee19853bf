//! Response encoding.
//!
//! # Responsibilities
//! - Turn a handler result (payload, headers, error) into the wire response
//! - Render errors through the envelope normalizer
//! - Write pre-serialized byte payloads verbatim
//!
//! # Design Decisions
//! - Each request carries an [`Exchange`]: a single-slot commit flag shared
//!   with the timeout guard. Whoever commits first owns the response; the
//!   loser writes nothing.
//! - Raw byte payloads get no implicit content type

use std::convert::Infallible;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    body::Body,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;

use crate::http::envelope::{normalize, ErrorDetail};

/// Per-request commit flag.
#[derive(Debug, Clone, Default)]
pub struct Exchange {
    committed: Arc<AtomicBool>,
}

impl Exchange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the response. Returns `true` for exactly one caller.
    pub fn commit(&self) -> bool {
        !self.committed.swap(true, Ordering::AcqRel)
    }

    pub fn is_committed(&self) -> bool {
        self.committed.load(Ordering::Acquire)
    }
}

impl<S> FromRequestParts<S> for Exchange
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts.extensions.get::<Exchange>().cloned().unwrap_or_default())
    }
}

/// Body of a successful reply.
#[derive(Debug, Clone)]
pub enum Payload {
    /// Serialized as JSON.
    Json(serde_json::Value),
    /// Written verbatim.
    Raw(Bytes),
    Empty,
}

/// Successful handler output.
#[derive(Debug, Clone)]
pub struct Reply {
    status: StatusCode,
    headers: HeaderMap,
    payload: Payload,
}

impl Reply {
    /// 200 with a JSON body.
    pub fn json(value: serde_json::Value) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            payload: Payload::Json(value),
        }
    }

    /// 200 with a pre-serialized body.
    pub fn raw(bytes: impl Into<Bytes>) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            payload: Payload::Raw(bytes.into()),
        }
    }

    /// 302 to `location` with an empty body.
    pub fn redirect(location: HeaderValue) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(header::LOCATION, location);
        Self {
            status: StatusCode::FOUND,
            headers,
            payload: Payload::Empty,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

/// Encode a handler result. Returns `None` when the exchange was already
/// committed elsewhere, in which case nothing may be written.
pub fn encode<E>(exchange: &Exchange, result: Result<Reply, E>) -> Option<Response>
where
    E: ErrorDetail + fmt::Debug,
{
    if !exchange.commit() {
        tracing::debug!("Response already committed, discarding handler result");
        return None;
    }

    let reply = match result {
        Ok(reply) => reply,
        Err(err) => {
            let (status, envelope) = normalize(&err, StatusCode::INTERNAL_SERVER_ERROR);
            if status.is_server_error() {
                tracing::error!(status = status.as_u16(), error = %err, detail = ?err, "Request failed");
            } else {
                tracing::info!(status = status.as_u16(), error = %err, "Request rejected");
            }
            return Some((status, Json(envelope)).into_response());
        }
    };

    let Reply {
        status,
        headers,
        payload,
    } = reply;

    let mut response = match payload {
        Payload::Json(value) => (status, Json(value)).into_response(),
        Payload::Raw(bytes) => {
            let mut response = Response::new(Body::from(bytes));
            *response.status_mut() = status;
            response
        }
        Payload::Empty => {
            let mut response = Response::new(Body::empty());
            *response.status_mut() = status;
            response
        }
    };
    for (name, value) in headers.iter() {
        response.headers_mut().insert(name.clone(), value.clone());
    }
    Some(response)
}

/// Handler-facing wrapper around [`encode`]. A losing encoder returns an
/// empty placeholder that the timeout guard never forwards.
pub fn respond<E>(exchange: &Exchange, result: Result<Reply, E>) -> Response
where
    E: ErrorDetail + fmt::Debug,
{
    encode(exchange, result).unwrap_or_else(|| StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::envelope::{ErrorEnvelope, OpaqueError};
    use crate::shortener::ShortenerError;

    async fn body_bytes(response: Response) -> Bytes {
        axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    #[test]
    fn test_commit_is_single_slot() {
        let exchange = Exchange::new();
        let other = exchange.clone();
        assert!(!exchange.is_committed());
        assert!(exchange.commit());
        assert!(!other.commit());
        assert!(other.is_committed());
    }

    #[tokio::test]
    async fn test_json_payload() {
        let reply = Reply::json(serde_json::json!({ "shortUrl": "http://host/abc123" }));
        let response = encode::<OpaqueError>(&Exchange::new(), Ok(reply)).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            "application/json"
        );
        let body: serde_json::Value = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert_eq!(body["shortUrl"], "http://host/abc123");
    }

    #[tokio::test]
    async fn test_raw_payload_written_verbatim() {
        let bytes = Bytes::from_static(b"\x00\x01not json\xff");
        let response = encode::<OpaqueError>(&Exchange::new(), Ok(Reply::raw(bytes.clone()))).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(header::CONTENT_TYPE).is_none());
        assert_eq!(body_bytes(response).await, bytes);
    }

    #[tokio::test]
    async fn test_headers_applied() {
        let reply = Reply::raw("col1,col2\n")
            .with_header(header::CONTENT_TYPE, HeaderValue::from_static("text/csv"))
            .with_header(
                HeaderName::from_static("x-export"),
                HeaderValue::from_static("links"),
            );
        let response = encode::<OpaqueError>(&Exchange::new(), Ok(reply)).unwrap();
        assert_eq!(response.headers().get(header::CONTENT_TYPE).unwrap(), "text/csv");
        assert_eq!(response.headers().get("x-export").unwrap(), "links");
    }

    #[tokio::test]
    async fn test_redirect() {
        let reply = Reply::redirect(HeaderValue::from_static("https://example.com"));
        let response = encode::<OpaqueError>(&Exchange::new(), Ok(reply)).unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "https://example.com"
        );
        assert!(body_bytes(response).await.is_empty());
    }

    #[tokio::test]
    async fn test_error_goes_through_envelope() {
        let err = ShortenerError::NotFound("zzzzzz".into());
        let response = encode(&Exchange::new(), Err::<Reply, _>(err)).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let env: ErrorEnvelope = serde_json::from_slice(&body_bytes(response).await).unwrap();
        assert!(env.error);
        assert_eq!(env.message, "short url not found");
    }

    #[tokio::test]
    async fn test_opaque_error_defaults_to_500() {
        let response =
            encode(&Exchange::new(), Err::<Reply, _>(OpaqueError::new("boom"))).unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_committed_exchange_writes_nothing() {
        let exchange = Exchange::new();
        assert!(exchange.commit());

        let ok = encode::<OpaqueError>(&exchange, Ok(Reply::json(serde_json::json!({}))));
        assert!(ok.is_none());
        let err = encode(&exchange, Err::<Reply, _>(OpaqueError::new("late")));
        assert!(err.is_none());
    }
}

//! Route handlers.
//!
//! Each handler computes a `Result<Reply, ShortenerError>` and hands it to
//! the response encoder together with the request's [`Exchange`].

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::Response,
    Json,
};
use serde_json::json;

use crate::http::envelope::message_response;
use crate::http::response::{respond, Exchange, Reply};
use crate::shortener::{
    ShortenRequest, ShortenResponse, ShortenerError, ShortenerResult, ShortenerService,
};

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub shortener: ShortenerService,
    /// Prefix for generated short URLs; derived per request when unset.
    pub public_base_url: Option<String>,
}

/// `POST /shorten`: body `{"url": "..."}`, reply `{"shortUrl": "..."}`.
pub async fn create_short_url(
    State(state): State<AppState>,
    exchange: Exchange,
    headers: HeaderMap,
    body: Result<Json<ShortenRequest>, JsonRejection>,
) -> Response {
    let result = shorten(&state, &headers, body).await;
    respond(&exchange, result)
}

async fn shorten(
    state: &AppState,
    headers: &HeaderMap,
    body: Result<Json<ShortenRequest>, JsonRejection>,
) -> ShortenerResult<Reply> {
    let Json(request) = body.map_err(|e| ShortenerError::MalformedBody(e.body_text()))?;
    let base = base_url(state.public_base_url.as_deref(), headers)?;
    let link = state.shortener.shorten(&request.url).await?;
    let reply = ShortenResponse {
        short_url: format!("{}/{}", base, link.code),
    };
    Ok(Reply::json(json!(reply)))
}

/// `GET /{code}`: 302 to the stored URL.
pub async fn redirect(
    State(state): State<AppState>,
    exchange: Exchange,
    Path(code): Path<String>,
) -> Response {
    let result = resolve(&state, &code).await;
    respond(&exchange, result)
}

async fn resolve(state: &AppState, code: &str) -> ShortenerResult<Reply> {
    let link = state.shortener.resolve(code).await?;
    tracing::debug!(code = %code, "Redirecting");
    Ok(Reply::redirect(location_header(&link.url)?))
}

/// `GET /_health`: 200 when the store answers.
pub async fn health(State(state): State<AppState>, exchange: Exchange) -> Response {
    let result = state
        .shortener
        .health()
        .await
        .map(|()| Reply::json(json!({ "status": "ok" })));
    respond(&exchange, result)
}

/// Unmatched route.
pub async fn not_found() -> Response {
    message_response(StatusCode::NOT_FOUND, "url not found")
}

/// Matched route, unsupported method.
pub async fn method_not_allowed() -> Response {
    message_response(StatusCode::METHOD_NOT_ALLOWED, "method not allowed")
}

/// Public origin for short URLs: configured value, else `X-Forwarded-Proto`
/// (default `http`) plus the `Host` header. The derived origin must parse as
/// a bare `scheme://host[:port]`.
fn base_url(configured: Option<&str>, headers: &HeaderMap) -> ShortenerResult<String> {
    if let Some(base) = configured {
        return Ok(base.trim_end_matches('/').to_string());
    }
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .filter(|v| matches!(*v, "http" | "https"))
        .unwrap_or("http");
    let host = match headers.get(header::HOST) {
        Some(value) => value
            .to_str()
            .map_err(|_| ShortenerError::InvalidHost("host header is not valid ASCII".to_string()))?,
        None => "localhost",
    };

    let parsed = url::Url::parse(&format!("{scheme}://{host}"))
        .map_err(|e| ShortenerError::InvalidHost(e.to_string()))?;
    let bare = parsed.host_str().is_some()
        && parsed.username().is_empty()
        && parsed.password().is_none()
        && parsed.path() == "/"
        && parsed.query().is_none()
        && parsed.fragment().is_none();
    if !bare {
        return Err(ShortenerError::InvalidHost(format!("{host:?} is not a host")));
    }
    Ok(parsed.origin().ascii_serialization())
}

/// Stored ASCII URLs are used as-is; others are re-serialized by `url`,
/// which percent-encodes the path and punycodes the host.
fn location_header(url: &str) -> Result<HeaderValue, ShortenerError> {
    let invalid = || ShortenerError::InvalidUrl("stored url is not a valid location".to_string());
    if url.is_ascii() {
        return HeaderValue::from_str(url).map_err(|_| invalid());
    }
    let parsed = url::Url::parse(url).map_err(|_| invalid())?;
    HeaderValue::from_str(parsed.as_str()).map_err(|_| invalid())
}

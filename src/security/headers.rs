//! Security response headers.
//!
//! # Responsibilities
//! - Add a fixed set of hardening headers to every response
//!
//! # Design Decisions
//! - A header already set by a handler is left alone
//! - Applied outside the recovery and timeout guards so 408 and 500
//!   envelopes carry the same headers as normal replies

use axum::{
    body::Body,
    http::{HeaderName, HeaderValue, Request},
    middleware::Next,
    response::Response,
};

/// Headers added when absent.
pub const SECURITY_HEADERS: [(&str, &str); 6] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("x-xss-protection", "1; mode=block"),
    ("x-dns-prefetch-control", "off"),
    ("x-download-options", "noopen"),
    ("strict-transport-security", "max-age=5184000; includeSubDomains"),
];

/// Middleware adding [`SECURITY_HEADERS`] to the response.
pub async fn security_headers(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    for (name, value) in SECURITY_HEADERS {
        headers
            .entry(HeaderName::from_static(name))
            .or_insert(HeaderValue::from_static(value));
    }
    response
}

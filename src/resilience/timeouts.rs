//! Request timeout enforcement.
//!
//! # Responsibilities
//! - Run the downstream handler on its own task
//! - Race it against a deadline anchored at request entry
//! - Answer 408 with the error envelope when the deadline wins
//!
//! # Design Decisions
//! - Uses Tokio's timer facilities
//! - The guard and the handler's encoder race for the request's
//!   [`Exchange`]; a handler that finishes late can no longer write
//! - `cancel_on_timeout` aborts the handler task after a 408. When disabled
//!   the task is detached and runs to completion in the background
//! - A handler that committed before the deadline gets a short grace period
//!   to hand its response over; after that the guard answers 408 anyway
//! - Handler panics are caught on the handler task, where the panic hook can
//!   attach a backtrace, and re-raised so the recovery guard above sees them

use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::Response,
};
use tokio::task::JoinError;
use tokio::time::Instant;

use crate::config::TimeoutConfig;
use crate::http::envelope::{error_response, OpaqueError};
use crate::http::response::Exchange;
use crate::observability::metrics;
use crate::resilience::recovery::{catch_panic, PanicReport};

/// How long a handler that already committed may take to return its response.
pub const COMMIT_GRACE: Duration = Duration::from_millis(250);

/// Process-wide request timeout policy. Read-only after startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTimeout {
    pub duration: Duration,
    pub cancel_on_timeout: bool,
}

impl RequestTimeout {
    pub fn new(duration: Duration) -> Self {
        Self {
            duration,
            cancel_on_timeout: true,
        }
    }

    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self {
            duration: config.request_timeout(),
            cancel_on_timeout: config.cancel_on_timeout,
        }
    }

    pub fn detached(mut self) -> Self {
        self.cancel_on_timeout = false;
        self
    }
}

/// Message carried by a 408 response, e.g. "Request timed out after 10s".
pub fn timeout_message(duration: Duration) -> String {
    format!("Request timed out after {}", format_duration(duration))
}

/// Render a duration in hour/minute/second components: `250ms`, `10s`,
/// `1m30s`, `2m0s`, `1h0m0s`, `1.5s`.
pub fn format_duration(duration: Duration) -> String {
    const NANOS_PER_SEC: u128 = 1_000_000_000;

    let nanos = duration.as_nanos();
    if nanos == 0 {
        return "0s".to_string();
    }
    if nanos < 1_000 {
        return format!("{nanos}ns");
    }
    if nanos < 1_000_000 {
        return format!("{}µs", decimal(nanos, 1_000));
    }
    if nanos < NANOS_PER_SEC {
        return format!("{}ms", decimal(nanos, 1_000_000));
    }

    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = decimal(
        u128::from(total_secs % 60) * NANOS_PER_SEC + u128::from(duration.subsec_nanos()),
        NANOS_PER_SEC,
    );
    if hours > 0 {
        format!("{hours}h{minutes}m{seconds}s")
    } else if minutes > 0 {
        format!("{minutes}m{seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// `value / unit` with the fraction printed only when non-zero.
fn decimal(value: u128, unit: u128) -> String {
    let whole = value / unit;
    let fraction = value % unit;
    if fraction == 0 {
        return whole.to_string();
    }
    let width = unit.to_string().len() - 1;
    let digits = format!("{fraction:0width$}");
    format!("{whole}.{}", digits.trim_end_matches('0'))
}

/// Middleware bounding how long a request may take.
pub async fn timeout_middleware(
    State(timeout): State<RequestTimeout>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let deadline = Instant::now() + timeout.duration;
    let exchange = Exchange::new();
    request.extensions_mut().insert(exchange.clone());

    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let mut handle = tokio::spawn(catch_panic(next.run(request)));

    tokio::select! {
        joined = &mut handle => finish(joined),
        () = tokio::time::sleep_until(deadline) => {
            if !exchange.commit() {
                // The handler committed first; its response is on the way.
                match tokio::time::timeout(COMMIT_GRACE, &mut handle).await {
                    Ok(joined) => return finish(joined),
                    Err(_) => {
                        handle.abort();
                        tracing::warn!(
                            method = %method,
                            path = %path,
                            timeout = ?timeout.duration,
                            "Committed handler stalled past the deadline"
                        );
                        metrics::record_timeout();
                        return error_response(
                            &OpaqueError::new(timeout_message(timeout.duration)),
                            StatusCode::REQUEST_TIMEOUT,
                        );
                    }
                }
            }
            if timeout.cancel_on_timeout {
                handle.abort();
            }
            tracing::warn!(
                method = %method,
                path = %path,
                timeout = ?timeout.duration,
                cancelled = timeout.cancel_on_timeout,
                "Request timed out"
            );
            metrics::record_timeout();
            error_response(
                &OpaqueError::new(timeout_message(timeout.duration)),
                StatusCode::REQUEST_TIMEOUT,
            )
        }
    }
}

fn finish(joined: Result<Result<Response, PanicReport>, JoinError>) -> Response {
    match joined {
        Ok(Ok(response)) => response,
        Ok(Err(report)) => std::panic::resume_unwind(Box::new(report)),
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => {
            tracing::error!(error = %e, "Handler task did not complete");
            error_response(
                &OpaqueError::new("request handler was cancelled"),
                StatusCode::INTERNAL_SERVER_ERROR,
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::envelope::ErrorEnvelope;
    use crate::http::response::{respond, Reply};
    use axum::{middleware, routing::get, Router};
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn app(timeout: RequestTimeout, finished: Arc<AtomicBool>) -> Router {
        Router::new()
            .route("/fast", get(|| async { "fast" }))
            .route(
                "/slow",
                get(move |exchange: Exchange| {
                    let finished = finished.clone();
                    async move {
                        tokio::time::sleep(Duration::from_secs(30)).await;
                        finished.store(true, Ordering::SeqCst);
                        respond::<OpaqueError>(&exchange, Ok(Reply::json(serde_json::json!({"late": true}))))
                    }
                }),
            )
            .layer(middleware::from_fn_with_state(timeout, timeout_middleware))
    }

    async fn call(app: Router, path: &str) -> Response {
        app.oneshot(Request::get(path).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[test]
    fn test_timeout_message() {
        assert_eq!(timeout_message(Duration::from_secs(10)), "Request timed out after 10s");
        assert_eq!(timeout_message(Duration::from_millis(250)), "Request timed out after 250ms");
        assert_eq!(timeout_message(Duration::from_secs(90)), "Request timed out after 1m30s");
        assert_eq!(timeout_message(Duration::from_secs(120)), "Request timed out after 2m0s");
        assert_eq!(timeout_message(Duration::from_secs(3600)), "Request timed out after 1h0m0s");
    }

    #[test]
    fn test_format_duration_fractions() {
        assert_eq!(format_duration(Duration::ZERO), "0s");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.5s");
        assert_eq!(format_duration(Duration::from_micros(1500)), "1.5ms");
        assert_eq!(format_duration(Duration::from_nanos(1500)), "1.5µs");
        assert_eq!(format_duration(Duration::from_nanos(7)), "7ns");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1h2m5s");
    }

    #[tokio::test]
    async fn test_fast_handler_passes_through() {
        let timeout = RequestTimeout::new(Duration::from_secs(10));
        let response = call(app(timeout, Arc::default()), "/fast").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"fast");
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_handler_times_out() {
        let timeout = RequestTimeout::new(Duration::from_secs(10));
        let finished = Arc::new(AtomicBool::new(false));
        let response = call(app(timeout, finished.clone()), "/slow").await;

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let env: ErrorEnvelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(env.message, "Request timed out after 10s");
        assert_eq!(env.errors.meta.errors_length, 1);

        // Aborted: the handler never reaches its end.
        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detached_handler_keeps_running_but_cannot_write() {
        let timeout = RequestTimeout::new(Duration::from_secs(10)).detached();
        let finished = Arc::new(AtomicBool::new(false));
        let response = call(app(timeout, finished.clone()), "/slow").await;
        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(finished.load(Ordering::SeqCst));
    }

    fn committing_app(timeout: RequestTimeout, finish_after: Duration) -> Router {
        Router::new()
            .route(
                "/committed",
                get(move |exchange: Exchange| async move {
                    assert!(exchange.commit());
                    tokio::time::sleep(finish_after).await;
                    (StatusCode::CREATED, "done")
                }),
            )
            .layer(middleware::from_fn_with_state(timeout, timeout_middleware))
    }

    #[tokio::test(start_paused = true)]
    async fn test_committed_handler_finishing_within_grace_wins() {
        let timeout = RequestTimeout::new(Duration::from_secs(1));
        let app = committing_app(timeout, Duration::from_millis(1100));
        let response = call(app, "/committed").await;
        assert_eq!(response.status(), StatusCode::CREATED);
    }

    #[tokio::test(start_paused = true)]
    async fn test_committed_handler_that_stalls_still_times_out() {
        let timeout = RequestTimeout::new(Duration::from_secs(1));
        let app = committing_app(timeout, Duration::from_secs(5));
        let response = call(app, "/committed").await;

        assert_eq!(response.status(), StatusCode::REQUEST_TIMEOUT);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let env: ErrorEnvelope = serde_json::from_slice(&body).unwrap();
        assert_eq!(env.message, "Request timed out after 1s");
    }
}

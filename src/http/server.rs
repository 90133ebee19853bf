//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create the Axum router with all handlers
//! - Wire up middleware (request ID, tracing, compression, headers, CORS,
//!   panic recovery, request timeout)
//! - Bind server to listener and serve until shutdown
//!
//! # Middleware ordering (outermost to innermost)
//! 1. `SetRequestId` assigns a UUID v4 `x-request-id`
//! 2. `Trace` opens the request span
//! 3. Request metrics
//! 4. `Compression` gzips eligible bodies
//! 5. Security headers
//! 6. `CORS`
//! 7. `PropagateRequestId` echoes the ID on the response
//! 8. Panic recovery
//! 9. Request timeout
//! 10. Route handler, which answers through the response encoder

use std::future::Future;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowMethods, AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
    CompressionLevel,
};

use crate::config::ServiceConfig;
use crate::http::handlers::{self, AppState};
use crate::http::request::{make_request_span, propagate_request_id_layer, set_request_id_layer};
use crate::observability::{metrics, LogSink};
use crate::resilience::{recovery_middleware, timeout_middleware, RequestTimeout};
use crate::security::security_headers;
use crate::shortener::ShortenerService;

/// HTTP server for the shortener.
pub struct HttpServer {
    router: Router,
}

impl HttpServer {
    /// Create a new HTTP server with the given configuration.
    pub fn new(config: &ServiceConfig, shortener: ShortenerService, sink: LogSink) -> Self {
        Self {
            router: build_router(config, shortener, sink),
        }
    }

    /// The fully layered router.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Run the server until `shutdown` resolves, then stop accepting and
    /// wait for in-flight requests.
    pub async fn run(
        self,
        listener: TcpListener,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Build the Axum router with all middleware layers.
pub fn build_router(config: &ServiceConfig, shortener: ShortenerService, sink: LogSink) -> Router {
    let state = AppState {
        shortener,
        public_base_url: config.listener.public_base_url.clone(),
    };
    let timeout = RequestTimeout::from_config(&config.timeouts);

    Router::new()
        .route("/shorten", post(handlers::create_short_url))
        .route("/_health", get(handlers::health))
        .route("/{code}", get(handlers::redirect))
        .fallback(handlers::not_found)
        .method_not_allowed_fallback(handlers::method_not_allowed)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(set_request_id_layer())
                .layer(TraceLayer::new_for_http().make_span_with(make_request_span::<axum::body::Body>))
                .layer(middleware::from_fn(metrics::track_requests))
                .layer(CompressionLayer::new().quality(CompressionLevel::Best))
                .layer(middleware::from_fn(security_headers))
                .layer(build_cors_layer(&config.cors.allow_origins))
                .layer(propagate_request_id_layer())
                .layer(middleware::from_fn_with_state(sink, recovery_middleware))
                .layer(middleware::from_fn_with_state(timeout, timeout_middleware)),
        )
}

/// A `"*"` entry allows any origin; otherwise only the listed ones.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::any())
        .allow_headers(Any)
}

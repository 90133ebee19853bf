//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request ID, request span)
//!     → handlers.rs (shorten, redirect, health, fallbacks)
//!     → response.rs (encode Reply or error, commit the exchange)
//!     → envelope.rs (uniform error body)
//!     → Send to client
//! ```

pub mod envelope;
pub mod handlers;
pub mod request;
pub mod response;
pub mod server;

pub use envelope::{normalize, ErrorDetail, ErrorEnvelope, FieldError};
pub use handlers::AppState;
pub use request::{RequestIdExt, X_REQUEST_ID};
pub use response::{encode, respond, Exchange, Payload, Reply};
pub use server::{build_router, HttpServer};

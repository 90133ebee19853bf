//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Outgoing response:
//!     → headers.rs (add hardening headers if absent)
//!     → cors (tower-http CorsLayer, built in http::server)
//! ```

pub mod headers;

pub use headers::security_headers;

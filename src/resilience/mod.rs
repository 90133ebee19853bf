//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Inbound request:
//!     → recovery.rs (catch panics, 500 envelope)
//!     → timeouts.rs (spawn handler, race deadline, 408 envelope)
//!     → route handler → response encoder
//! ```
//!
//! # Design Decisions
//! - Recovery sits above the timeout so panics in the timed section are caught
//! - Timeouts are non-negotiable; every request has a deadline
//! - Only the recovery guard recovers in-process; everything else propagates
//!   as return values

pub mod recovery;
pub mod timeouts;

pub use recovery::{install_panic_hook, recovery_middleware};
pub use timeouts::{timeout_middleware, RequestTimeout};

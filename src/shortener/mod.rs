//! URL shortening domain.
//!
//! # Data Flow
//! ```text
//! POST /shorten {url}
//!     → service.rs (validate url)
//!     → code.rs (seed → base62 code)
//!     → storage (insert; duplicate → new seed, bounded)
//!
//! GET /{code}
//!     → service.rs (code shape check)
//!     → storage (find)
//!     → 302 Location: <url> | 404
//! ```

pub mod code;
pub mod service;
pub mod types;

pub use service::{SeedSource, ShortenerService};
pub use types::{ShortenRequest, ShortenResponse, ShortenerError, ShortenerResult};

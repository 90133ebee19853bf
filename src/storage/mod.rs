//! Short URL persistence.
//!
//! # Data Flow
//! ```text
//! ShortenerService
//!     → LinkStore (trait)
//!         → postgres.rs (sqlx pool, every call through observer.rs)
//!         → memory.rs (DashMap, used by tests and local runs)
//! ```
//!
//! # Design Decisions
//! - The store is shared via Arc, never recreated per request
//! - Code uniqueness is enforced by the store (primary key / map entry)
//! - Duplicate codes surface as a distinct error so callers can retry

pub mod memory;
pub mod observer;
pub mod postgres;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

pub use memory::MemoryLinkStore;
pub use observer::{QueryLogRecord, QueryObserver, QueryOutcome};
pub use postgres::PgLinkStore;

/// A stored short-code mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Link {
    pub code: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The short code is already taken.
    #[error("short code '{0}' already exists")]
    Duplicate(String),

    /// Query or connection failure.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store cannot serve requests.
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Persistence for short-code mappings.
#[async_trait]
pub trait LinkStore: Send + Sync {
    /// Insert a new mapping. Fails with [`StoreError::Duplicate`] if `code` exists.
    async fn insert(&self, code: &str, url: &str) -> Result<Link, StoreError>;

    /// Look up a mapping by code.
    async fn find(&self, code: &str) -> Result<Option<Link>, StoreError>;

    /// Check that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;
}

//! Startup orchestration.
//!
//! # Responsibilities
//! - Connect to the database and verify it answers
//! - Create the table if missing
//! - Assemble the shortener service
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::sync::Arc;

use thiserror::Error;

use crate::config::ServiceConfig;
use crate::shortener::ShortenerService;
use crate::storage::{LinkStore, PgLinkStore, QueryObserver, StoreError};

/// Errors that abort startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("failed to configure database pool: {0}")]
    Pool(#[source] StoreError),

    #[error("database unreachable: {0}")]
    Connect(#[source] StoreError),

    #[error("failed to create schema: {0}")]
    Schema(#[source] StoreError),
}

/// Open the Postgres store described by `config`, verify connectivity and
/// bootstrap the schema.
pub async fn connect_store(config: &ServiceConfig) -> Result<PgLinkStore, StartupError> {
    let observer = QueryObserver::new(
        true,
        config
            .observability
            .effective_query_log_level(config.environment),
    );
    let store = PgLinkStore::connect_lazy(&config.database, config.environment, observer)
        .map_err(StartupError::Pool)?;

    store.ping().await.map_err(StartupError::Connect)?;
    tracing::info!(
        host = %config.database.host,
        port = config.database.port,
        database = %config.database.name,
        "Database connection established"
    );

    store.ensure_schema().await.map_err(StartupError::Schema)?;
    Ok(store)
}

/// Build the service over an already-connected store.
pub fn build_service(config: &ServiceConfig, store: PgLinkStore) -> ShortenerService {
    ShortenerService::new(Arc::new(store), config.shortener.clone())
}

//! PostgreSQL-backed link store.

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::config::{DatabaseConfig, Environment};
use crate::storage::observer::QueryObserver;
use crate::storage::{Link, LinkStore, StoreError};

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS short_urls (\
    code TEXT PRIMARY KEY, \
    url TEXT NOT NULL, \
    created_at TIMESTAMPTZ NOT NULL DEFAULT now())";

const INSERT_LINK: &str =
    "INSERT INTO short_urls (code, url) VALUES ($1, $2) RETURNING code, url, created_at";

const SELECT_LINK: &str = "SELECT code, url, created_at FROM short_urls WHERE code = $1";

const PING: &str = "SELECT 1";

/// Link store over a shared sqlx connection pool.
#[derive(Debug, Clone)]
pub struct PgLinkStore {
    pool: PgPool,
    observer: QueryObserver,
}

impl PgLinkStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool, observer: QueryObserver) -> Self {
        Self { pool, observer }
    }

    /// Build a lazily-connecting pool from configuration.
    pub fn connect_lazy(
        config: &DatabaseConfig,
        environment: Environment,
        observer: QueryObserver,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_lazy(&config.url(environment))?;
        Ok(Self::new(pool, observer))
    }

    /// Create the table if it does not exist.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.observer
            .observe("CREATE", CREATE_TABLE, Vec::new(), async {
                sqlx::query(CREATE_TABLE).execute(&self.pool).await
            })
            .await?;
        Ok(())
    }

    /// Close every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl LinkStore for PgLinkStore {
    async fn insert(&self, code: &str, url: &str) -> Result<Link, StoreError> {
        self.observer
            .observe(
                "INSERT",
                INSERT_LINK,
                vec![code.to_string(), url.to_string()],
                async {
                    sqlx::query_as::<_, Link>(INSERT_LINK)
                        .bind(code)
                        .bind(url)
                        .fetch_one(&self.pool)
                        .await
                },
            )
            .await
            .map_err(|e| {
                let duplicate = e
                    .as_database_error()
                    .map(|db| db.is_unique_violation())
                    .unwrap_or(false);
                if duplicate {
                    StoreError::Duplicate(code.to_string())
                } else {
                    StoreError::Database(e)
                }
            })
    }

    async fn find(&self, code: &str) -> Result<Option<Link>, StoreError> {
        let link = self
            .observer
            .observe("SELECT", SELECT_LINK, vec![code.to_string()], async {
                sqlx::query_as::<_, Link>(SELECT_LINK)
                    .bind(code)
                    .fetch_optional(&self.pool)
                    .await
            })
            .await?;
        Ok(link)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.observer
            .observe("SELECT", PING, Vec::new(), async {
                sqlx::query(PING).execute(&self.pool).await
            })
            .await?;
        Ok(())
    }
}

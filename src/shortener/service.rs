//! Shortening and resolution.

use std::sync::Arc;

use url::Url;

use crate::config::ShortenerConfig;
use crate::shortener::code::{generate_code, is_valid_code, random_seed};
use crate::shortener::types::{ShortenerError, ShortenerResult};
use crate::storage::{Link, LinkStore, StoreError};

/// Produces seeds for code generation.
pub type SeedSource = Arc<dyn Fn() -> u128 + Send + Sync>;

/// Validates URLs, allocates codes and talks to the store.
#[derive(Clone)]
pub struct ShortenerService {
    store: Arc<dyn LinkStore>,
    config: ShortenerConfig,
    seeds: SeedSource,
}

impl ShortenerService {
    pub fn new(store: Arc<dyn LinkStore>, config: ShortenerConfig) -> Self {
        Self {
            store,
            config,
            seeds: Arc::new(random_seed),
        }
    }

    /// Replace the random seed source (deterministic codes in tests).
    pub fn with_seed_source(mut self, seeds: SeedSource) -> Self {
        self.seeds = seeds;
        self
    }

    /// Check that `raw` is an absolute http(s) URL within the length limit.
    /// Returns the trimmed input, which is what gets stored.
    pub fn validate_url<'a>(&self, raw: &'a str) -> ShortenerResult<&'a str> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(ShortenerError::InvalidUrl("url is required".to_string()));
        }
        if trimmed.len() > self.config.max_url_length {
            return Err(ShortenerError::InvalidUrl(format!(
                "url exceeds {} characters",
                self.config.max_url_length
            )));
        }

        let parsed = Url::parse(trimmed).map_err(|e| ShortenerError::InvalidUrl(e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ShortenerError::InvalidUrl(
                "scheme must be http or https".to_string(),
            ));
        }
        if parsed.host_str().map_or(true, str::is_empty) {
            return Err(ShortenerError::InvalidUrl("url must have a host".to_string()));
        }
        Ok(trimmed)
    }

    /// Store `raw_url` under a fresh code. Collisions are retried with a new
    /// seed up to `max_attempts` times.
    pub async fn shorten(&self, raw_url: &str) -> ShortenerResult<Link> {
        let url = self.validate_url(raw_url)?;

        for attempt in 1..=self.config.max_attempts {
            let code = generate_code((self.seeds)(), self.config.code_length);
            match self.store.insert(&code, url).await {
                Ok(link) => {
                    tracing::info!(code = %link.code, attempt, "Short url created");
                    return Ok(link);
                }
                Err(StoreError::Duplicate(_)) => {
                    tracing::warn!(code = %code, attempt, "Short code collision");
                }
                Err(e) => return Err(ShortenerError::Storage(e)),
            }
        }

        Err(ShortenerError::Exhausted(self.config.max_attempts))
    }

    /// Look up the target for `code`.
    pub async fn resolve(&self, code: &str) -> ShortenerResult<Link> {
        if !is_valid_code(code) {
            return Err(ShortenerError::NotFound(code.to_string()));
        }
        self.store
            .find(code)
            .await
            .map_err(ShortenerError::Storage)?
            .ok_or_else(|| ShortenerError::NotFound(code.to_string()))
    }

    /// Whether the store answers.
    pub async fn health(&self) -> ShortenerResult<()> {
        self.store.ping().await.map_err(ShortenerError::Unavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryLinkStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn service(store: MemoryLinkStore) -> ShortenerService {
        ShortenerService::new(Arc::new(store), ShortenerConfig::default())
    }

    /// Seed source replaying `seeds`, repeating the last one.
    fn scripted(seeds: Vec<u128>) -> SeedSource {
        let next = AtomicUsize::new(0);
        Arc::new(move || {
            let i = next.fetch_add(1, Ordering::SeqCst).min(seeds.len() - 1);
            seeds[i]
        })
    }

    #[tokio::test]
    async fn test_shorten_and_resolve() {
        let svc = service(MemoryLinkStore::new());
        let link = svc.shorten("https://example.com").await.unwrap();
        assert_eq!(link.code.len(), 6);
        assert_eq!(link.url, "https://example.com");

        let resolved = svc.resolve(&link.code).await.unwrap();
        assert_eq!(resolved.url, "https://example.com");
    }

    #[tokio::test]
    async fn test_url_validation() {
        let svc = service(MemoryLinkStore::new());
        for bad in ["", "   ", "example.com", "ftp://example.com/file", "javascript:alert(1)"] {
            let err = svc.shorten(bad).await.unwrap_err();
            assert!(matches!(err, ShortenerError::InvalidUrl(_)), "accepted {bad:?}");
        }

        let long = format!("https://example.com/{}", "a".repeat(2048));
        assert!(matches!(
            svc.shorten(&long).await,
            Err(ShortenerError::InvalidUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_collision_is_retried() {
        let store = MemoryLinkStore::new();
        let svc = service(store.clone()).with_seed_source(scripted(vec![1, 1, 2]));

        let first = svc.shorten("https://a.example").await.unwrap();
        let second = svc.shorten("https://b.example").await.unwrap();

        assert_eq!(first.code, generate_code(1, 6));
        assert_eq!(second.code, generate_code(2, 6));
        assert_eq!(store.len(), 2);
    }

    #[tokio::test]
    async fn test_collisions_exhaust_attempts() {
        let svc = service(MemoryLinkStore::new()).with_seed_source(scripted(vec![7]));
        svc.shorten("https://a.example").await.unwrap();

        let err = svc.shorten("https://b.example").await.unwrap_err();
        assert!(matches!(err, ShortenerError::Exhausted(5)));
    }

    #[tokio::test]
    async fn test_resolve_unknown_code() {
        let svc = service(MemoryLinkStore::new());
        assert!(matches!(
            svc.resolve("doesnotexist").await,
            Err(ShortenerError::NotFound(_))
        ));
        assert!(matches!(
            svc.resolve("bad-code!").await,
            Err(ShortenerError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_storage_failure() {
        let store = MemoryLinkStore::new();
        store.set_available(false);
        let svc = service(store);

        assert!(matches!(
            svc.shorten("https://example.com").await,
            Err(ShortenerError::Storage(_))
        ));
        assert!(matches!(svc.health().await, Err(ShortenerError::Unavailable(_))));
    }
}

//! In-memory link store.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::storage::{Link, LinkStore, StoreError};

/// A thread-safe map of code -> link.
///
/// Clones share the same map. `set_available(false)` makes every call fail,
/// which lets tests exercise the storage-failure path.
#[derive(Debug, Clone)]
pub struct MemoryLinkStore {
    inner: Arc<DashMap<String, Link>>,
    available: Arc<AtomicBool>,
}

impl MemoryLinkStore {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            available: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory store offline".to_string()))
        }
    }
}

impl Default for MemoryLinkStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LinkStore for MemoryLinkStore {
    async fn insert(&self, code: &str, url: &str) -> Result<Link, StoreError> {
        self.check_available()?;
        match self.inner.entry(code.to_string()) {
            Entry::Occupied(_) => Err(StoreError::Duplicate(code.to_string())),
            Entry::Vacant(slot) => {
                let link = Link {
                    code: code.to_string(),
                    url: url.to_string(),
                    created_at: Utc::now(),
                };
                slot.insert(link.clone());
                Ok(link)
            }
        }
    }

    async fn find(&self, code: &str) -> Result<Option<Link>, StoreError> {
        self.check_available()?;
        Ok(self.inner.get(code).map(|r| r.value().clone()))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check_available()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_find() {
        let store = MemoryLinkStore::new();
        let link = store.insert("abc123", "https://example.com").await.unwrap();
        assert_eq!(link.code, "abc123");

        let found = store.find("abc123").await.unwrap().unwrap();
        assert_eq!(found.url, "https://example.com");
        assert!(store.find("zzz999").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_code_rejected() {
        let store = MemoryLinkStore::new();
        store.insert("abc123", "https://a.example").await.unwrap();
        let err = store.insert("abc123", "https://b.example").await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(code) if code == "abc123"));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_unavailable() {
        let store = MemoryLinkStore::new();
        store.set_available(false);
        assert!(matches!(store.ping().await, Err(StoreError::Unavailable(_))));
        assert!(store.find("abc123").await.is_err());
        store.set_available(true);
        assert!(store.ping().await.is_ok());
    }
}

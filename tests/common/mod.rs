//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpListener;

use shortener::config::ServiceConfig;
use shortener::http::HttpServer;
use shortener::lifecycle::Shutdown;
use shortener::observability::LogSink;
use shortener::storage::{Link, LinkStore, MemoryLinkStore, StoreError};
use shortener::ShortenerService;

/// A server bound to an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

/// Start a server over `store` with `config`.
pub async fn start_server(config: ServiceConfig, store: Arc<dyn LinkStore>) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let service = ShortenerService::new(store, config.shortener.clone());
    let server = HttpServer::new(&config, service, LogSink::from_writer(std::io::sink()));
    let shutdown = Shutdown::new();
    tokio::spawn(server.run(listener, shutdown.signalled()));

    TestServer { addr, shutdown }
}

/// Start a server with default config over an in-memory store.
pub async fn start_memory_server() -> (TestServer, MemoryLinkStore) {
    let store = MemoryLinkStore::new();
    let server = start_server(ServiceConfig::default(), Arc::new(store.clone())).await;
    (server, store)
}

/// Client that does not follow redirects.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .unwrap()
}

/// Store whose calls take `delay` before delegating to memory.
#[allow(dead_code)]
pub struct SlowStore {
    pub inner: MemoryLinkStore,
    pub delay: Duration,
}

#[async_trait]
impl LinkStore for SlowStore {
    async fn insert(&self, code: &str, url: &str) -> Result<Link, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.insert(code, url).await
    }

    async fn find(&self, code: &str) -> Result<Option<Link>, StoreError> {
        tokio::time::sleep(self.delay).await;
        self.inner.find(code).await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.inner.ping().await
    }
}

/// Store that panics on lookups.
#[allow(dead_code)]
pub struct PanickingStore;

#[async_trait]
impl LinkStore for PanickingStore {
    async fn insert(&self, _code: &str, _url: &str) -> Result<Link, StoreError> {
        panic!("insert exploded");
    }

    async fn find(&self, _code: &str) -> Result<Option<Link>, StoreError> {
        panic!("index out of range");
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Request timeout applied when none is configured.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Root configuration for the URL shortener.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, public URL).
    pub listener: ListenerConfig,

    /// Deployment environment.
    pub environment: Environment,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// PostgreSQL connection settings.
    pub database: DatabaseConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    /// Cross-origin settings.
    pub cors: CorsConfig,

    /// Short code generation settings.
    pub shortener: ShortenerConfig,
}

/// Deployment environment, mirrors the `ENV` variable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Test,
    Production,
}

impl Environment {
    /// Parse the `ENV` value. Unknown values fall back to development.
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Environment::Production,
            "test" => Environment::Test,
            _ => Environment::Development,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Test => "test",
            Environment::Production => "production",
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Interface to bind.
    pub host: String,

    /// TCP port.
    pub port: u16,

    /// Base URL prepended to short codes (e.g., "https://sho.rt").
    /// Derived from the request Host header when unset.
    pub public_base_url: Option<String>,
}

impl ListenerConfig {
    /// Bind address in `host:port` form.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            public_base_url: None,
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Request timeout in seconds. Zero means unset.
    pub request_secs: u64,

    /// Time allowed for in-flight requests after a shutdown signal.
    pub shutdown_grace_secs: u64,

    /// Abort the handler task once a timeout response has been sent.
    pub cancel_on_timeout: bool,
}

impl TimeoutConfig {
    /// Effective request timeout, substituting the default for an unset value.
    pub fn request_timeout(&self) -> Duration {
        match self.request_secs {
            0 => Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            secs => Duration::from_secs(secs),
        }
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            request_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            shutdown_grace_secs: 5,
            cancel_on_timeout: true,
        }
    }
}

/// PostgreSQL connection settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub name: String,

    /// Pool size.
    pub max_connections: u32,

    /// Seconds to wait for a pooled connection.
    pub acquire_timeout_secs: u64,
}

impl DatabaseConfig {
    /// Build the connection URL. TLS is disabled outside production and test.
    pub fn url(&self, environment: Environment) -> String {
        let mut url = format!(
            "postgres://{}:{}@{}:{}/{}",
            self.user, self.password, self.host, self.port, self.name
        );
        if environment == Environment::Development {
            url.push_str("?sslmode=disable");
        }
        url
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            user: "postgres".to_string(),
            password: String::new(),
            name: "urlshortener".to_string(),
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of human-readable ones.
    pub json: bool,

    /// Level gating successful query logs. Derived from the environment when unset.
    pub query_log_level: Option<String>,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl ObservabilityConfig {
    /// Query log level: explicit value, else `error` in production and `info` elsewhere.
    pub fn effective_query_log_level(&self, environment: Environment) -> &str {
        match (&self.query_log_level, environment) {
            (Some(level), _) => level.as_str(),
            (None, Environment::Production) => "error",
            (None, _) => "info",
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
            query_log_level: None,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Cross-origin resource sharing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CorsConfig {
    /// Allowed origins; `"*"` allows any.
    pub allow_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allow_origins: vec!["*".to_string()],
        }
    }
}

/// Short code generation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ShortenerConfig {
    /// Characters per generated code.
    pub code_length: usize,

    /// Insert attempts before giving up on collisions.
    pub max_attempts: u32,

    /// Longest accepted target URL.
    pub max_url_length: usize,
}

impl Default for ShortenerConfig {
    fn default() -> Self {
        Self {
            code_length: 6,
            max_attempts: 5,
            max_url_length: 2048,
        }
    }
}

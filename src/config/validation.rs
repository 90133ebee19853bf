//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (code length, attempts, ports)
//! - Check that URLs and log levels parse
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::fmt;

use crate::config::schema::ServiceConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem with the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a configuration, collecting every problem found.
pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.port == 0 {
        errors.push(ValidationError::new("listener.port", "must be non-zero"));
    }
    if let Some(base) = &config.listener.public_base_url {
        match url::Url::parse(base) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            Ok(_) => errors.push(ValidationError::new(
                "listener.public_base_url",
                "scheme must be http or https",
            )),
            Err(e) => errors.push(ValidationError::new("listener.public_base_url", e.to_string())),
        }
    }

    let db = &config.database;
    if db.host.trim().is_empty() {
        errors.push(ValidationError::new("database.host", "must not be empty"));
    }
    if db.user.trim().is_empty() {
        errors.push(ValidationError::new("database.user", "must not be empty"));
    }
    if db.name.trim().is_empty() {
        errors.push(ValidationError::new("database.name", "must not be empty"));
    }
    if db.max_connections == 0 {
        errors.push(ValidationError::new("database.max_connections", "must be at least 1"));
    }

    let obs = &config.observability;
    if !LOG_LEVELS.contains(&obs.log_level.to_ascii_lowercase().as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", obs.log_level),
        ));
    }
    if let Some(level) = &obs.query_log_level {
        if !LOG_LEVELS.contains(&level.to_ascii_lowercase().as_str()) {
            errors.push(ValidationError::new(
                "observability.query_log_level",
                format!("unknown level '{}'", level),
            ));
        }
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<std::net::SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "must be a socket address",
        ));
    }

    let shortener = &config.shortener;
    if !(4..=16).contains(&shortener.code_length) {
        errors.push(ValidationError::new(
            "shortener.code_length",
            "must be between 4 and 16",
        ));
    }
    if shortener.max_attempts == 0 {
        errors.push(ValidationError::new("shortener.max_attempts", "must be at least 1"));
    }
    if shortener.max_url_length == 0 {
        errors.push(ValidationError::new("shortener.max_url_length", "must be non-zero"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn test_collects_all_errors() {
        let mut config = ServiceConfig::default();
        config.database.host = String::new();
        config.shortener.code_length = 2;
        config.observability.log_level = "loud".into();

        let errors = validate_config(&config).unwrap_err();
        let fields: Vec<_> = errors.iter().map(|e| e.field).collect();
        assert_eq!(
            fields,
            vec!["database.host", "observability.log_level", "shortener.code_length"]
        );
    }

    #[test]
    fn test_rejects_non_http_base_url() {
        let mut config = ServiceConfig::default();
        config.listener.public_base_url = Some("ftp://files.example".into());
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors[0].field, "listener.public_base_url");
    }
}

//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

use crate::config::schema::{Environment, ServiceConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to load .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),

    #[error("invalid value for `{key}`: {message}")]
    Env { key: &'static str, message: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration: defaults, then the optional TOML file, then `.env`
/// and process environment overrides. The result is validated.
pub fn load_config(path: Option<&Path>) -> Result<ServiceConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            toml::from_str(&content)?
        }
        None => ServiceConfig::default(),
    };

    load_dotenv()?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Hydrate the process environment from `.env`. A missing file is not an error.
fn load_dotenv() -> Result<(), ConfigError> {
    match dotenvy::dotenv() {
        Ok(_) => Ok(()),
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

/// Apply environment-style overrides using `lookup` to read variables.
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("PORT") {
        config.listener.port = parse_var("PORT", &v)?;
    }
    if let Some(v) = lookup("HOST") {
        config.listener.host = v;
    }
    if let Some(v) = lookup("BASE_URL") {
        config.listener.public_base_url = Some(v.trim_end_matches('/').to_string());
    }
    if let Some(v) = lookup("ENV") {
        config.environment = Environment::parse(&v);
        if config.environment == Environment::Production {
            config.observability.json = true;
        }
    }
    if let Some(v) = lookup("REQUEST_TIMEOUT_SECONDS") {
        config.timeouts.request_secs = parse_var("REQUEST_TIMEOUT_SECONDS", &v)?;
    }
    if let Some(v) = lookup("SHUTDOWN_GRACE_SECONDS") {
        config.timeouts.shutdown_grace_secs = parse_var("SHUTDOWN_GRACE_SECONDS", &v)?;
    }
    if let Some(v) = lookup("LOG_LEVEL") {
        config.observability.log_level = v;
    }
    if let Some(v) = lookup("LOG_JSON") {
        config.observability.json = parse_var("LOG_JSON", &v)?;
    }
    if let Some(v) = lookup("METRICS_ADDRESS") {
        config.observability.metrics_enabled = true;
        config.observability.metrics_address = v;
    }
    if let Some(v) = lookup("PG_HOST") {
        config.database.host = v;
    }
    if let Some(v) = lookup("PG_PORT") {
        config.database.port = parse_var("PG_PORT", &v)?;
    }
    if let Some(v) = lookup("PG_USER") {
        config.database.user = v;
    }
    if let Some(v) = lookup("PG_PASSWORD") {
        config.database.password = v;
    }
    if let Some(v) = lookup("PG_DB") {
        config.database.name = v;
    }
    Ok(())
}

fn parse_var<T>(key: &'static str, value: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::Env {
        key,
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    fn lookup_from(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let mut config = ServiceConfig::default();
        let lookup = lookup_from(&[
            ("PORT", "3000"),
            ("ENV", "production"),
            ("REQUEST_TIMEOUT_SECONDS", "4"),
            ("PG_HOST", "db.internal"),
            ("PG_PORT", "6543"),
            ("PG_USER", "shortener"),
            ("PG_PASSWORD", "secret"),
            ("PG_DB", "links"),
            ("BASE_URL", "https://sho.rt/"),
        ]);

        apply_env_overrides(&mut config, lookup).unwrap();

        assert_eq!(config.listener.port, 3000);
        assert_eq!(config.environment, Environment::Production);
        assert_eq!(config.timeouts.request_timeout(), Duration::from_secs(4));
        assert_eq!(config.database.host, "db.internal");
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.user, "shortener");
        assert_eq!(config.database.password, "secret");
        assert_eq!(config.database.name, "links");
        assert_eq!(config.listener.public_base_url.as_deref(), Some("https://sho.rt"));
        assert!(config.observability.json);
    }

    #[test]
    fn test_log_json_overrides_production_default() {
        let mut config = ServiceConfig::default();
        let lookup = lookup_from(&[("ENV", "production"), ("LOG_JSON", "false")]);
        apply_env_overrides(&mut config, lookup).unwrap();
        assert!(!config.observability.json);
    }

    #[test]
    fn test_unset_timeout_defaults_to_ten_seconds() {
        let mut config = ServiceConfig::default();
        apply_env_overrides(&mut config, lookup_from(&[("REQUEST_TIMEOUT_SECONDS", "0")])).unwrap();
        assert_eq!(config.timeouts.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_number_is_reported() {
        let mut config = ServiceConfig::default();
        let err = apply_env_overrides(&mut config, lookup_from(&[("PORT", "eighty")])).unwrap_err();
        assert!(matches!(err, ConfigError::Env { key: "PORT", .. }));
        assert!(err.to_string().contains("PORT"));
    }

    #[test]
    fn test_validation_error_display() {
        let err = ConfigError::Validation(vec![
            ValidationError {
                field: "database.host",
                message: "must not be empty".into(),
            },
            ValidationError {
                field: "shortener.max_attempts",
                message: "must be at least 1".into(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "Validation failed: database.host: must not be empty, shortener.max_attempts: must be at least 1"
        );
    }
}

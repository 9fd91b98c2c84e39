//! Process configuration from environment variables.
//!
//! `main` loads `.env` with `dotenv` first, so values there act as defaults
//! for anything not already exported.

use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("invalid {key}={value:?}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub service_name: String,
    pub http: HttpConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    /// Per repository call.
    pub timeout: Duration,
    /// Apply `migrations/` at start-up.
    pub migrate: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let default_connections = u32::try_from(num_cpus::get() * 2).unwrap_or(u32::MAX);
        let max_connections = parse_or(&get, "DB_MAX_CONNECTIONS", default_connections)?;
        if max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_MAX_CONNECTIONS",
                value: "0".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }

        Ok(Self {
            service_name: get("SERVICE_NAME").unwrap_or_else(|| "contactService".to_string()),
            http: HttpConfig {
                host: get("HTTP_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
                port: parse_or(&get, "HTTP_PORT", 8080)?,
            },
            database: DatabaseConfig {
                url: get("DATABASE_URL").ok_or(ConfigError::Missing("DATABASE_URL"))?,
                max_connections,
                timeout: Duration::from_millis(parse_or(&get, "DB_TIMEOUT_MS", 5_000u64)?),
                migrate: parse_bool_or(&get, "DB_MIGRATE", true)?,
            },
        })
    }
}

fn parse_or<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            key,
            reason: err.to_string(),
            value,
        }),
    }
}

fn parse_bool_or(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(value) = get(key) else {
        return Ok(default);
    };
    match value.trim() {
        "1" | "true" | "TRUE" | "yes" | "YES" => Ok(true),
        "0" | "false" | "FALSE" | "no" | "NO" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value,
            reason: "expected a boolean".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = config(&[("DATABASE_URL", "postgres://localhost/contacts")]).unwrap();
        assert_eq!(config.service_name, "contactService");
        assert_eq!(config.http.host, "0.0.0.0");
        assert_eq!(config.http.port, 8080);
        assert_eq!(config.database.timeout, Duration::from_secs(5));
        assert!(config.database.migrate);
        assert!(config.database.max_connections >= 2);
    }

    #[test]
    fn database_url_is_required() {
        assert!(matches!(
            config(&[("HTTP_PORT", "9000")]),
            Err(ConfigError::Missing("DATABASE_URL"))
        ));
    }

    #[test]
    fn malformed_numbers_are_rejected() {
        let err = config(&[("DATABASE_URL", "postgres://x"), ("HTTP_PORT", "eighty")]).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "HTTP_PORT", .. }));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = config(&[
            ("DATABASE_URL", "postgres://x"),
            ("HTTP_PORT", "9000"),
            ("DB_TIMEOUT_MS", "250"),
            ("DB_MAX_CONNECTIONS", "3"),
            ("DB_MIGRATE", "false"),
        ])
        .unwrap();
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.database.timeout, Duration::from_millis(250));
        assert_eq!(config.database.max_connections, 3);
        assert!(!config.database.migrate);
    }

    #[test]
    fn zero_connections_is_invalid() {
        let err = config(&[("DATABASE_URL", "postgres://x"), ("DB_MAX_CONNECTIONS", "0")])
            .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "DB_MAX_CONNECTIONS", .. }));
    }
}

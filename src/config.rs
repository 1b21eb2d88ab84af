//! Configuration management for the delta sync server

use serde::Deserialize;
use std::env;
use thiserror::Error;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// SQLite URL, or `memory` for the in-process store
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Shared key required on every API call; open access when unset
    pub api_key: Option<String>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
            },
            database: DatabaseConfig {
                url: "sqlite:./sync.db".to_string(),
                max_connections: 5,
            },
            auth: AuthConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from the process environment
    ///
    /// Any value that is set but unparsable is an error; unset values use the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        Ok(Config {
            server: ServerConfig {
                host: lookup("SERVER_HOST").unwrap_or(defaults.server.host),
                port: parse_var(&lookup, "SERVER_PORT", defaults.server.port)?,
            },
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").unwrap_or(defaults.database.url),
                max_connections: parse_var(
                    &lookup,
                    "DATABASE_MAX_CONNECTIONS",
                    defaults.database.max_connections,
                )?,
            },
            auth: AuthConfig {
                api_key: lookup("SYNC_API_KEY").filter(|key| !key.is_empty()),
            },
        })
    }
}

fn parse_var<T: std::str::FromStr>(
    lookup: impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.database.url, "sqlite:./sync.db");
        assert!(config.auth.api_key.is_none());
    }

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_from_lookup_reads_every_section() {
        let config = Config::from_lookup(vars(&[
            ("SERVER_PORT", "8080"),
            ("DATABASE_URL", "memory"),
            ("SYNC_API_KEY", "secret"),
        ]))
        .unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.database.url, "memory");
        assert_eq!(config.database.max_connections, 5);
        assert_eq!(config.auth.api_key.as_deref(), Some("secret"));
    }

    #[test]
    fn test_empty_api_key_means_open() {
        let config = Config::from_lookup(vars(&[("SYNC_API_KEY", "")])).unwrap();
        assert!(config.auth.api_key.is_none());
    }

    #[test]
    fn test_bad_value_fails_instead_of_dropping_api_key() {
        let err = Config::from_lookup(vars(&[
            ("SERVER_PORT", "eighty"),
            ("SYNC_API_KEY", "secret"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("SERVER_PORT"));

        let err = Config::from_lookup(vars(&[
            ("DATABASE_MAX_CONNECTIONS", "-1"),
            ("SYNC_API_KEY", "secret"),
        ]))
        .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                key: "DATABASE_MAX_CONNECTIONS",
                ..
            }
        ));
    }
}

//! Environment-driven process configuration.
//!
//! Invalid values abort startup; a producer that cannot parse its
//! environment must not come up half-configured.

use thiserror::Error;

use crate::producer::CONCURRENCY_BOUNDS;

#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid value {value:?} for {key}: {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Redis connection parameters (`REDIS_*`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
    pub db: i64,
}

impl RedisConfig {
    /// Connection URL for the `redis` client.
    #[must_use]
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{password}@{}:{}/{}",
                self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Connection parameters for the monitor database (`DB_*`).
///
/// The repository construction itself is owned by the embedding service;
/// the producer only validates and passes these along.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub name: String,
    pub user: String,
    pub password: Option<String>,
}

/// Full process configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub redis: RedisConfig,
    pub database: DatabaseConfig,
    /// Claim-worker pool size (`PRODUCER_CONCURRENCY`), bounded 1..=128.
    pub concurrency: usize,
    /// `TZ`, passed through for operator visibility; scheduling itself is
    /// always UTC.
    pub timezone: Option<String>,
}

impl Config {
    /// Read configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    /// Read configuration from an arbitrary key lookup. Tests inject maps
    /// here instead of mutating the process environment.
    pub fn from_source(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let redis = RedisConfig {
            host: get("REDIS_HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port: parse(&get, "REDIS_PORT", 6379)?,
            password: get("REDIS_PASSWORD").filter(|p| !p.is_empty()),
            db: parse(&get, "REDIS_DB", 0)?,
        };
        let database = DatabaseConfig {
            host: get("DB_HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port: parse(&get, "DB_PORT", 5432)?,
            name: get("DB_NAME").unwrap_or_else(|| "uptick".into()),
            user: get("DB_USER").unwrap_or_else(|| "uptick".into()),
            password: get("DB_PASSWORD").filter(|p| !p.is_empty()),
        };
        let concurrency: usize = parse(&get, "PRODUCER_CONCURRENCY", 10)?;
        if !CONCURRENCY_BOUNDS.contains(&concurrency) {
            return Err(Error::Invalid {
                key: "PRODUCER_CONCURRENCY",
                value: concurrency.to_string(),
                reason: format!("must be within {CONCURRENCY_BOUNDS:?}"),
            });
        }
        Ok(Self {
            redis,
            database,
            concurrency,
            timezone: get("TZ"),
        })
    }
}

fn parse<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|err: T::Err| Error::Invalid {
            key,
            value: raw.clone(),
            reason: err.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source<'a>(vars: &'a [(&'a str, &'a str)]) -> impl Fn(&str) -> Option<String> + 'a {
        let map: HashMap<&str, &str> = vars.iter().copied().collect();
        move |key| map.get(key).map(|v| (*v).to_string())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let cfg = Config::from_source(source(&[])).unwrap();
        assert_eq!(cfg.redis.port, 6379);
        assert_eq!(cfg.redis.db, 0);
        assert_eq!(cfg.concurrency, 10);
        assert_eq!(cfg.database.port, 5432);
        assert_eq!(cfg.redis.url(), "redis://127.0.0.1:6379/0");
    }

    #[test]
    fn explicit_values_override_defaults() {
        let cfg = Config::from_source(source(&[
            ("REDIS_HOST", "cache.internal"),
            ("REDIS_PORT", "6380"),
            ("REDIS_PASSWORD", "hunter2"),
            ("REDIS_DB", "3"),
            ("PRODUCER_CONCURRENCY", "32"),
        ]))
        .unwrap();
        assert_eq!(cfg.concurrency, 32);
        assert_eq!(cfg.redis.url(), "redis://:hunter2@cache.internal:6380/3");
    }

    #[test]
    fn malformed_port_aborts() {
        let err = Config::from_source(source(&[("REDIS_PORT", "not-a-port")])).unwrap_err();
        assert!(err.to_string().contains("REDIS_PORT"));
    }

    #[test]
    fn concurrency_out_of_bounds_aborts() {
        assert!(Config::from_source(source(&[("PRODUCER_CONCURRENCY", "0")])).is_err());
        assert!(Config::from_source(source(&[("PRODUCER_CONCURRENCY", "129")])).is_err());
        assert!(Config::from_source(source(&[("PRODUCER_CONCURRENCY", "128")])).is_ok());
    }

    #[test]
    fn empty_password_means_no_auth() {
        let cfg = Config::from_source(source(&[("REDIS_PASSWORD", "")])).unwrap();
        assert!(cfg.redis.password.is_none());
    }
}

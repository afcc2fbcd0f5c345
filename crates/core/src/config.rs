//! Process configuration loaded from environment variables.
//!
//! Binaries call `dotenvy::dotenv().ok()` first, so values may also come
//! from a `.env` file. Every loader is written against a lookup closure so
//! tests can feed a map instead of mutating the process environment.

use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigError;

/// How the event bus runs the dispatch algorithm for a published event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchMode {
    /// Dispatch inline: `publish` returns once every subscriber acknowledged.
    Sync,
    /// Dispatch on a background task: `publish` returns immediately.
    Async,
}

/// Connection settings for PostgreSQL.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

/// Event bus and durable outbox settings.
#[derive(Debug, Clone)]
pub struct PubSubConfig {
    /// Write an outbox row for every persisted event.
    pub persist_events: bool,
    /// Days to keep outbox rows. `0` disables the cleanup job.
    pub retention_days: u32,
    pub dispatch_mode: DispatchMode,
}

impl Default for PubSubConfig {
    fn default() -> Self {
        Self {
            persist_events: true,
            retention_days: 30,
            dispatch_mode: DispatchMode::Sync,
        }
    }
}

/// Cron scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Upper bound on how long `close` waits for in-flight ticks.
    pub shutdown_timeout: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub pubsub: PubSubConfig,
    pub scheduler: SchedulerConfig,
    /// `true` when `LOG_FORMAT=json`.
    pub json_logs: bool,
}

impl AppConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                                | Default |
    /// |----------------------------------------|---------|
    /// | `DATABASE_URL`                         | (required) |
    /// | `DB_MAX_CONNECTIONS`                   | `20`    |
    /// | `PUBSUB_PERSIST_EVENTS_ON_DB`          | `true`  |
    /// | `PUBSUB_PERSIST_EVENTS_RETENTION_DAYS` | `30`    |
    /// | `PUBSUB_SYNC_MODE`                     | `true`  |
    /// | `SCHEDULER_SHUTDOWN_TIMEOUT_SECS`      | `10`    |
    /// | `LOG_FORMAT`                           | `text`  |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = lookup("DATABASE_URL")
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;

        let database = DatabaseConfig {
            url,
            max_connections: parse_or(&lookup, "DB_MAX_CONNECTIONS", 20, "a positive integer")?,
        };

        let defaults = PubSubConfig::default();
        let sync_mode = bool_or(&lookup, "PUBSUB_SYNC_MODE", true)?;
        let pubsub = PubSubConfig {
            persist_events: bool_or(&lookup, "PUBSUB_PERSIST_EVENTS_ON_DB", defaults.persist_events)?,
            retention_days: parse_or(
                &lookup,
                "PUBSUB_PERSIST_EVENTS_RETENTION_DAYS",
                defaults.retention_days,
                "a non-negative integer",
            )?,
            dispatch_mode: if sync_mode {
                DispatchMode::Sync
            } else {
                DispatchMode::Async
            },
        };

        let shutdown_secs: u64 = parse_or(
            &lookup,
            "SCHEDULER_SHUTDOWN_TIMEOUT_SECS",
            SchedulerConfig::default().shutdown_timeout.as_secs(),
            "a number of seconds",
        )?;
        let scheduler = SchedulerConfig {
            shutdown_timeout: Duration::from_secs(shutdown_secs),
        };

        let json_logs = match lookup("LOG_FORMAT").as_deref().map(str::trim) {
            None | Some("") | Some("text") => false,
            Some("json") => true,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    key: "LOG_FORMAT",
                    value: other.to_string(),
                    expected: "'text' or 'json'",
                })
            }
        };

        Ok(Self {
            database,
            pubsub,
            scheduler,
            json_logs,
        })
    }
}

fn parse_or<F, T>(
    lookup: &F,
    key: &'static str,
    default: T,
    expected: &'static str,
) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            value: raw,
            expected,
        }),
    }
}

fn bool_or<F>(lookup: &F, key: &'static str, default: bool) -> Result<bool, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(key).filter(|v| !v.trim().is_empty()) else {
        return Ok(default);
    };
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: raw,
            expected: "a boolean",
        }),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_only_database_url_is_set() {
        let config = load(&[("DATABASE_URL", "postgres://localhost/casari")]).unwrap();

        assert_eq!(config.database.url, "postgres://localhost/casari");
        assert_eq!(config.database.max_connections, 20);
        assert!(config.pubsub.persist_events);
        assert_eq!(config.pubsub.retention_days, 30);
        assert_eq!(config.pubsub.dispatch_mode, DispatchMode::Sync);
        assert_eq!(config.scheduler.shutdown_timeout, Duration::from_secs(10));
        assert!(!config.json_logs);
    }

    #[test]
    fn missing_database_url_is_rejected() {
        assert_matches!(load(&[]), Err(ConfigError::Missing("DATABASE_URL")));
    }

    #[test]
    fn async_mode_and_disabled_persistence_are_parsed() {
        let config = load(&[
            ("DATABASE_URL", "postgres://db"),
            ("PUBSUB_SYNC_MODE", "false"),
            ("PUBSUB_PERSIST_EVENTS_ON_DB", "0"),
            ("PUBSUB_PERSIST_EVENTS_RETENTION_DAYS", "7"),
            ("LOG_FORMAT", "json"),
        ])
        .unwrap();

        assert_eq!(config.pubsub.dispatch_mode, DispatchMode::Async);
        assert!(!config.pubsub.persist_events);
        assert_eq!(config.pubsub.retention_days, 7);
        assert!(config.json_logs);
    }

    #[test]
    fn invalid_boolean_names_the_offending_key() {
        let err = load(&[("DATABASE_URL", "postgres://db"), ("PUBSUB_SYNC_MODE", "maybe")])
            .unwrap_err();

        assert_matches!(err, ConfigError::Invalid { key: "PUBSUB_SYNC_MODE", .. });
    }

    #[test]
    fn negative_retention_is_rejected() {
        let err = load(&[
            ("DATABASE_URL", "postgres://db"),
            ("PUBSUB_PERSIST_EVENTS_RETENTION_DAYS", "-3"),
        ])
        .unwrap_err();

        assert_matches!(
            err,
            ConfigError::Invalid { key: "PUBSUB_PERSIST_EVENTS_RETENTION_DAYS", .. }
        );
    }
}

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::fmt::Display;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use hims_sync_core::{DisjointMergePolicy, SyncSettings};
use thiserror::Error;

const MIN_JWT_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub database_path: PathBuf,
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub auth_clock_skew: Duration,
    pub sync: SyncSettings,
    pub rate_limit_window: Duration,
    pub push_rate_limit_per_window: u32,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("database_path", &self.database_path)
            .field("jwt_secret", &"[REDACTED]")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("auth_clock_skew", &self.auth_clock_skew)
            .field("sync", &self.sync)
            .field("rate_limit_window", &self.rate_limit_window)
            .field(
                "push_rate_limit_per_window",
                &self.push_rate_limit_per_window,
            )
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "SYNC_API_BIND_ADDR", "127.0.0.1:8080");
        let database_path =
            PathBuf::from(value_or_default(&lookup, "SYNC_DATABASE_PATH", "hims-sync.db"));

        let jwt_secret = required_trimmed(&lookup, "SYNC_JWT_SECRET")?;
        if jwt_secret.len() < MIN_JWT_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "SYNC_JWT_SECRET must be at least {MIN_JWT_SECRET_LEN} characters"
            )));
        }
        let jwt_issuer = optional_trimmed(&lookup, "SYNC_JWT_ISSUER");

        let auth_clock_skew_secs: u64 = bounded(&lookup, "AUTH_CLOCK_SKEW_SECS", 60, 0..=300)?;

        let max_batch_size: usize = bounded(&lookup, "SYNC_MAX_BATCH_SIZE", 500, 1..=5_000)?;
        let pull_default_limit: usize =
            bounded(&lookup, "SYNC_PULL_DEFAULT_LIMIT", 100, 1..=1_000)?;
        let pull_max_limit: usize = bounded(&lookup, "SYNC_PULL_MAX_LIMIT", 1_000, 1..=10_000)?;
        if pull_max_limit < pull_default_limit {
            return Err(ConfigError::Invalid(
                "SYNC_PULL_MAX_LIMIT must be >= SYNC_PULL_DEFAULT_LIMIT".to_string(),
            ));
        }
        let apply_max_attempts: u32 = bounded(&lookup, "SYNC_APPLY_MAX_ATTEMPTS", 3, 1..=10)?;
        let disjoint_merge = optional_trimmed(&lookup, "SYNC_DISJOINT_MERGE")
            .map(|value| value.parse::<DisjointMergePolicy>())
            .transpose()
            .map_err(|_| {
                ConfigError::Invalid(
                    "SYNC_DISJOINT_MERGE must be client_payload or three_way".to_string(),
                )
            })?
            .unwrap_or_default();

        let rate_limit_window_secs: u64 =
            bounded(&lookup, "RATE_LIMIT_WINDOW_SECS", 60, 10..=3_600)?;
        let push_rate_limit_per_window: u32 =
            bounded(&lookup, "PUSH_RATE_LIMIT_PER_WINDOW", 120, 1..=10_000)?;

        Ok(Self {
            bind_addr,
            database_path,
            jwt_secret,
            jwt_issuer,
            auth_clock_skew: Duration::from_secs(auth_clock_skew_secs),
            sync: SyncSettings {
                max_batch_size,
                pull_default_limit,
                pull_max_limit,
                apply_max_attempts,
                disjoint_merge,
            },
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            push_rate_limit_per_window,
        })
    }
}

/// Parse an integer variable that must fall inside `range`.
fn bounded<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Display + Copy,
{
    let invalid = || {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    };
    let value = match optional_trimmed(lookup, name) {
        Some(raw) => raw.parse::<T>().map_err(|_| invalid())?,
        None => default,
    };
    if !range.contains(&value) {
        return Err(invalid());
    }
    Ok(value)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    lookup(name).and_then(|value| {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const SECRET: &str = "sensitive-signing-secret-0123456789abcdef";

    fn load(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn config_requires_jwt_secret() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("SYNC_JWT_SECRET"));

        let err = load(&[("SYNC_JWT_SECRET", "short")]).unwrap_err();
        assert!(err.to_string().contains("at least 32"));
    }

    #[test]
    fn config_defaults() {
        let config = load(&[("SYNC_JWT_SECRET", SECRET)]).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8080");
        assert_eq!(config.database_path, PathBuf::from("hims-sync.db"));
        assert_eq!(config.sync, SyncSettings::default());
        assert_eq!(config.auth_clock_skew, Duration::from_secs(60));
        assert_eq!(config.push_rate_limit_per_window, 120);
        assert!(config.jwt_issuer.is_none());
    }

    #[test]
    fn config_reads_sync_tunables() {
        let config = load(&[
            ("SYNC_JWT_SECRET", SECRET),
            ("SYNC_MAX_BATCH_SIZE", "50"),
            ("SYNC_PULL_DEFAULT_LIMIT", "20"),
            ("SYNC_PULL_MAX_LIMIT", "200"),
            ("SYNC_APPLY_MAX_ATTEMPTS", "5"),
            ("SYNC_DISJOINT_MERGE", "three_way"),
            ("SYNC_JWT_ISSUER", "hims-auth"),
        ])
        .unwrap();
        assert_eq!(config.sync.max_batch_size, 50);
        assert_eq!(config.sync.pull_default_limit, 20);
        assert_eq!(config.sync.pull_max_limit, 200);
        assert_eq!(config.sync.apply_max_attempts, 5);
        assert_eq!(config.sync.disjoint_merge, DisjointMergePolicy::ThreeWay);
        assert_eq!(config.jwt_issuer.as_deref(), Some("hims-auth"));
    }

    #[test]
    fn config_rejects_out_of_range_values() {
        let err = load(&[("SYNC_JWT_SECRET", SECRET), ("AUTH_CLOCK_SKEW_SECS", "301")])
            .unwrap_err();
        assert!(err.to_string().contains("AUTH_CLOCK_SKEW_SECS"));

        let err = load(&[("SYNC_JWT_SECRET", SECRET), ("SYNC_APPLY_MAX_ATTEMPTS", "x")])
            .unwrap_err();
        assert!(err.to_string().contains("[1, 10]"));

        let err = load(&[
            ("SYNC_JWT_SECRET", SECRET),
            ("SYNC_PULL_DEFAULT_LIMIT", "500"),
            ("SYNC_PULL_MAX_LIMIT", "100"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("SYNC_PULL_MAX_LIMIT"));

        let err = load(&[("SYNC_JWT_SECRET", SECRET), ("SYNC_DISJOINT_MERGE", "lww")])
            .unwrap_err();
        assert!(err.to_string().contains("SYNC_DISJOINT_MERGE"));
    }

    #[test]
    fn config_redacts_sensitive_debug_fields() {
        let config = load(&[("SYNC_JWT_SECRET", SECRET)]).unwrap();
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains(SECRET));
        assert!(debug_output.contains("[REDACTED]"));
    }
}

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use fieldledger_core::conflict::RetryPolicy;
use fieldledger_core::services::LedgerSettings;
use thiserror::Error;

/// Minimum HS256 key length in bytes
const MIN_SECRET_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Where records are kept
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    Memory,
    Sqlite(PathBuf),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub storage: StorageTarget,
    pub jwt_secret: String,
    pub auth_clock_skew: Duration,
    pub conflict_max_attempts: u32,
    pub conflict_initial_backoff: Duration,
    pub conflict_max_backoff: Duration,
    pub max_sync_batch: usize,
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("storage", &self.storage)
            .field("jwt_secret", &"[REDACTED]")
            .field("auth_clock_skew", &self.auth_clock_skew)
            .field("conflict_max_attempts", &self.conflict_max_attempts)
            .field("conflict_initial_backoff", &self.conflict_initial_backoff)
            .field("conflict_max_backoff", &self.conflict_max_backoff)
            .field("max_sync_batch", &self.max_sync_batch)
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "FIELDLEDGER_BIND_ADDR", "127.0.0.1:8080");

        let storage = match value_or_default(&lookup, "FIELDLEDGER_DATABASE_PATH", ":memory:") {
            path if path == ":memory:" => StorageTarget::Memory,
            path => StorageTarget::Sqlite(PathBuf::from(path)),
        };

        let jwt_secret = required_trimmed(&lookup, "JWT_SECRET")?;
        if jwt_secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::Invalid(format!(
                "JWT_SECRET must be at least {MIN_SECRET_LEN} bytes"
            )));
        }

        let auth_clock_skew_secs = bounded(&lookup, "AUTH_CLOCK_SKEW_SECS", 60, 0, 300)?;
        let conflict_max_attempts = bounded(&lookup, "CONFLICT_MAX_ATTEMPTS", 8, 1, 64)?;
        let initial_backoff_ms = bounded(&lookup, "CONFLICT_INITIAL_BACKOFF_MS", 10, 0, 1_000)?;
        let max_backoff_ms = bounded(&lookup, "CONFLICT_MAX_BACKOFF_MS", 500, 0, 10_000)?;
        if max_backoff_ms < initial_backoff_ms {
            return Err(ConfigError::Invalid(
                "CONFLICT_MAX_BACKOFF_MS must be >= CONFLICT_INITIAL_BACKOFF_MS".to_string(),
            ));
        }
        let max_sync_batch = bounded(&lookup, "MAX_SYNC_BATCH", 500, 1, 10_000)?;

        Ok(Self {
            bind_addr,
            storage,
            jwt_secret,
            auth_clock_skew: Duration::from_secs(auth_clock_skew_secs),
            conflict_max_attempts,
            conflict_initial_backoff: Duration::from_millis(initial_backoff_ms),
            conflict_max_backoff: Duration::from_millis(max_backoff_ms),
            max_sync_batch,
        })
    }

    pub const fn ledger_settings(&self) -> LedgerSettings {
        LedgerSettings {
            retry: RetryPolicy {
                max_attempts: self.conflict_max_attempts,
                initial_backoff: self.conflict_initial_backoff,
                max_backoff: self.conflict_max_backoff,
            },
            max_batch: self.max_sync_batch,
        }
    }
}

/// Integer setting in `[min, max]`, defaulting when unset
fn bounded<N>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: N,
    min: N,
    max: N,
) -> Result<N, ConfigError>
where
    N: std::str::FromStr + PartialOrd + fmt::Display + Copy,
{
    let Some(raw) = optional_trimmed(lookup, name) else {
        return Ok(default);
    };
    let value = raw.parse::<N>().map_err(|_| {
        ConfigError::Invalid(format!("{name} must be an integer in [{min}, {max}]"))
    })?;
    if value < min || value > max {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{min}, {max}]"
        )));
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

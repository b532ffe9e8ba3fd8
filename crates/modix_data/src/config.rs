//! Environment-driven configuration for the store and logging.
//!
//! Reads an optional `.env` once per process, then the `MODIX_*` variables:
//! - `MODIX_DATABASE_PATH`: SQLite file; unset means an in-memory store.
//! - `MODIX_BUSY_TIMEOUT_MS`: SQLite busy timeout, default 5000.
//! - `MODIX_LOG_LEVEL`: default depends on build mode.
//! - `MODIX_LOG_DIR`: absolute directory for rolling log files.

use dotenvy::dotenv;
use once_cell::sync::Lazy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::logging::{default_log_level, LoggingConfig};

pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

static DOTENV_LOADED: Lazy<()> = Lazy::new(|| {
    // a missing .env is fine
    let _ = dotenv();
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{variable} must be {expected}, got `{value}`")]
    Malformed {
        variable: &'static str,
        expected: &'static str,
        value: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub database_path: Option<PathBuf>,
    pub busy_timeout: Duration,
    pub log_level: String,
    pub log_dir: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            log_level: default_log_level().to_string(),
            log_dir: None,
        }
    }
}

impl StoreConfig {
    /// Builds a config from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Lazy::force(&DOTENV_LOADED);
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let busy_timeout = match non_empty("MODIX_BUSY_TIMEOUT_MS") {
            Some(value) => Duration::from_millis(value.trim().parse::<u64>().map_err(|_| {
                ConfigError::Malformed {
                    variable: "MODIX_BUSY_TIMEOUT_MS",
                    expected: "a non-negative integer",
                    value: value.clone(),
                }
            })?),
            None => defaults.busy_timeout,
        };

        let log_dir = non_empty("MODIX_LOG_DIR").map(PathBuf::from);
        if let Some(dir) = &log_dir {
            if !dir.is_absolute() {
                return Err(ConfigError::Malformed {
                    variable: "MODIX_LOG_DIR",
                    expected: "an absolute path",
                    value: dir.display().to_string(),
                });
            }
        }

        Ok(Self {
            database_path: non_empty("MODIX_DATABASE_PATH").map(PathBuf::from),
            busy_timeout,
            log_level: non_empty("MODIX_LOG_LEVEL").unwrap_or(defaults.log_level),
            log_dir,
        })
    }

    /// Logging settings, when a log directory is configured.
    pub fn logging(&self) -> Option<LoggingConfig> {
        self.log_dir.as_ref().map(|dir| LoggingConfig {
            level: self.log_level.clone(),
            log_dir: dir.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, StoreConfig, DEFAULT_BUSY_TIMEOUT};
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::time::Duration;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn empty_environment_yields_in_memory_defaults() {
        let config = StoreConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.database_path, None);
        assert_eq!(config.busy_timeout, DEFAULT_BUSY_TIMEOUT);
        assert!(config.logging().is_none());
    }

    #[test]
    fn reads_all_variables() {
        let config = StoreConfig::from_lookup(lookup(&[
            ("MODIX_DATABASE_PATH", "/var/lib/modix/modix.db"),
            ("MODIX_BUSY_TIMEOUT_MS", "250"),
            ("MODIX_LOG_LEVEL", "warn"),
            ("MODIX_LOG_DIR", "/var/log/modix"),
        ]))
        .unwrap();

        assert_eq!(
            config.database_path,
            Some(PathBuf::from("/var/lib/modix/modix.db"))
        );
        assert_eq!(config.busy_timeout, Duration::from_millis(250));
        let logging = config.logging().expect("log dir is configured");
        assert_eq!(logging.level, "warn");
        assert_eq!(logging.log_dir, PathBuf::from("/var/log/modix"));
    }

    #[test]
    fn malformed_timeout_is_rejected() {
        let err = StoreConfig::from_lookup(lookup(&[("MODIX_BUSY_TIMEOUT_MS", "soon")]))
            .expect_err("non-numeric timeout must fail");
        assert!(matches!(
            err,
            ConfigError::Malformed {
                variable: "MODIX_BUSY_TIMEOUT_MS",
                ..
            }
        ));
    }

    #[test]
    fn relative_log_dir_is_rejected() {
        let err = StoreConfig::from_lookup(lookup(&[("MODIX_LOG_DIR", "logs")]))
            .expect_err("relative log dir must fail");
        assert!(err.to_string().contains("absolute"));
    }
}

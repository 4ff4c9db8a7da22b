//! Ledger configuration module.
//!
//! Configuration is loaded from environment variables with fallback to defaults.
//!
//! | Variable                        | Default        |
//! |---------------------------------|----------------|
//! | `STOCKLINE_DATABASE_PATH`       | `stockline.db` |
//! | `STOCKLINE_MAX_CONNECTIONS`     | `5`            |
//! | `STOCKLINE_CONNECT_TIMEOUT_SECS`| `30`           |
//! | `STOCKLINE_UNIT_TIMEOUT_MS`     | `10000`        |
//! | `STOCKLINE_RESTOCK_ON_FAILURE`  | `false`        |
//! | `STOCKLINE_INVOICE_PREFIX`      | `INV`          |

use serde::{Deserialize, Serialize};
use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::pool::{CheckoutPolicy, DbConfig};

/// Stockline runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerConfig {
    /// SQLite database file
    pub database_path: String,

    /// Pool size
    pub max_connections: u32,

    /// Connection acquire timeout in seconds
    pub connect_timeout_secs: u64,

    /// Time budget of one self-committing unit of work, in milliseconds
    pub unit_timeout_ms: u64,

    /// Credit sold stock back when a sale fails
    pub restock_on_failure: bool,

    /// Invoice code prefix
    pub invoice_prefix: String,
}

impl LedgerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = LedgerConfig {
            database_path: lookup("STOCKLINE_DATABASE_PATH")
                .unwrap_or_else(|| "stockline.db".to_string()),

            max_connections: parse_or(&lookup, "STOCKLINE_MAX_CONNECTIONS", 5)?,

            connect_timeout_secs: parse_or(&lookup, "STOCKLINE_CONNECT_TIMEOUT_SECS", 30)?,

            unit_timeout_ms: parse_or(&lookup, "STOCKLINE_UNIT_TIMEOUT_MS", 10_000)?,

            restock_on_failure: parse_or(&lookup, "STOCKLINE_RESTOCK_ON_FAILURE", false)?,

            invoice_prefix: lookup("STOCKLINE_INVOICE_PREFIX")
                .unwrap_or_else(|| "INV".to_string()),
        };

        if config.database_path.trim().is_empty() {
            return Err(ConfigError::MissingRequired(
                "STOCKLINE_DATABASE_PATH".to_string(),
            ));
        }

        if config.max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "STOCKLINE_MAX_CONNECTIONS".to_string(),
            ));
        }

        if config.unit_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue(
                "STOCKLINE_UNIT_TIMEOUT_MS".to_string(),
            ));
        }

        if config.invoice_prefix.is_empty()
            || !config
                .invoice_prefix
                .chars()
                .all(|c| c.is_ascii_alphanumeric())
        {
            return Err(ConfigError::InvalidValue(
                "STOCKLINE_INVOICE_PREFIX".to_string(),
            ));
        }

        Ok(config)
    }

    /// Builds the pool configuration.
    pub fn into_db_config(self) -> DbConfig {
        DbConfig::new(self.database_path)
            .max_connections(self.max_connections)
            .connect_timeout(Duration::from_secs(self.connect_timeout_secs))
            .unit_timeout(Duration::from_millis(self.unit_timeout_ms))
            .checkout_policy(CheckoutPolicy {
                restock_on_failure: self.restock_on_failure,
                invoice_prefix: self.invoice_prefix,
            })
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),

    #[error("Missing required configuration: {0}")]
    MissingRequired(String),
}

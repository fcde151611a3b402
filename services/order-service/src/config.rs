//! Service configuration
//!
//! Defaults can be overridden with `DEX_`-prefixed environment variables:
//!
//! - `DEX_EXCHANGE_ADDRESS`         (default: zero address)
//! - `DEX_PAIR_QUEUE_CAPACITY`      (default: 1024)
//! - `DEX_BOOK_HYDRATION_DEPTH`     (default: 10000)
//! - `DEX_SIGNATURE_TIMEOUT_SECS`   (default: unset, no expiry)
//! - `DEX_REAPER_INTERVAL_MS`       (default: 1000)

use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;
use types::ids::Address;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServiceConfig {
    /// Exchange contract every order must name
    pub exchange_address: Address,
    /// Bound of each pair worker's command queue
    pub pair_queue_capacity: usize,
    /// Resting orders loaded per side when a pair worker starts
    pub book_hydration_depth: usize,
    /// Fail trades whose taker has not signed within this many seconds
    pub signature_timeout_secs: Option<u64>,
    /// How often the expiry reaper runs
    pub reaper_interval_ms: u64,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            exchange_address: Address::default(),
            pair_queue_capacity: 1024,
            book_hydration_depth: 10_000,
            signature_timeout_secs: None,
            reaper_interval_ms: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },

    #[error("{key} must be positive")]
    NotPositive { key: String },
}

impl ServiceConfig {
    /// Build from the process environment, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let config = Self {
            exchange_address: read_or_default(
                &lookup,
                "DEX_EXCHANGE_ADDRESS",
                defaults.exchange_address,
            )?,
            pair_queue_capacity: read_or_default(
                &lookup,
                "DEX_PAIR_QUEUE_CAPACITY",
                defaults.pair_queue_capacity,
            )?,
            book_hydration_depth: read_or_default(
                &lookup,
                "DEX_BOOK_HYDRATION_DEPTH",
                defaults.book_hydration_depth,
            )?,
            signature_timeout_secs: match lookup("DEX_SIGNATURE_TIMEOUT_SECS") {
                Some(raw) => Some(parse("DEX_SIGNATURE_TIMEOUT_SECS", &raw)?),
                None => defaults.signature_timeout_secs,
            },
            reaper_interval_ms: read_or_default(
                &lookup,
                "DEX_REAPER_INTERVAL_MS",
                defaults.reaper_interval_ms,
            )?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.pair_queue_capacity == 0 {
            return Err(ConfigError::NotPositive {
                key: "pair_queue_capacity".to_string(),
            });
        }
        if self.reaper_interval_ms == 0 {
            return Err(ConfigError::NotPositive {
                key: "reaper_interval_ms".to_string(),
            });
        }
        if self.signature_timeout_secs == Some(0) {
            return Err(ConfigError::NotPositive {
                key: "signature_timeout_secs".to_string(),
            });
        }
        Ok(())
    }

    pub fn signature_timeout(&self) -> Option<Duration> {
        self.signature_timeout_secs.map(Duration::from_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_millis(self.reaper_interval_ms)
    }
}

fn read_or_default<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => parse(key, &raw),
        None => Ok(default),
    }
}

fn parse<T: FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse::<T>().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: raw.to_string(),
    })
}

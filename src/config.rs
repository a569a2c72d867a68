//! Runtime configuration
//!
//! Read from the environment (a `.env` file is honoured). CLI flags
//! override whatever is loaded here.

use crate::error::{MarketError, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const LISTEN_ADDR_VAR: &str = "TRADEPOST_LISTEN_ADDR";
pub const POLL_INTERVAL_VAR: &str = "TRADEPOST_POLL_INTERVAL_SECS";
pub const LISTINGS_FILE_VAR: &str = "TRADEPOST_LISTINGS_FILE";

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:9400";
const DEFAULT_POLL_SECS: u64 = 10;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub listen_addr: String,
    /// View session refresh period, also used for cascade retries
    pub poll_interval: Duration,
    /// JSON array of listings used to seed the in-memory catalog
    pub listings_file: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            poll_interval: Duration::from_secs(DEFAULT_POLL_SECS),
            listings_file: None,
        }
    }
}

impl Config {
    /// Load `.env` (if present) and then the process environment
    pub fn load() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let listen_addr = lookup(LISTEN_ADDR_VAR)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or(defaults.listen_addr);

        let poll_interval = match lookup(POLL_INTERVAL_VAR) {
            Some(raw) => {
                let secs: u64 = raw.trim().parse().map_err(|_| {
                    MarketError::Configuration(format!(
                        "{} must be a whole number of seconds, got {:?}",
                        POLL_INTERVAL_VAR, raw
                    ))
                })?;
                if secs == 0 {
                    return Err(MarketError::Configuration(format!(
                        "{} must be at least 1",
                        POLL_INTERVAL_VAR
                    )));
                }
                Duration::from_secs(secs)
            }
            None => defaults.poll_interval,
        };

        let listings_file = lookup(LISTINGS_FILE_VAR)
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);

        Ok(Self {
            listen_addr,
            poll_interval,
            listings_file,
        })
    }
}

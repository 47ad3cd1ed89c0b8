// src/config.rs
//! Runtime configuration.
//!
//! Settings are layered, later sources winning:
//! 1. built-in defaults
//! 2. an optional `ipid.toml` in the working directory
//! 3. `IPID_*` environment variables (a `.env` file is loaded first by `main`)
//!
//! | Key | Env var | Default |
//! |---|---|---|
//! | `ipfs_api_url` | `IPID_IPFS_API_URL` | `http://localhost:5001` |
//! | `listen_addr` | `IPID_LISTEN_ADDR` | `127.0.0.1:3000` |
//! | `record_lifetime_hours` | `IPID_RECORD_LIFETIME_HOURS` | `87600` |

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::time::Duration;

/// Lifetime and TTL given to published naming records: ten years.
pub const DEFAULT_RECORD_LIFETIME: Duration = Duration::from_secs(87_600 * 3600);

/// Per-instance configuration of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpidConfig {
    /// Used as both lifetime and TTL of every published record.
    pub record_lifetime: Duration,
}

impl Default for IpidConfig {
    fn default() -> Self {
        IpidConfig {
            record_lifetime: DEFAULT_RECORD_LIFETIME,
        }
    }
}

/// Process-level settings for the `ipid` binary.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Settings {
    pub ipfs_api_url: String,
    pub listen_addr: String,
    pub record_lifetime_hours: u64,
}

impl Settings {
    /// Loads settings from defaults, `ipid.toml` and the environment.
    ///
    /// # Errors
    /// `ConfigError::Message` if `record_lifetime_hours` is zero or too large
    /// to express in seconds.
    pub fn load() -> Result<Self, ConfigError> {
        let config = Self::builder()?
            .add_source(File::with_name("ipid").required(false))
            .add_source(Environment::with_prefix("IPID"))
            .build()?;
        Self::from_config(config)
    }

    fn from_config(config: Config) -> Result<Self, ConfigError> {
        let settings: Settings = config.try_deserialize()?;
        settings.ipid_config()?;
        Ok(settings)
    }

    fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        Config::builder()
            .set_default("ipfs_api_url", "http://localhost:5001")?
            .set_default("listen_addr", "127.0.0.1:3000")?
            .set_default("record_lifetime_hours", 87_600_i64)
    }

    pub fn ipid_config(&self) -> Result<IpidConfig, ConfigError> {
        if self.record_lifetime_hours == 0 {
            return Err(ConfigError::Message(
                "record_lifetime_hours must be at least 1".into(),
            ));
        }
        let secs = self.record_lifetime_hours.checked_mul(3600).ok_or_else(|| {
            ConfigError::Message(format!(
                "record_lifetime_hours {} is too large",
                self.record_lifetime_hours
            ))
        })?;
        Ok(IpidConfig {
            record_lifetime: Duration::from_secs(secs),
        })
    }
}

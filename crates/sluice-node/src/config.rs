//! Node configuration for a persistent distributor instance.
//!
//! [`NodeConfig::load`] layers, lowest first: built-in defaults, an optional
//! TOML file, then `SLUICE__*` environment variables (`__` separates nested
//! keys, e.g. `SLUICE__PARAMS__CLAIM_MAX_ITERATIONS=10`).

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use sluice_core::constants::DEFAULT_LOG_LEVEL;
use sluice_core::error::SluiceError;
use sluice_core::types::AccountId;
use sluice_distributor::DistributorParams;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SLUICE";

/// Configuration for a distributor instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Root directory for all persistent data.
    pub data_dir: PathBuf,
    /// Log level filter string (e.g. "info", "debug", "sluice_distributor=trace").
    pub log_level: String,
    /// Log output format ("text" or "json").
    pub log_format: String,
    /// Accounting start (floored to a week on first open).
    pub start_time: u64,
    /// Identity under which the distributor holds funds.
    pub distributor: AccountId,
    pub params: DistributorParams,
}

impl Default for NodeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sluice");

        Self {
            data_dir,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: "text".to_string(),
            start_time: 0,
            distributor: AccountId::derive("sluice-distributor"),
            params: DistributorParams::default(),
        }
    }
}

impl NodeConfig {
    /// Load defaults, then `file` if given and present, then the environment.
    pub fn load(file: Option<&Path>) -> Result<Self, SluiceError> {
        let defaults = config::Config::try_from(&Self::default()).map_err(config_err)?;
        let mut builder = config::Config::builder().add_source(defaults);
        if let Some(path) = file {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        let cfg: Self = builder
            .add_source(config::Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()
            .map_err(config_err)?
            .try_deserialize()
            .map_err(config_err)?;
        cfg.params.validate().map_err(SluiceError::Config)?;
        Ok(cfg)
    }

    /// Path to the RocksDB state directory.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("state")
    }
}

fn config_err(e: config::ConfigError) -> SluiceError {
    SluiceError::Config(e.to_string())
}

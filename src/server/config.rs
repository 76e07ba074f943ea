//! Configuration loading for portunusd.
//!
//! Configuration is loaded from TOML files with the following resolution order:
//! 1. `--config <path>` (CLI flag)
//! 2. `~/.portunus/config.toml` (user)
//! 3. `/etc/portunus/config.toml` (system)
//!
//! When no file exists the defaults are used. `PORTUNUS_*` environment
//! variables are applied on top of whatever the file provided.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use super::DEFAULT_MAX_BODY_BYTES;
use crate::config::GatewayConfig;
use crate::{GatewayError, Result};

/// Daemon configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
}

/// Server network configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Address to bind to (default: 127.0.0.1:8787).
    #[serde(default = "default_address")]
    pub address: String,
    /// Largest accepted request body (default: 16 MiB).
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
    /// Header carrying the upstream-verified user id (default: x-user-id).
    #[serde(default = "default_user_header")]
    pub user_header: String,
    /// Seconds between rate-limit sweeps (default: 60).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            max_body_bytes: default_max_body_bytes(),
            user_header: default_user_header(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

fn default_address() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_max_body_bytes() -> usize {
    DEFAULT_MAX_BODY_BYTES
}

fn default_user_header() -> String {
    super::identity::DEFAULT_USER_HEADER.to_string()
}

fn default_sweep_interval() -> u64 {
    60
}

impl Config {
    /// Load configuration from the standard locations, then apply the
    /// process environment.
    pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
        let mut config = match Self::resolve_config_path(explicit_path)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| {
            GatewayError::Configuration(format!("Failed to read config file {path:?}: {e}"))
        })?;
        toml::from_str(&content).map_err(|e| {
            GatewayError::Configuration(format!("Failed to parse config file {path:?}: {e}"))
        })
    }

    /// Overlay environment values: `PORTUNUS_ADDRESS` plus every
    /// [`GatewayConfig`] variable.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(address) = lookup("PORTUNUS_ADDRESS").filter(|v| !v.trim().is_empty()) {
            self.server.address = address;
        }
        self.gateway.apply_overrides(lookup)
    }

    /// Resolve the config file path. `None` means use defaults.
    fn resolve_config_path(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
        if let Some(path) = explicit {
            if path.exists() {
                return Ok(Some(path.to_path_buf()));
            }
            return Err(GatewayError::Configuration(format!(
                "Config file not found: {path:?}"
            )));
        }

        // User config
        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".portunus").join("config.toml");
            if user_config.exists() {
                return Ok(Some(user_config));
            }
        }

        // System config
        let system_config = PathBuf::from("/etc/portunus/config.toml");
        if system_config.exists() {
            return Ok(Some(system_config));
        }

        Ok(None)
    }
}

//! Gateway configuration.
//!
//! [`GatewayConfig`] holds every tunable of the gateway. It deserializes
//! from the `[gateway]` table of the daemon's TOML file (all fields
//! optional) and can be overlaid with `PORTUNUS_*` environment variables:
//!
//! | Variable | Field |
//! |---|---|
//! | `PORTUNUS_PRIMARY_PROVIDER` | `primary_provider` (`cloud` \| `local`) |
//! | `PORTUNUS_LOCAL_BASE_URL` | `local_base_url` |
//! | `PORTUNUS_LOCAL_MODEL_NAME` | `local_model_name` |
//! | `PORTUNUS_LOCAL_TIMEOUT_MS` | `local_timeout_ms` |
//! | `PORTUNUS_CLOUD_API_KEY` (or `GEMINI_API_KEY`) | `cloud_api_key` |
//! | `PORTUNUS_CLOUD_MODEL_NAME` | `cloud_model_name` |
//! | `PORTUNUS_CLOUD_BASE_URL` | `cloud_base_url` |
//! | `PORTUNUS_CLOUD_TIMEOUT_MS` | `cloud_timeout_ms` |
//! | `PORTUNUS_FALLBACK_ENABLED` | `fallback_enabled` |
//! | `PORTUNUS_MAX_CONCURRENT_LOCAL` | `max_concurrent_local` |
//! | `PORTUNUS_RATE_LIMIT_MAX` | `rate_limit_max` |
//! | `PORTUNUS_RATE_LIMIT_WINDOW_MS` | `rate_limit_window_ms` |
//! | `PORTUNUS_CACHE_TTL_SECS` | `cache_ttl_secs` |
//! | `PORTUNUS_CACHE_MAX_ENTRIES` | `cache_max_entries` |
//! | `PORTUNUS_LEDGER_CAPACITY` | `ledger_capacity` |
//! | `PORTUNUS_RETRY_MAX_ATTEMPTS` | `retry_max_attempts` |
//! | `PORTUNUS_RETRY_INITIAL_DELAY_MS` | `retry_initial_delay_ms` |

use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::cache::CacheConfig;
use crate::limiter::RateLimitConfig;
use crate::providers::RetryConfig;
use crate::providers::cloud::{DEFAULT_CLOUD_BASE_URL, DEFAULT_CLOUD_MODEL};
use crate::providers::local::{DEFAULT_LOCAL_BASE_URL, DEFAULT_LOCAL_MODEL};
use crate::types::BackendKind;
use crate::{GatewayError, Result};

/// Tunables for the gateway and its backends.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub primary_provider: BackendKind,
    pub local_base_url: String,
    pub local_model_name: String,
    pub local_timeout_ms: u64,
    pub cloud_api_key: Option<String>,
    pub cloud_model_name: String,
    pub cloud_base_url: String,
    pub cloud_timeout_ms: u64,
    /// Only takes effect when the primary is `local`.
    pub fallback_enabled: bool,
    pub max_concurrent_local: usize,
    pub rate_limit_max: u32,
    pub rate_limit_window_ms: u64,
    pub cache_ttl_secs: u64,
    pub cache_max_entries: usize,
    pub ledger_capacity: usize,
    pub retry_max_attempts: u32,
    pub retry_initial_delay_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            primary_provider: BackendKind::Local,
            local_base_url: DEFAULT_LOCAL_BASE_URL.to_string(),
            local_model_name: DEFAULT_LOCAL_MODEL.to_string(),
            local_timeout_ms: 30_000,
            cloud_api_key: None,
            cloud_model_name: DEFAULT_CLOUD_MODEL.to_string(),
            cloud_base_url: DEFAULT_CLOUD_BASE_URL.to_string(),
            cloud_timeout_ms: 60_000,
            fallback_enabled: true,
            max_concurrent_local: 3,
            rate_limit_max: 100,
            rate_limit_window_ms: 60_000,
            cache_ttl_secs: 900,
            cache_max_entries: 500,
            ledger_capacity: 10_000,
            retry_max_attempts: 3,
            retry_initial_delay_ms: 1_000,
        }
    }
}

impl GatewayConfig {
    /// Defaults overlaid with the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        config.apply_overrides(lookup)?;
        Ok(config)
    }

    /// Overlay `PORTUNUS_*` values from `lookup` onto this config.
    ///
    /// Unset or blank variables leave the current value in place.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("PORTUNUS_PRIMARY_PROVIDER") {
            self.primary_provider = v.parse().map_err(|e: String| {
                GatewayError::Configuration(format!("PORTUNUS_PRIMARY_PROVIDER: {e}"))
            })?;
        }
        if let Some(v) = get("PORTUNUS_LOCAL_BASE_URL") {
            self.local_base_url = v;
        }
        if let Some(v) = get("PORTUNUS_LOCAL_MODEL_NAME") {
            self.local_model_name = v;
        }
        if let Some(v) = get("PORTUNUS_CLOUD_API_KEY").or_else(|| get("GEMINI_API_KEY")) {
            self.cloud_api_key = Some(v);
        }
        if let Some(v) = get("PORTUNUS_CLOUD_MODEL_NAME") {
            self.cloud_model_name = v;
        }
        if let Some(v) = get("PORTUNUS_CLOUD_BASE_URL") {
            self.cloud_base_url = v;
        }
        parse_into(&get, "PORTUNUS_LOCAL_TIMEOUT_MS", &mut self.local_timeout_ms)?;
        parse_into(&get, "PORTUNUS_CLOUD_TIMEOUT_MS", &mut self.cloud_timeout_ms)?;
        parse_into(&get, "PORTUNUS_FALLBACK_ENABLED", &mut self.fallback_enabled)?;
        parse_into(&get, "PORTUNUS_MAX_CONCURRENT_LOCAL", &mut self.max_concurrent_local)?;
        parse_into(&get, "PORTUNUS_RATE_LIMIT_MAX", &mut self.rate_limit_max)?;
        parse_into(&get, "PORTUNUS_RATE_LIMIT_WINDOW_MS", &mut self.rate_limit_window_ms)?;
        parse_into(&get, "PORTUNUS_CACHE_TTL_SECS", &mut self.cache_ttl_secs)?;
        parse_into(&get, "PORTUNUS_CACHE_MAX_ENTRIES", &mut self.cache_max_entries)?;
        parse_into(&get, "PORTUNUS_LEDGER_CAPACITY", &mut self.ledger_capacity)?;
        parse_into(&get, "PORTUNUS_RETRY_MAX_ATTEMPTS", &mut self.retry_max_attempts)?;
        parse_into(&get, "PORTUNUS_RETRY_INITIAL_DELAY_MS", &mut self.retry_initial_delay_ms)?;
        Ok(())
    }

    /// Whether a failed local request may be retried on the cloud backend.
    pub fn fallback_active(&self) -> bool {
        self.fallback_enabled && self.primary_provider == BackendKind::Local
    }

    pub fn local_timeout(&self) -> Duration {
        Duration::from_millis(self.local_timeout_ms)
    }

    pub fn cloud_timeout(&self) -> Duration {
        Duration::from_millis(self.cloud_timeout_ms)
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .max_entries(self.cache_max_entries)
            .ttl(Duration::from_secs(self.cache_ttl_secs))
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .max_attempts(self.retry_max_attempts)
            .initial_delay(Duration::from_millis(self.retry_initial_delay_ms))
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig::new(
            self.rate_limit_max,
            Duration::from_millis(self.rate_limit_window_ms),
        )
    }
}

fn parse_into<T, G>(get: &G, key: &str, slot: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    if let Some(raw) = get(key) {
        *slot = raw.trim().parse().map_err(|e: T::Err| {
            GatewayError::Configuration(format!("{key}: invalid value '{raw}': {e}"))
        })?;
    }
    Ok(())
}

//! Builder for configuring gateway instances

use std::sync::Arc;

use tracing::{info, warn};

use super::Gateway;
use super::stats::GatewayCounters;
use crate::cache::{CacheConfig, ResponseCache};
use crate::config::GatewayConfig;
use crate::ledger::UsageLedger;
use crate::providers::{
    AdmissionSemaphore, BackendClient, CloudTransport, LocalTransport, RetryConfig, Transport,
};
use crate::types::BackendKind;
use crate::{GatewayError, Result};

/// Builder for [`Gateway`].
///
/// [`GatewayBuilder::from_config`] derives both transports from a
/// [`GatewayConfig`]. [`Gateway::builder`] starts empty so callers (and
/// tests) can inject their own [`Transport`] implementations.
pub struct GatewayBuilder {
    config: GatewayConfig,
    cloud: Option<Arc<dyn Transport>>,
    local: Option<Arc<dyn Transport>>,
    retry: Option<RetryConfig>,
    cache: Option<CacheConfig>,
    ledger: Option<Arc<UsageLedger>>,
}

impl GatewayBuilder {
    pub fn new() -> Self {
        Self {
            config: GatewayConfig::default(),
            cloud: None,
            local: None,
            retry: None,
            cache: None,
            ledger: None,
        }
    }

    /// Builder with HTTP transports created from `config`.
    ///
    /// The local transport is always created (its address has a default);
    /// the cloud transport only when an API key is present.
    pub fn from_config(config: GatewayConfig) -> Result<Self> {
        let local = LocalTransport::new(&config.local_base_url, &config.local_model_name)?
            .timeout(config.local_timeout());
        let cloud = match config.cloud_api_key.as_deref() {
            Some(key) => Some(
                CloudTransport::with_base_url(key, &config.cloud_model_name, &config.cloud_base_url)?
                    .timeout(config.cloud_timeout()),
            ),
            None => None,
        };

        let mut builder = Self::new().config(config).local_transport(Arc::new(local));
        if let Some(cloud) = cloud {
            builder = builder.cloud_transport(Arc::new(cloud));
        }
        Ok(builder)
    }

    /// Replace the configuration (transports already set are kept).
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn primary(mut self, backend: BackendKind) -> Self {
        self.config.primary_provider = backend;
        self
    }

    /// Enable or disable fallback (only effective with a local primary).
    pub fn fallback(mut self, enabled: bool) -> Self {
        self.config.fallback_enabled = enabled;
        self
    }

    pub fn max_concurrent_local(mut self, n: usize) -> Self {
        self.config.max_concurrent_local = n;
        self
    }

    pub fn cloud_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.cloud = Some(transport);
        self
    }

    pub fn local_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.local = Some(transport);
        self
    }

    /// Override the retry policy derived from the configuration.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Override the cache settings derived from the configuration.
    pub fn cache(mut self, cache: CacheConfig) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Share an existing usage ledger instead of creating one.
    pub fn ledger(mut self, ledger: Arc<UsageLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    /// Build the gateway.
    pub fn build(self) -> Result<Gateway> {
        let config = self.config;
        let primary = config.primary_provider;

        let primary_configured = match primary {
            BackendKind::Cloud => self.cloud.is_some(),
            BackendKind::Local => self.local.is_some(),
        };
        if !primary_configured {
            return Err(GatewayError::Configuration(match primary {
                BackendKind::Cloud => "primary provider is cloud but no cloud API key is configured".to_string(),
                BackendKind::Local => "primary provider is local but no local backend is configured".to_string(),
            }));
        }

        let retry = self.retry.unwrap_or_else(|| config.retry_config());
        let cache = self.cache.unwrap_or_else(|| config.cache_config());
        let ledger = self
            .ledger
            .unwrap_or_else(|| Arc::new(UsageLedger::new(config.ledger_capacity)));

        let make_client = |transport: Arc<dyn Transport>| {
            BackendClient::new(
                transport,
                retry.clone(),
                Arc::new(ResponseCache::new(cache.clone())),
                ledger.clone(),
            )
        };

        let cloud = self.cloud.map(&make_client);
        let local = self.local.map(|transport| {
            make_client(transport).with_admission(Arc::new(AdmissionSemaphore::new(
                config.max_concurrent_local,
            )))
        });

        let mut fallback_enabled = config.fallback_active();
        if fallback_enabled && cloud.is_none() {
            warn!("fallback enabled but no cloud backend configured; fallback disabled");
            fallback_enabled = false;
        }

        info!(
            primary = primary.as_str(),
            fallback = fallback_enabled,
            cloud = cloud.as_ref().map(BackendClient::name),
            local = local.as_ref().map(BackendClient::name),
            "gateway configured"
        );

        Ok(Gateway {
            primary,
            fallback_enabled,
            cloud,
            local,
            ledger,
            counters: GatewayCounters::default(),
        })
    }
}

impl Default for GatewayBuilder {
    fn default() -> Self {
        Self::new()
    }
}

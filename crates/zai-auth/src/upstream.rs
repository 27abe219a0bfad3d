//! Upstream client handle
//!
//! Bundles the shared `reqwest::Client` with the endpoint and timeout settings
//! so the pool, the admin API and the background loops all talk to the same
//! upstream the same way. Cloning is cheap: the client is reference counted.

use std::sync::Arc;
use std::time::Duration;

use crate::constants::{
    CHAT_COMPLETIONS_PATH, DEFAULT_BASE_URL, DEFAULT_CONNECT_TIMEOUT, DEFAULT_MODEL,
    DEFAULT_PROBE_TIMEOUT, DEFAULT_SIGNIN_TIMEOUT, SIGNIN_PATH,
};
use crate::error::{Error, Result};

/// Endpoint and timeout settings for upstream calls.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Origin serving both chat and sign-in, without trailing path
    pub base_url: String,
    /// Model requested by the health probe
    pub model: String,
    pub connect_timeout: Duration,
    pub probe_timeout: Duration,
    pub signin_timeout: Duration,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            probe_timeout: DEFAULT_PROBE_TIMEOUT,
            signin_timeout: DEFAULT_SIGNIN_TIMEOUT,
        }
    }
}

impl UpstreamConfig {
    /// Default settings pointed at a different origin (local test servers).
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Full URL of the chat completion endpoint.
    pub fn chat_url(&self) -> String {
        format!(
            "{}{}",
            self.base_url.trim_end_matches('/'),
            CHAT_COMPLETIONS_PATH
        )
    }

    /// Full URL of the sign-in endpoint.
    pub fn signin_url(&self) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), SIGNIN_PATH)
    }
}

/// Shared upstream client used for probes and sign-in exchanges.
#[derive(Debug, Clone)]
pub struct Upstream {
    pub(crate) client: reqwest::Client,
    pub(crate) config: Arc<UpstreamConfig>,
}

impl Upstream {
    /// Build a client with the configured connect timeout.
    pub fn new(config: UpstreamConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()
            .map_err(|e| Error::Client(e.to_string()))?;
        Ok(Self::with_client(client, config))
    }

    /// Wrap an existing client (shared with the request forwarder).
    pub fn with_client(client: reqwest::Client, config: UpstreamConfig) -> Self {
        Self {
            client,
            config: Arc::new(config),
        }
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn config(&self) -> &UpstreamConfig {
        &self.config
    }
}

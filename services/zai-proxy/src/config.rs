//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Pool entries come from the first non-empty source of `Z_AI_COOKIES`
//! (comma separated), `pool.entries_file`, and the inline `pool.entries` list.
//! Entries hold passwords and tokens; they are never logged. The same goes
//! for the client API key (`server.api_key`, overridden by `API_KEY`).

use common::Secret;
use serde::{Deserialize, Deserializer};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use token_pool::{DEFAULT_MAX_CONCURRENT, HealthSchedule, RefreshSchedule};
use zai_auth::UpstreamConfig;

/// Value shipped in sample env files; treated as unset.
const PLACEHOLDER_COOKIES: &str = "your_z_ai_cookie_here";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamSettings,
    #[serde(default)]
    pub pool: PoolConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// Listener settings for the forwarder and the admin API
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    #[serde(default = "default_admin_addr")]
    pub admin_addr: SocketAddr,
    /// Forwarded request timeout
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Key clients must send as `Authorization: Bearer <key>` to the forwarder
    #[serde(default, deserialize_with = "deserialize_secret")]
    pub api_key: Secret<String>,
}

/// Upstream endpoints and per-call timeouts
#[derive(Debug, Deserialize)]
pub struct UpstreamSettings {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
    #[serde(default = "default_signin_timeout")]
    pub signin_timeout_secs: u64,
}

/// Where the startup entry list came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntrySource {
    Env,
    File,
    #[default]
    Inline,
}

impl EntrySource {
    pub fn label(&self) -> &'static str {
        match self {
            EntrySource::Env => "env",
            EntrySource::File => "file",
            EntrySource::Inline => "inline",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PoolConfig {
    #[serde(default)]
    pub entries: Vec<String>,
    /// Entries file, read at startup and rewritten after refresh or admin edits
    #[serde(default)]
    pub entries_file: Option<PathBuf>,
    #[serde(skip)]
    pub source: EntrySource,
}

#[derive(Debug, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_retry")]
    pub retry_secs: u64,
}

#[derive(Debug, Deserialize)]
pub struct RefreshConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
    #[serde(default = "default_retry")]
    pub retry_secs: u64,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<Secret<String>, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(Secret::new)
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_admin_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9090))
}

fn default_timeout() -> u64 {
    300
}

fn default_max_connections() -> usize {
    50
}

fn default_base_url() -> String {
    zai_auth::DEFAULT_BASE_URL.to_string()
}

fn default_model() -> String {
    zai_auth::DEFAULT_MODEL.to_string()
}

fn default_connect_timeout() -> u64 {
    zai_auth::DEFAULT_CONNECT_TIMEOUT.as_secs()
}

fn default_probe_timeout() -> u64 {
    zai_auth::DEFAULT_PROBE_TIMEOUT.as_secs()
}

fn default_signin_timeout() -> u64 {
    zai_auth::DEFAULT_SIGNIN_TIMEOUT.as_secs()
}

fn default_health_interval() -> u64 {
    600
}

fn default_refresh_interval() -> u64 {
    3600
}

fn default_retry() -> u64 {
    300
}

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            admin_addr: default_admin_addr(),
            timeout_secs: default_timeout(),
            max_connections: default_max_connections(),
            api_key: Secret::default(),
        }
    }
}

impl Default for UpstreamSettings {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            connect_timeout_secs: default_connect_timeout(),
            probe_timeout_secs: default_probe_timeout(),
            signin_timeout_secs: default_signin_timeout(),
        }
    }
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_health_interval(),
            retry_secs: default_retry(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: default_refresh_interval(),
            retry_secs: default_retry(),
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl UpstreamSettings {
    pub fn to_upstream_config(&self) -> UpstreamConfig {
        UpstreamConfig {
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            connect_timeout: Duration::from_secs(self.connect_timeout_secs),
            probe_timeout: Duration::from_secs(self.probe_timeout_secs),
            signin_timeout: Duration::from_secs(self.signin_timeout_secs),
        }
    }
}

impl HealthConfig {
    pub fn schedule(&self) -> HealthSchedule {
        HealthSchedule {
            interval: Duration::from_secs(self.interval_secs),
            retry: Duration::from_secs(self.retry_secs),
        }
    }
}

impl RefreshConfig {
    pub fn schedule(&self) -> RefreshSchedule {
        RefreshSchedule {
            enabled: self.enabled,
            interval: Duration::from_secs(self.interval_secs),
            retry: Duration::from_secs(self.retry_secs),
            max_concurrent: self.max_concurrent,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// Entry resolution order:
    /// 1. Z_AI_COOKIES env var
    /// 2. entries_file, when it exists
    /// 3. inline pool.entries
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;

        config.apply_env()?;
        config.validate()?;
        config.resolve_entries()?;

        Ok(config)
    }

    fn apply_env(&mut self) -> common::Result<()> {
        if let Ok(value) = std::env::var("API_KEY")
            && !value.trim().is_empty()
        {
            self.server.api_key = Secret::new(value.trim().to_string());
        }

        if let Ok(value) = std::env::var("AUTO_REFRESH_TOKENS") {
            self.refresh.enabled = matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes"
            );
        }

        if let Ok(value) = std::env::var("REFRESH_CHECK_INTERVAL") {
            self.refresh.interval_secs = value.trim().parse().map_err(|e| {
                common::Error::Config(format!(
                    "REFRESH_CHECK_INTERVAL must be a number of seconds, got {value:?}: {e}"
                ))
            })?;
        }

        Ok(())
    }

    fn validate(&self) -> common::Result<()> {
        if !self.upstream.base_url.starts_with("http://")
            && !self.upstream.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.upstream.base_url
            )));
        }

        let non_zero = [
            ("server.timeout_secs", self.server.timeout_secs),
            ("upstream.connect_timeout_secs", self.upstream.connect_timeout_secs),
            ("upstream.probe_timeout_secs", self.upstream.probe_timeout_secs),
            ("upstream.signin_timeout_secs", self.upstream.signin_timeout_secs),
            ("health.interval_secs", self.health.interval_secs),
            ("health.retry_secs", self.health.retry_secs),
            ("refresh.interval_secs", self.refresh.interval_secs),
            ("refresh.retry_secs", self.refresh.retry_secs),
        ];
        for (name, value) in non_zero {
            if value == 0 {
                return Err(common::Error::Config(format!(
                    "{name} must be greater than 0"
                )));
            }
        }

        if self.server.max_connections == 0 {
            return Err(common::Error::Config(
                "max_connections must be greater than 0".into(),
            ));
        }

        if self.server.api_key.expose().trim().is_empty() {
            return Err(common::Error::Config(
                "server.api_key must be set (or API_KEY) so the forwarder can authenticate clients"
                    .into(),
            ));
        }

        Ok(())
    }

    fn resolve_entries(&mut self) -> common::Result<()> {
        if let Ok(value) = std::env::var("Z_AI_COOKIES") {
            let entries = split_env_entries(&value);
            if !entries.is_empty() {
                self.pool.entries = entries;
                self.pool.source = EntrySource::Env;
                return Ok(());
            }
        }

        if let Some(ref file) = self.pool.entries_file
            && file.exists()
        {
            let contents = std::fs::read_to_string(file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read entries_file {}: {e}",
                    file.display()
                ))
            })?;
            self.pool.entries = zai_auth::parse_entry_list(&contents);
            self.pool.source = EntrySource::File;
            return Ok(());
        }

        self.pool.entries = self
            .pool
            .entries
            .iter()
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty())
            .collect();
        self.pool.source = EntrySource::Inline;
        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("zai-proxy.toml")
    }
}

/// Split the comma separated env value, dropping blanks and the sample
/// placeholder.
fn split_env_entries(value: &str) -> Vec<String> {
    if value.trim() == PLACEHOLDER_COOKIES {
        return Vec::new();
    }
    value
        .split(',')
        .map(str::trim)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::error::{Result, ThinkgateError};

/// Environment variable that overrides the upstream host
pub const UPSTREAM_HOST_ENV: &str = "OLLAMA_HOST";

/// Port assumed when the upstream host is given without scheme or port
pub const DEFAULT_UPSTREAM_PORT: u16 = 11434;

/// Main configuration structure for thinkgate
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// HTTP proxy configuration
    #[serde(default)]
    pub proxy: ProxyConfig,
    /// Upstream inference server configuration
    #[serde(default)]
    pub upstream: UpstreamConfig,
    /// Idle model eviction configuration
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    /// Reasoning tag stripping configuration
    #[serde(default)]
    pub thinking: ThinkingConfig,
}

/// HTTP proxy server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Address to listen on (e.g., "127.0.0.1:11435")
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> String {
    "127.0.0.1:11435".to_string()
}

/// Upstream inference server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    /// Upstream host, either `host:port` or a full URL
    #[serde(default = "default_upstream_host")]
    pub host: String,
    /// How long to wait for the upstream response head, in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// TCP connect timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            host: default_upstream_host(),
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

fn default_upstream_host() -> String {
    "127.0.0.1:11434".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl UpstreamConfig {
    /// Resolve the configured host into a base URL ending in `/`.
    ///
    /// Accepts the same forms as `OLLAMA_HOST`: `host`, `host:port`,
    /// `http://host:port`, or a URL with a path prefix. A missing scheme
    /// defaults to `http`, and a bare host gets port 11434.
    pub fn base_url(&self) -> Result<Url> {
        let host = self.host.trim();
        if host.is_empty() {
            return Err(ThinkgateError::Config(
                "Upstream host cannot be empty".to_string(),
            ));
        }

        let has_scheme = host.contains("://");
        let with_scheme = if has_scheme {
            host.to_string()
        } else {
            format!("http://{host}")
        };

        let mut url = Url::parse(&with_scheme)
            .map_err(|e| ThinkgateError::Config(format!("Invalid upstream host '{host}': {e}")))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(ThinkgateError::Config(format!(
                "Unsupported upstream scheme '{}': only http and https are allowed",
                url.scheme()
            )));
        }
        if url.host_str().is_none() {
            return Err(ThinkgateError::Config(format!(
                "Upstream host '{host}' has no host component"
            )));
        }

        let explicit_port = host
            .rsplit_once(':')
            .is_some_and(|(_, port)| !port.is_empty() && port.chars().all(|c| c.is_ascii_digit()));
        if !has_scheme && !explicit_port {
            url.set_port(Some(DEFAULT_UPSTREAM_PORT))
                .map_err(|_| ThinkgateError::Config(format!("Invalid upstream host '{host}'")))?;
        }

        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        url.set_query(None);
        url.set_fragment(None);

        Ok(url)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Idle model eviction configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Run the background sweep that unloads idle models
    #[serde(default = "default_lifecycle_enabled")]
    pub enabled: bool,
    /// Seconds without use after which a loaded model is unloaded
    #[serde(default = "default_inactivity_timeout_secs")]
    pub inactivity_timeout_secs: u64,
    /// Seconds between sweeps
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            enabled: default_lifecycle_enabled(),
            inactivity_timeout_secs: default_inactivity_timeout_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

fn default_lifecycle_enabled() -> bool {
    true
}

fn default_inactivity_timeout_secs() -> u64 {
    60
}

fn default_sweep_interval_secs() -> u64 {
    10
}

impl LifecycleConfig {
    pub fn inactivity_timeout(&self) -> Duration {
        Duration::from_secs(self.inactivity_timeout_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Reasoning tag stripping configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ThinkingConfig {
    /// Surface hidden reasoning in a separate `thinking` field instead of dropping it
    #[serde(default)]
    pub show_thinking: bool,
    /// Marker that opens a hidden region
    #[serde(default = "default_open_tag")]
    pub open_tag: String,
    /// Marker that closes a hidden region
    #[serde(default = "default_close_tag")]
    pub close_tag: String,
    /// Case-insensitive substrings identifying reasoning-capable models
    #[serde(default = "default_model_patterns")]
    pub model_patterns: Vec<String>,
}

impl Default for ThinkingConfig {
    fn default() -> Self {
        Self {
            show_thinking: false,
            open_tag: default_open_tag(),
            close_tag: default_close_tag(),
            model_patterns: default_model_patterns(),
        }
    }
}

fn default_open_tag() -> String {
    "<think>".to_string()
}

fn default_close_tag() -> String {
    "</think>".to_string()
}

fn default_model_patterns() -> Vec<String> {
    vec!["deepseek".to_string()]
}

impl Config {
    /// Parse a configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| ThinkgateError::Config(format!("Failed to parse config: {e}")))
    }

    /// Load configuration from an explicit path, or from the first default
    /// location that exists, or fall back to defaults.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            tracing::info!("Loading config from: {}", path.display());
            return Self::load_file(path);
        }

        for path in default_config_paths() {
            if path.exists() {
                tracing::info!("Loading config from: {}", path.display());
                return Self::load_file(&path);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Config::default())
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ThinkgateError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content)
    }

    /// Apply environment overrides from the process environment
    pub fn apply_env_overrides(&mut self) {
        self.apply_env_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply environment overrides using the given lookup function
    pub fn apply_env_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup(UPSTREAM_HOST_ENV) {
            let host = host.trim();
            if !host.is_empty() {
                tracing::debug!("Upstream host overridden by {UPSTREAM_HOST_ENV}: {host}");
                self.upstream.host = host.to_string();
            }
        }
    }

    /// Check values that would otherwise fail later at runtime
    pub fn validate(&self) -> Result<()> {
        self.upstream.base_url()?;
        self.proxy.listen_addr.parse::<SocketAddr>().map_err(|e| {
            ThinkgateError::Config(format!(
                "Invalid listen address '{}': {e}",
                self.proxy.listen_addr
            ))
        })?;

        if self.lifecycle.sweep_interval_secs == 0 {
            return Err(ThinkgateError::Config(
                "lifecycle.sweep_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.thinking.open_tag.is_empty() || self.thinking.close_tag.is_empty() {
            return Err(ThinkgateError::Config(
                "thinking.open_tag and thinking.close_tag cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_config_paths() -> Vec<PathBuf> {
    [
        dirs::home_dir().map(|h| h.join(".thinkgate").join("config.toml")),
        dirs::config_dir().map(|c| c.join("thinkgate").join("config.toml")),
        Some(PathBuf::from("config.toml")),
    ]
    .into_iter()
    .flatten()
    .collect()
}

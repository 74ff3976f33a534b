//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `set_default` values and `Default` implementations
//! 2. **Config file**: TOML file named by the `WALLETGATE_CONFIG` env var
//! 3. **Environment variables**: `WALLETGATE__*` env vars override specific fields
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: HTTP listener, concurrency and body limits, call timeout
//! - [`BackendsConfig`]: the SDK daemons behind the proxy
//! - [`CacheConfig`]: response cache sizing and per-method rules
//! - [`AuthConfig`]: token header, user resolvers and method policy overrides
//! - [`HooksConfig`]: built-in hooks to enable, in order
//! - [`MetricsConfig`], [`LoggingConfig`]
//!
//! # Example
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! bind_port = 5279
//!
//! [[backends.servers]]
//! name = "sdk-1"
//! url = "http://sdk-1:5279"
//!
//! [cache.rules."resolve"]
//! ttl_seconds = 30
//!
//! [auth.policies]
//! "publish" = "requires_wallet"
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, path::Path, time::Duration};

use crate::{
    auth::{MethodPolicy, UserId},
    backend::Backend,
    cache::CacheConfig,
    hooks::builtin::BUILTIN_HOOKS,
    types::MethodMatcher,
};

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `127.0.0.1`.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port number to listen on. Must be greater than 0. Defaults to `5279`.
    #[serde(default = "default_bind_port")]
    pub bind_port: u16,

    /// Maximum number of requests handled at once. Defaults to `500`.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Largest accepted request body. Defaults to 2 MiB.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,

    /// Backend call timeout in seconds. Defaults to `30`.
    #[serde(default = "default_request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_bind_port() -> u16 {
    5279
}

fn default_max_concurrent_requests() -> usize {
    500
}

fn default_max_body_bytes() -> usize {
    2 * 1024 * 1024
}

fn default_request_timeout_seconds() -> u64 {
    30
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            bind_port: default_bind_port(),
            max_concurrent_requests: default_max_concurrent_requests(),
            max_body_bytes: default_max_body_bytes(),
            request_timeout_seconds: default_request_timeout_seconds(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackendsConfig {
    #[serde(default)]
    pub servers: Vec<Backend>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Request header carrying the user's auth token.
    #[serde(default = "default_token_header")]
    pub token_header: String,

    /// Fixed token to user id table. Used when no remote resolver is configured.
    #[serde(default)]
    pub static_tokens: HashMap<String, UserId>,

    /// Auth service that maps tokens to users. Takes precedence over `static_tokens`.
    #[serde(default)]
    pub remote_resolver_url: Option<String>,

    #[serde(default = "default_resolver_timeout_seconds")]
    pub remote_resolver_timeout_seconds: u64,

    /// How long resolved users are remembered. `0` disables the resolver cache.
    #[serde(default = "default_resolver_cache_ttl_seconds")]
    pub resolver_cache_ttl_seconds: u64,

    /// Per-method overrides on top of the built-in policy table.
    #[serde(default)]
    pub policies: HashMap<MethodMatcher, MethodPolicy>,
}

fn default_token_header() -> String {
    "X-Lbry-Auth-Token".to_string()
}

fn default_resolver_timeout_seconds() -> u64 {
    5
}

fn default_resolver_cache_ttl_seconds() -> u64 {
    60
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_header: default_token_header(),
            static_tokens: HashMap::new(),
            remote_resolver_url: None,
            remote_resolver_timeout_seconds: default_resolver_timeout_seconds(),
            resolver_cache_ttl_seconds: default_resolver_cache_ttl_seconds(),
            policies: HashMap::new(),
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn remote_resolver_timeout(&self) -> Duration {
        Duration::from_secs(self.remote_resolver_timeout_seconds)
    }

    #[must_use]
    pub fn resolver_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.resolver_cache_ttl_seconds)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HooksConfig {
    /// Built-in hook names, registered in this order.
    #[serde(default)]
    pub enabled: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `json` or `pretty`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: default_log_level(), format: default_log_format() }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub backends: BackendsConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub hooks: HooksConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// A missing file is not an error; defaults and the environment still apply. Use `__` as
    /// the separator for nested fields (e.g. `WALLETGATE__SERVER__BIND_PORT=8080`).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_builder = Config::builder()
            .set_default("server.bind_address", default_bind_address())?
            .set_default("server.bind_port", i64::from(default_bind_port()))?
            .set_default("server.request_timeout_seconds", 30)?
            .set_default("cache.enabled", true)?
            .set_default("metrics.enabled", true)?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("WALLETGATE").separator("__"))
            .build()?;

        config_builder.try_deserialize()
    }

    /// Loads `config/config.toml`, or the file named by `WALLETGATE_CONFIG`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = std::env::var("WALLETGATE_CONFIG")
            .unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed into a valid [`SocketAddr`].
    ///
    /// [`SocketAddr`]: std::net::SocketAddr
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.server.bind_address, self.server.bind_port)
            .parse()
            .map_err(|_| {
                format!(
                    "Invalid socket address: {}:{}",
                    self.server.bind_address, self.server.bind_port
                )
            })
    }

    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_seconds)
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// Checks include:
    /// - At least one backend, each with a unique name and an http(s) URL
    /// - Non-zero port, concurrency, body limit and timeout
    /// - Cache rules with usable TTLs
    /// - Known hook names and logging format
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.backends.servers.is_empty() {
            return Err("No backends configured".to_string());
        }

        let mut names = std::collections::HashSet::new();
        for backend in &self.backends.servers {
            if !names.insert(backend.name.as_str()) {
                return Err(format!("Duplicate backend name: {}", backend.name));
            }
            validate_http_url(&backend.url)
                .map_err(|e| format!("Invalid URL for backend {}: {e}", backend.name))?;
        }

        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }
        if self.server.max_concurrent_requests == 0 {
            return Err("Max concurrent requests must be greater than 0".to_string());
        }
        if self.server.max_body_bytes == 0 {
            return Err("Max body size must be greater than 0".to_string());
        }
        if self.server.request_timeout_seconds == 0 {
            return Err("Request timeout must be greater than 0".to_string());
        }

        self.cache.validate().map_err(|e| e.to_string())?;

        if self.auth.token_header.trim().is_empty() {
            return Err("Auth token header must not be empty".to_string());
        }
        if let Some(url) = &self.auth.remote_resolver_url {
            validate_http_url(url).map_err(|e| format!("Invalid remote resolver URL: {e}"))?;
        }

        if let Some(unknown) = self.hooks.enabled.iter().find(|h| !BUILTIN_HOOKS.contains(&h.as_str())) {
            return Err(format!("Unknown hook: {unknown}"));
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }
}

fn validate_http_url(raw: &str) -> Result<(), String> {
    let url = url::Url::parse(raw).map_err(|e| e.to_string())?;
    match url.scheme() {
        "http" | "https" if url.host().is_some() => Ok(()),
        "http" | "https" => Err(format!("{raw} has no host")),
        other => Err(format!("unsupported scheme '{other}'")),
    }
}

//! Configuration management for Gatekeeper.
//!
//! Configuration is loaded once at startup and passed explicitly into the
//! key resolver and the limiter engine. Layers, lowest precedence first:
//! built-in defaults, an optional YAML file, then `GATEKEEPER__*`
//! environment variables (`GATEKEEPER__RATE_LIMITING__IP_LIMIT=5`).

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{GatekeeperError, Result};

/// Main configuration for the Gatekeeper service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limiting: RateLimitingConfig,

    /// Counter store configuration
    #[serde(default)]
    pub store: StoreConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8080))
}

/// Rate limiting configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitingConfig {
    /// Requests admitted per window for IP-derived keys
    #[serde(default = "default_ip_limit")]
    pub ip_limit: u64,

    /// Requests admitted per window for token-derived keys
    #[serde(default = "default_token_limit")]
    pub token_limit: u64,

    /// Window length and block length, in seconds
    #[serde(default = "default_block_duration")]
    pub block_duration_secs: u64,

    /// Header carrying the API token
    #[serde(default = "default_token_header")]
    pub token_header: String,

    /// Take the client address from `X-Forwarded-For` when present
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for RateLimitingConfig {
    fn default() -> Self {
        Self {
            ip_limit: default_ip_limit(),
            token_limit: default_token_limit(),
            block_duration_secs: default_block_duration(),
            token_header: default_token_header(),
            trust_forwarded_for: false,
        }
    }
}

impl RateLimitingConfig {
    /// The block duration as a [`Duration`].
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs(self.block_duration_secs)
    }
}

fn default_ip_limit() -> u64 {
    5
}

fn default_token_limit() -> u64 {
    10
}

fn default_block_duration() -> u64 {
    300
}

fn default_token_header() -> String {
    "API_KEY".to_string()
}

/// Which counter store backs the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Redis,
    Memory,
}

/// Counter store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_backend")]
    pub backend: StoreBackend,

    /// Redis connection URL, required for the redis backend
    #[serde(default = "default_redis_url")]
    pub redis_url: Option<String>,

    /// Deadline for a single store round trip, in milliseconds. Zero disables it.
    #[serde(default = "default_operation_timeout")]
    pub operation_timeout_ms: u64,

    /// How often the memory backend drops expired entries
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            redis_url: default_redis_url(),
            operation_timeout_ms: default_operation_timeout(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

impl StoreConfig {
    /// The per-operation deadline, if one is configured.
    pub fn operation_timeout(&self) -> Option<Duration> {
        (self.operation_timeout_ms > 0).then(|| Duration::from_millis(self.operation_timeout_ms))
    }
}

fn default_backend() -> StoreBackend {
    StoreBackend::Redis
}

fn default_redis_url() -> Option<String> {
    Some("redis://127.0.0.1:6379".to_string())
}

fn default_operation_timeout() -> u64 {
    500
}

fn default_purge_interval() -> u64 {
    60
}

impl GatekeeperConfig {
    /// Load configuration from defaults, an optional YAML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(
                ::config::File::from(path)
                    .format(::config::FileFormat::Yaml)
                    .required(true),
            );
        }

        let config: GatekeeperConfig = builder
            .add_source(
                ::config::Environment::with_prefix("GATEKEEPER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GatekeeperConfig =
            serde_yaml::from_str(yaml).map_err(|e| GatekeeperError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the limiter cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.rate_limiting.block_duration_secs == 0 {
            return Err(GatekeeperError::Config(
                "rate_limiting.block_duration_secs must be greater than zero".to_string(),
            ));
        }

        if self.rate_limiting.ip_limit == 0 || self.rate_limiting.token_limit == 0 {
            return Err(GatekeeperError::Config(
                "rate_limiting.ip_limit and rate_limiting.token_limit must be at least 1".to_string(),
            ));
        }

        if axum::http::HeaderName::from_bytes(self.rate_limiting.token_header.as_bytes()).is_err() {
            return Err(GatekeeperError::Config(format!(
                "rate_limiting.token_header '{}' is not a valid header name",
                self.rate_limiting.token_header
            )));
        }

        if self.store.backend == StoreBackend::Redis
            && self.store.redis_url.as_deref().map_or(true, str::is_empty)
        {
            return Err(GatekeeperError::Config(
                "store.redis_url is required for the redis backend".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GatekeeperConfig::default();

        assert_eq!(config.rate_limiting.ip_limit, 5);
        assert_eq!(config.rate_limiting.token_limit, 10);
        assert_eq!(config.rate_limiting.block_duration(), Duration::from_secs(300));
        assert_eq!(config.rate_limiting.token_header, "API_KEY");
        assert_eq!(config.store.backend, StoreBackend::Redis);
        assert_eq!(config.store.operation_timeout(), Some(Duration::from_millis(500)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
rate_limiting:
  ip_limit: 2
store:
  backend: memory
"#;
        let config = GatekeeperConfig::from_yaml(yaml).unwrap();

        assert_eq!(config.rate_limiting.ip_limit, 2);
        assert_eq!(config.rate_limiting.token_limit, 10);
        assert_eq!(config.store.backend, StoreBackend::Memory);
        assert_eq!(config.server.listen_addr, default_listen_addr());
    }

    #[test]
    fn test_yaml_round_trip() {
        let mut config = GatekeeperConfig::default();
        config.server.listen_addr = "127.0.0.1:9000".parse().unwrap();
        config.rate_limiting.ip_limit = 7;
        config.rate_limiting.trust_forwarded_for = true;
        config.store.backend = StoreBackend::Memory;
        config.store.redis_url = None;

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("backend: memory"));

        let parsed = GatekeeperConfig::from_yaml(&yaml).unwrap();
        assert_eq!(parsed.server.listen_addr, config.server.listen_addr);
        assert_eq!(parsed.rate_limiting.ip_limit, 7);
        assert!(parsed.rate_limiting.trust_forwarded_for);
        assert_eq!(parsed.store.backend, StoreBackend::Memory);
        assert_eq!(parsed.store.redis_url, None);
    }

    #[test]
    fn test_zero_block_duration_rejected() {
        let yaml = r#"
rate_limiting:
  block_duration_secs: 0
"#;
        let result = GatekeeperConfig::from_yaml(yaml);
        assert!(matches!(result, Err(GatekeeperError::Config(_))));
    }

    #[test]
    fn test_zero_limit_rejected() {
        let mut config = GatekeeperConfig::default();
        config.rate_limiting.token_limit = 0;

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_token_header_rejected() {
        let mut config = GatekeeperConfig::default();
        config.rate_limiting.token_header = "bad header".to_string();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_redis_backend_requires_url() {
        let mut config = GatekeeperConfig::default();
        config.store.redis_url = None;
        assert!(config.validate().is_err());

        config.store.backend = StoreBackend::Memory;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_operation_timeout_disables_deadline() {
        let mut config = GatekeeperConfig::default();
        config.store.operation_timeout_ms = 0;

        assert_eq!(config.store.operation_timeout(), None);
    }
}

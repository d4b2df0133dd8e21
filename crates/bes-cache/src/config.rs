//! Configuration loading and management

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    /// Upstream BES servers to register at startup
    #[serde(default)]
    pub upstreams: Vec<UpstreamConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Default TTL in seconds for upstreams without their own
    #[serde(default = "default_max_age")]
    pub default_max_age: u64,
    /// Absolute ceiling on any entry's TTL after extensions
    #[serde(default = "default_max_lifetime")]
    pub max_lifetime: u64,
    /// Seconds between sweeper passes; zero falls back to the default
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval: u64,
    /// Pre-warm every upstream's core types at startup
    #[serde(default)]
    pub populate_on_start: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_max_age: default_max_age(),
            max_lifetime: default_max_lifetime(),
            sweep_interval: default_sweep_interval(),
            populate_on_start: false,
        }
    }
}

/// Upstream BES server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    /// URL of the upstream BES server (scheme, host and port are kept)
    pub url: String,
    /// Username for HTTP Basic authentication
    pub username: String,
    /// Password for HTTP Basic authentication
    pub password: String,
    /// Connection pool size for this upstream
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
    /// Base TTL in seconds; zero inherits the cache default
    #[serde(default)]
    pub max_age: u64,
    /// Skip TLS certificate verification for this upstream
    #[serde(default)]
    pub skip_tls_verify: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_max_age() -> u64 {
    300
}

fn default_max_lifetime() -> u64 {
    86_400
}

fn default_sweep_interval() -> u64 {
    15
}

fn default_pool_size() -> usize {
    5
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &str) -> Result<Self> {
        let config_path = Path::new(path);

        if !config_path.exists() {
            info!("Config file not found at {}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", path))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path))?;

        config.validate()?;

        info!("Loaded configuration from {}", path);
        Ok(config)
    }

    /// Reject configurations the cache cannot honor
    fn validate(&self) -> Result<()> {
        if self.cache.default_max_age == 0 {
            anyhow::bail!("cache.default_max_age must be greater than zero");
        }
        if self.cache.max_lifetime <= self.cache.default_max_age {
            anyhow::bail!(
                "cache.max_lifetime ({}) must exceed cache.default_max_age ({})",
                self.cache.max_lifetime,
                self.cache.default_max_age
            );
        }
        for upstream in &self.upstreams {
            if upstream.pool_size == 0 {
                anyhow::bail!("upstream {} has a zero pool_size", upstream.url);
            }
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            cache: CacheConfig::default(),
            upstreams: vec![],
            logging: LoggingConfig::default(),
        }
    }
}

//! Configuration management

use queuestack_queue::QueueServiceConfig;
use serde::Deserialize;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub queue: QueueConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_host")]
    pub host: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
        }
    }
}

/// Queue engine limits
#[derive(Debug, Deserialize)]
pub struct QueueConfig {
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_max_message_bytes")]
    pub max_message_bytes: usize,

    #[serde(default = "default_visibility_timeout_secs")]
    pub default_visibility_timeout_secs: u64,

    #[serde(default = "default_max_visibility_timeout_secs")]
    pub max_visibility_timeout_secs: u64,

    /// Unset means messages never expire
    #[serde(default)]
    pub default_message_ttl_secs: Option<u64>,

    #[serde(default)]
    pub strict_create: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_message_bytes: default_max_message_bytes(),
            default_visibility_timeout_secs: default_visibility_timeout_secs(),
            max_visibility_timeout_secs: default_max_visibility_timeout_secs(),
            default_message_ttl_secs: None,
            strict_create: false,
        }
    }
}

impl From<&QueueConfig> for QueueServiceConfig {
    fn from(config: &QueueConfig) -> Self {
        Self {
            max_batch_size: config.max_batch_size,
            max_message_bytes: config.max_message_bytes,
            default_visibility_timeout: Duration::from_secs(config.default_visibility_timeout_secs),
            max_visibility_timeout: Duration::from_secs(config.max_visibility_timeout_secs),
            default_message_ttl: config.default_message_ttl_secs.map(Duration::from_secs),
            strict_create: config.strict_create,
        }
    }
}

fn default_port() -> u16 {
    4577
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_max_batch_size() -> usize {
    32
}

fn default_max_message_bytes() -> usize {
    64 * 1024
}

fn default_visibility_timeout_secs() -> u64 {
    30
}

fn default_max_visibility_timeout_secs() -> u64 {
    7 * 24 * 60 * 60
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// `path` defaults to `queuestack.{toml,yaml,json}` in the working directory;
    /// `QUEUESTACK_QUEUE__STRICT_CREATE=true` style variables override it.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::with_name(path).required(true),
            None => config::File::with_name("queuestack").required(false),
        };

        let config = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("QUEUESTACK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize::<Config>()?)
    }

    #[cfg(test)]
    fn from_toml(toml: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        Ok(config.try_deserialize::<Config>()?)
    }
}

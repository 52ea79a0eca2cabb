//! Configuration Module
//!
//! Provides TOML-based configuration for meshmq with support for:
//! - Node identity (broker id)
//! - Remote store key layout
//! - Inner cache and cluster toggles
//! - Environment variable overrides (MESHMQ__* prefix)

use std::path::Path;

use config::{Environment, File, FileFormat};
use regex::Regex;
use serde::Deserialize;

use crate::cluster::CodecKind;


/// Expand `${NAME}` references in raw TOML content from the process
/// environment before parsing. A reference may carry a fallback,
/// `${NAME:-fallback}`, used when the variable is unset; without one an
/// unset variable expands to the empty string.
fn expand_env_refs(raw: &str) -> String {
    let pattern = Regex::new(r"\$\{([^}]+)\}").unwrap();
    pattern
        .replace_all(raw, |caps: &regex::Captures| {
            let reference = &caps[1];
            let (name, fallback) = match reference.split_once(":-") {
                Some((name, fallback)) => (name, fallback),
                None => (reference, ""),
            };
            std::env::var(name).unwrap_or_else(|_| fallback.to_string())
        })
        .into_owned()
}

/// Failure to produce a usable configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// The config file exists but could not be read
    Read(std::io::Error),
    /// The TOML source did not parse
    Toml(toml::de::Error),
    /// Layered sources could not be merged or deserialized
    Merge(config::ConfigError),
    /// The parsed values fail a semantic check
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read(e) => write!(f, "cannot read config file: {}", e),
            ConfigError::Toml(e) => write!(f, "malformed TOML: {}", e),
            ConfigError::Merge(e) => write!(f, "cannot assemble configuration: {}", e),
            ConfigError::Invalid(reason) => write!(f, "invalid configuration: {}", reason),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read(e) => Some(e),
            ConfigError::Toml(e) => Some(e),
            ConfigError::Merge(e) => Some(e),
            ConfigError::Invalid(_) => None,
        }
    }
}

impl From<toml::de::Error> for ConfigError {
    fn from(e: toml::de::Error) -> Self {
        ConfigError::Toml(e)
    }
}

impl From<config::ConfigError> for ConfigError {
    fn from(e: config::ConfigError) -> Self {
        ConfigError::Merge(e)
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub log: LogConfig,
    /// Node identifier, unique per broker in the cluster
    pub broker_id: u32,
    /// Remote store key layout
    pub store: StoreConfig,
    /// Inner cache configuration
    pub cache: CacheConfig,
    /// Cluster configuration
    pub cluster: ClusterConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level: error, warn, info, debug, trace
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Key layout of subscription state in the remote store
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Key of the global set of durable topic filters
    #[serde(default = "default_topic_set_key")]
    pub topic_set_key: String,
    /// Prefix of per-topic hashes (clientId -> qos)
    #[serde(default = "default_topic_prefix")]
    pub topic_prefix: String,
    /// Prefix of per-client topic sets
    #[serde(default = "default_client_topics_prefix")]
    pub client_topics_prefix: String,
}

fn default_topic_set_key() -> String {
    "meshmq:topics".to_string()
}

fn default_topic_prefix() -> String {
    "meshmq:topic:".to_string()
}

fn default_client_topics_prefix() -> String {
    "meshmq:client:topics:".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            topic_set_key: default_topic_set_key(),
            topic_prefix: default_topic_prefix(),
            client_topics_prefix: default_client_topics_prefix(),
        }
    }
}

/// Inner cache configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct CacheConfig {
    /// Mirror the persistent index locally to keep the publish hot path off
    /// the remote store
    pub enabled: bool,
}

/// Cluster configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    /// Whether subscription events are exchanged with peers
    pub enabled: bool,
    /// Bus channel carrying subscription events
    #[serde(default = "default_channel")]
    pub channel: String,
    /// Wire format for cluster events (must match across the cluster)
    #[serde(default)]
    pub codec: CodecKind,
}

fn default_channel() -> String {
    "meshmq:sub-unsub".to_string()
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            channel: default_channel(),
            codec: CodecKind::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, layered with the process
    /// environment.
    ///
    /// Layering, lowest to highest precedence:
    /// 1. Struct defaults for anything left unspecified
    /// 2. The TOML file, after `${VAR}` / `${VAR:-fallback}` expansion
    /// 3. `MESHMQ__`-prefixed environment variables, with double
    ///    underscores separating nested keys (`MESHMQ__CLUSTER__ENABLED=true`,
    ///    `MESHMQ__STORE__TOPIC_PREFIX=mq:topic:`)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut sources = config::Config::builder();

        // A missing file is fine: containerized deployments often configure
        // through the environment alone.
        let path = path.as_ref();
        if path.is_file() {
            let raw = std::fs::read_to_string(path).map_err(ConfigError::Read)?;
            sources =
                sources.add_source(File::from_str(&expand_env_refs(&raw), FileFormat::Toml));
        }

        let merged = sources
            .add_source(
                Environment::with_prefix("MESHMQ")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let parsed: Config = merged.try_deserialize()?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Build configuration purely from `MESHMQ__*` environment variables,
    /// with every file-level value left at its default.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load("")
    }

    /// Parse a TOML string directly, bypassing the file and environment
    /// layering (primarily for tests).
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let parsed: Config = toml::from_str(source)?;
        parsed.validate()?;
        Ok(parsed)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.topic_set_key.is_empty() {
            return Err(ConfigError::Invalid(
                "store.topic_set_key cannot be empty".to_string(),
            ));
        }
        if self.store.topic_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "store.topic_prefix cannot be empty".to_string(),
            ));
        }
        if self.store.client_topics_prefix.is_empty() {
            return Err(ConfigError::Invalid(
                "store.client_topics_prefix cannot be empty".to_string(),
            ));
        }
        if self.cluster.enabled && self.cluster.channel.is_empty() {
            return Err(ConfigError::Invalid(
                "cluster.channel cannot be empty when clustering is enabled".to_string(),
            ));
        }
        Ok(())
    }
}

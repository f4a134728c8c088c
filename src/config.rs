//! Configuration module for cardlink.
//!
//! Loads configuration from TOML files with environment variable
//! substitution, then applies a small set of environment overrides.
//!
//! # Example
//!
//! ```toml
//! [server]
//! port = 8080
//!
//! [redirect]
//! base_url = "${CARDLINK_BASE_URL}"
//!
//! [store]
//! backend = "redis"
//! url = "${REDIS_URL}"
//! lookup_timeout_ms = 250
//!
//! [sink]
//! kind = "redis"
//! stream = "cardlink:taps"
//! ```
//!
//! # Environment overrides
//!
//! - `CARDLINK_BASE_URL`: `redirect.base_url`
//! - `REDIS_URL`: `store.url`
//! - `PORT`: `server.port`

use crate::dispatch::DEFAULT_ROUTE_TAG;
use crate::emitter::EmitterConfig;
use crate::sinks::{LogSink, RedisStreamSink, TapSink, WebhookSink};
use crate::store::{CardStore, MemoryCardStore, RedisCardStore, CARD_KEY_PREFIX};
use deadpool_redis::{Pool, Runtime};
use regex::Regex;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Failed to create Redis pool: {0}")]
    RedisPool(String),
}

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct CardlinkConfig {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub redirect: RedirectConfig,

    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub sink: SinkConfig,

    #[serde(default)]
    pub emitter: EmitterSettings,
}

/// Server configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Where redirects point
#[derive(Debug, Deserialize, Clone)]
pub struct RedirectConfig {
    /// Origin prefixed to every destination; trailing slashes are stripped
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// First path segment of short links
    #[serde(default = "default_route_tag")]
    pub route_tag: String,
}

impl Default for RedirectConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            route_tag: default_route_tag(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_route_tag() -> String {
    DEFAULT_ROUTE_TAG.to_string()
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    Memory,
}

/// Card state store configuration
#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,

    #[serde(default = "default_redis_url")]
    pub url: String,

    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,

    #[serde(default = "default_lookup_timeout_ms")]
    pub lookup_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
            lookup_timeout_ms: default_lookup_timeout_ms(),
        }
    }
}

impl StoreConfig {
    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_millis(self.lookup_timeout_ms)
    }
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    CARD_KEY_PREFIX.to_string()
}

fn default_lookup_timeout_ms() -> u64 {
    250
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    #[default]
    Log,
    Redis,
    Webhook,
}

/// Tap event sink configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SinkConfig {
    #[serde(default)]
    pub kind: SinkKind,

    /// Stream name for the redis sink
    #[serde(default = "default_stream")]
    pub stream: String,

    /// Approximate stream cap for the redis sink
    #[serde(default = "default_max_len")]
    pub max_len: usize,

    /// Redis URL for the redis sink; shares the store pool when unset
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Endpoint for the webhook sink
    #[serde(default)]
    pub url: Option<String>,

    #[serde(default)]
    pub bearer_token: Option<String>,

    #[serde(default = "default_sink_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::default(),
            stream: default_stream(),
            max_len: default_max_len(),
            redis_url: None,
            url: None,
            bearer_token: None,
            timeout_ms: default_sink_timeout_ms(),
        }
    }
}

fn default_stream() -> String {
    crate::TAP_STREAM_NAME.to_string()
}

fn default_max_len() -> usize {
    100_000
}

fn default_sink_timeout_ms() -> u64 {
    2000
}

/// Background emission settings
#[derive(Debug, Deserialize, Clone)]
pub struct EmitterSettings {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,

    #[serde(default = "default_attempt_timeout_ms")]
    pub attempt_timeout_ms: u64,

    #[serde(default = "default_drain_timeout_ms")]
    pub drain_timeout_ms: u64,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            max_in_flight: default_max_in_flight(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            drain_timeout_ms: default_drain_timeout_ms(),
        }
    }
}

impl EmitterSettings {
    pub fn emitter_config(&self) -> EmitterConfig {
        EmitterConfig {
            queue_capacity: self.queue_capacity,
            max_in_flight: self.max_in_flight,
            attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
        }
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

fn default_queue_capacity() -> usize {
    crate::emitter::DEFAULT_QUEUE_CAPACITY
}

fn default_max_in_flight() -> usize {
    crate::emitter::DEFAULT_MAX_IN_FLIGHT
}

fn default_attempt_timeout_ms() -> u64 {
    2000
}

fn default_drain_timeout_ms() -> u64 {
    5000
}

/// Long-lived clients built once at startup.
pub struct Services {
    pub store: Arc<dyn CardStore>,
    pub sink: Arc<dyn TapSink>,
}

impl CardlinkConfig {
    /// Load configuration from `CARDLINK_CONFIG` (default
    /// `config/cardlink.toml`) and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            env::var("CARDLINK_CONFIG").unwrap_or_else(|_| "config/cardlink.toml".to_string());

        let mut config = Self::read(&config_path)?;
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;

        info!(
            base_url = %config.redirect.base_url,
            route_tag = %config.redirect.route_tag,
            store = ?config.store.backend,
            sink = ?config.sink.kind,
            "Configuration loaded"
        );

        Ok(config)
    }

    /// Load configuration from a specific path without environment overrides.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::read(path)?;
        config.validate()?;
        Ok(config)
    }

    fn read<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        if !path.exists() {
            info!(
                path = %path.display(),
                "Config file not found, using defaults"
            );
            return Ok(Self::default());
        }

        info!(path = %path.display(), "Loading configuration");

        let content = fs::read_to_string(path)?;
        let content = substitute_env_vars(&content);

        debug!("Parsing TOML configuration");
        Ok(toml::from_str(&content)?)
    }

    /// Apply `CARDLINK_BASE_URL`, `REDIS_URL` and `PORT` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = lookup("CARDLINK_BASE_URL") {
            self.redirect.base_url = base_url;
        }

        if let Some(redis_url) = lookup("REDIS_URL") {
            self.store.url = redis_url;
        }

        if let Some(port) = lookup("PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!(port = %port, "Ignoring invalid PORT"),
            }
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let base_url = &self.redirect.base_url;
        if base_url.contains("${") {
            return Err(ConfigError::ValidationError(format!(
                "redirect.base_url contains an unsubstituted variable: {}",
                base_url
            )));
        }
        if !base_url.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ConfigError::ValidationError(
                "redirect.base_url must be printable ASCII without spaces".to_string(),
            ));
        }
        let Some(rest) = base_url
            .strip_prefix("https://")
            .or_else(|| base_url.strip_prefix("http://"))
        else {
            return Err(ConfigError::ValidationError(
                "redirect.base_url must start with http:// or https://".to_string(),
            ));
        };
        if rest.split('/').next().unwrap_or_default().is_empty() {
            return Err(ConfigError::ValidationError(
                "redirect.base_url has no host".to_string(),
            ));
        }

        let tag = &self.redirect.route_tag;
        if tag.is_empty() || tag.contains('/') {
            return Err(ConfigError::ValidationError(
                "redirect.route_tag must be a single non-empty path segment".to_string(),
            ));
        }

        if self.store.lookup_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "store.lookup_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.emitter.queue_capacity == 0 || self.emitter.max_in_flight == 0 {
            return Err(ConfigError::ValidationError(
                "emitter.queue_capacity and emitter.max_in_flight must be greater than zero"
                    .to_string(),
            ));
        }

        if self.emitter.attempt_timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "emitter.attempt_timeout_ms must be greater than zero".to_string(),
            ));
        }

        if self.sink.kind == SinkKind::Webhook {
            match self.sink.url.as_deref() {
                None | Some("") => {
                    return Err(ConfigError::ValidationError(
                        "sink.url is required for the webhook sink".to_string(),
                    ));
                }
                Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => {
                    return Err(ConfigError::ValidationError(
                        "sink.url must start with http:// or https://".to_string(),
                    ));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Build the store and sink clients.
    ///
    /// A redis sink without its own `redis_url` shares the store's pool
    /// when the store is also Redis.
    pub fn build_services(&self) -> Result<Services, ConfigError> {
        let mut shared_pool: Option<Pool> = None;

        let store: Arc<dyn CardStore> = match self.store.backend {
            StoreBackend::Redis => {
                let pool = create_pool(&self.store.url)?;
                shared_pool = Some(pool.clone());
                Arc::new(RedisCardStore::new(pool).with_key_prefix(&self.store.key_prefix))
            }
            StoreBackend::Memory => {
                warn!("Using in-memory card store; every card will route to onboarding");
                Arc::new(MemoryCardStore::new())
            }
        };

        let sink: Arc<dyn TapSink> = match self.sink.kind {
            SinkKind::Log => Arc::new(LogSink::new()),
            SinkKind::Redis => {
                let pool = match (&self.sink.redis_url, shared_pool) {
                    (Some(url), _) => create_pool(url)?,
                    (None, Some(pool)) => pool,
                    (None, None) => create_pool(&self.store.url)?,
                };
                Arc::new(
                    RedisStreamSink::new(pool)
                        .with_stream(&self.sink.stream)
                        .with_max_len(self.sink.max_len),
                )
            }
            SinkKind::Webhook => {
                let url = self.sink.url.as_deref().ok_or_else(|| {
                    ConfigError::ValidationError("sink.url is required for the webhook sink".into())
                })?;
                let mut sink = WebhookSink::new(url)
                    .with_timeout(Duration::from_millis(self.sink.timeout_ms));
                if let Some(token) = &self.sink.bearer_token {
                    sink = sink.with_bearer_token(token);
                }
                Arc::new(sink)
            }
        };

        Ok(Services { store, sink })
    }
}

fn create_pool(url: &str) -> Result<Pool, ConfigError> {
    deadpool_redis::Config::from_url(url)
        .create_pool(Some(Runtime::Tokio1))
        .map_err(|e| ConfigError::RedisPool(e.to_string()))
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var pattern")
    })
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(content: &str) -> String {
    env_var_pattern()
        .replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            match env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    debug!(var = %var_name, "Environment variable not set, keeping placeholder");
                    caps[0].to_string()
                }
            }
        })
        .to_string()
}

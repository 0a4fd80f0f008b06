//! Watcher configuration
//!
//! Configuration is loaded once from a TOML file at startup and is immutable
//! for the lifetime of the session; picking up changed settings requires a
//! restart. Credentials are never stored in the file: the config names the
//! environment variables they are read from at connect time.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

/// Top-level configuration for a watcher session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatcherConfig {
    pub watcher: WatcherSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub retry: RetrySection,
}

/// Identity of this watcher instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WatcherSection {
    /// Watcher identifier (must match [a-zA-Z0-9._-]+). Used as the base of
    /// the MQTT client id.
    pub id: String,
}

/// Broker connection settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MqttSection {
    /// Broker URL with scheme and optional port, e.g. `mqtt://host:1883`
    /// or `mqtts://host` for TLS.
    pub broker_url: String,
    /// Environment variable containing the username
    pub username_env: Option<String>,
    /// Environment variable containing the password
    pub password_env: Option<String>,
    /// Topic filter to subscribe to
    pub topic: String,
    /// QoS level for the subscription (0, 1 or 2; default 0)
    #[serde(default)]
    pub qos: u8,
    /// Keep-alive interval in seconds (default: 60)
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
}

fn default_keep_alive_secs() -> u64 {
    60
}

/// Retry behavior for failed connect and subscribe attempts.
///
/// The delay is fixed: no backoff growth. `max_attempts = None` means retry
/// forever, which is the intended mode for a background watcher; the cap
/// exists so tests and cautious deployments can bound the loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrySection {
    /// Fixed delay between retry attempts in milliseconds (default: 5000)
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
    /// Maximum retry attempts per failure kind (None = unlimited)
    pub max_attempts: Option<u32>,
}

fn default_retry_delay_ms() -> u64 {
    5000
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            delay_ms: default_retry_delay_ms(),
            max_attempts: None,
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid watcher ID format: {0}")]
    InvalidWatcherId(String),
    #[error("Invalid broker URL: {0}")]
    InvalidBrokerUrl(String),
    #[error("Invalid QoS level {0}, expected 0, 1 or 2")]
    InvalidQos(u8),
    #[error("Retry delay must be greater than zero")]
    InvalidRetryDelay,
    #[error("Topic filter must not be empty")]
    EmptyTopic,
}

impl WatcherConfig {
    /// Load configuration from a TOML file and validate it.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: WatcherConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field-level constraints that TOML parsing cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_watcher_id(&self.watcher.id)?;

        Url::parse(&self.mqtt.broker_url)
            .map_err(|_| ConfigError::InvalidBrokerUrl(self.mqtt.broker_url.clone()))?;

        if self.mqtt.topic.is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        if self.mqtt.qos > 2 {
            return Err(ConfigError::InvalidQos(self.mqtt.qos));
        }
        if self.retry.delay_ms == 0 {
            return Err(ConfigError::InvalidRetryDelay);
        }
        Ok(())
    }
}

impl MqttSection {
    /// Username resolved from the configured environment variable, if any.
    pub fn username(&self) -> Option<String> {
        resolve_env(self.username_env.as_ref())
    }

    /// Password resolved from the configured environment variable, if any.
    pub fn password(&self) -> Option<String> {
        resolve_env(self.password_env.as_ref())
    }
}

fn resolve_env(env_var_name: Option<&String>) -> Option<String> {
    env_var_name.and_then(|name| std::env::var(name).ok())
}

fn validate_watcher_id(id: &str) -> Result<(), ConfigError> {
    let valid_chars = id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-');

    if id.is_empty() || !valid_chars {
        return Err(ConfigError::InvalidWatcherId(format!(
            "Watcher ID '{id}' must match pattern [a-zA-Z0-9._-]+"
        )));
    }

    Ok(())
}

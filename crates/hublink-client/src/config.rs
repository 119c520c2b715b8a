//! Hub client configuration

use hublink_proto::DEFAULT_HUB_PATH;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Connection supervisor configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Upper bound for the reconnect backoff (before jitter)
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    /// How long a healthy connection may live before it is recycled
    #[serde(with = "duration_secs")]
    pub forced_reconnect_interval: Duration,
    /// Hub path appended to the service URL
    pub hub_path: String,
}

/// Helper module for serializing Duration as (fractional) seconds
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_f64(duration.as_secs_f64())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_delay: Duration::from_secs(256),
            forced_reconnect_interval: Duration::from_secs(86400),
            hub_path: DEFAULT_HUB_PATH.to_string(),
        }
    }
}

impl HubConfig {
    pub fn builder() -> HubConfigBuilder {
        HubConfigBuilder::default()
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: HubConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Full hub URL for a service base URL
    pub fn endpoint(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        if self.hub_path.starts_with('/') {
            format!("{}{}", base, self.hub_path)
        } else {
            format!("{}/{}", base, self.hub_path)
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_delay.is_zero() {
            return Err(ConfigError::Invalid("max_delay must be positive".to_string()));
        }
        if self.forced_reconnect_interval.is_zero() {
            return Err(ConfigError::Invalid(
                "forced_reconnect_interval must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for HubConfig
#[derive(Default)]
pub struct HubConfigBuilder {
    config: HubConfig,
}

impl HubConfigBuilder {
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.config.max_delay = delay;
        self
    }

    pub fn forced_reconnect_interval(mut self, interval: Duration) -> Self {
        self.config.forced_reconnect_interval = interval;
        self
    }

    pub fn hub_path(mut self, path: impl Into<String>) -> Self {
        self.config.hub_path = path.into();
        self
    }

    pub fn build(self) -> Result<HubConfig, ConfigError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

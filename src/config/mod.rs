//! Configuration management
//!
//! Settings come from an optional TOML file overlaid with `SOFTPHONE__`
//! environment variables, e.g. `SOFTPHONE__TIMERS__KEEPALIVE_INTERVAL_SECS=30`.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Accepted range for the ICE readiness wait
pub const ICE_READY_TIMEOUT_RANGE_MS: (u64, u64) = (500, 5000);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub account: AccountConfig,
    pub lines: LineConfig,
    pub timers: TimerConfig,
    pub connectivity: ConnectivityConfig,
    pub presence: PresenceConfig,
}

/// Credentials and endpoints handed to the transport on registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    pub server_uri: String,
    pub websocket_uri: String,
    pub username: String,
    pub password: String,
    pub realm: String,
    pub display_name: Option<String>,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            server_uri: "sip:pbx.local".to_string(),
            websocket_uri: "wss://pbx.local:8089/ws".to_string(),
            username: "1000".to_string(),
            password: String::new(),
            realm: "pbx.local".to_string(),
            display_name: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineConfig {
    /// Terminated sessions kept for linkage lookups and call history
    pub history_limit: usize,
}

impl Default for LineConfig {
    fn default() -> Self {
        Self { history_limit: 20 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimerConfig {
    pub keepalive_interval_secs: u64,
    pub keepalive_failure_threshold: u32,
    /// Extra keep-alive misses tolerated while the internet itself is down
    pub keepalive_degraded_grace: u32,
    pub reconnect_max_attempts: u32,
    pub reconnect_delay_secs: u64,
    pub ice_ready_timeout_ms: u64,
    /// Place the call anyway when ICE gathering runs out of time
    pub proceed_on_ice_timeout: bool,
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            keepalive_interval_secs: 90,
            keepalive_failure_threshold: 1,
            keepalive_degraded_grace: 3,
            reconnect_max_attempts: 5,
            reconnect_delay_secs: 5,
            ice_ready_timeout_ms: 2000,
            proceed_on_ice_timeout: true,
        }
    }
}

impl TimerConfig {
    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn ice_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.ice_ready_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    pub enabled: bool,
    pub internet_probe_urls: Vec<String>,
    pub signaling_probe_urls: Vec<String>,
    pub probe_timeout_ms: u64,
    pub healthy_interval_secs: u64,
    pub degraded_interval_secs: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            internet_probe_urls: vec![
                "https://www.google.com/generate_204".to_string(),
                "https://cloudflare.com/cdn-cgi/trace".to_string(),
            ],
            signaling_probe_urls: vec!["wss://pbx.local:8089/ws".to_string()],
            probe_timeout_ms: 3000,
            healthy_interval_secs: 30,
            degraded_interval_secs: 5,
        }
    }
}

impl ConnectivityConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn healthy_interval(&self) -> Duration {
        Duration::from_secs(self.healthy_interval_secs)
    }

    pub fn degraded_interval(&self) -> Duration {
        Duration::from_secs(self.degraded_interval_secs)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceConfig {
    /// Extensions monitored once registered
    pub extensions: Vec<MonitoredExtension>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoredExtension {
    pub extension: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Config {
    /// Load from `path` (optional on disk) and the environment
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("SOFTPHONE")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without touching the environment
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml))
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let timers = &self.timers;
        if timers.keepalive_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "timers.keepalive_interval_secs must be positive".to_string(),
            ));
        }
        if timers.keepalive_failure_threshold == 0 {
            return Err(ConfigError::Invalid(
                "timers.keepalive_failure_threshold must be at least 1".to_string(),
            ));
        }
        let (min, max) = ICE_READY_TIMEOUT_RANGE_MS;
        if !(min..=max).contains(&timers.ice_ready_timeout_ms) {
            return Err(ConfigError::Invalid(format!(
                "timers.ice_ready_timeout_ms must be within {}..={} ms, got {}",
                min, max, timers.ice_ready_timeout_ms
            )));
        }

        let connectivity = &self.connectivity;
        if connectivity.enabled {
            if connectivity.internet_probe_urls.is_empty()
                || connectivity.signaling_probe_urls.is_empty()
            {
                return Err(ConfigError::Invalid(
                    "connectivity probe URL lists must not be empty".to_string(),
                ));
            }
            if connectivity.probe_timeout_ms == 0
                || connectivity.healthy_interval_secs == 0
                || connectivity.degraded_interval_secs == 0
            {
                return Err(ConfigError::Invalid(
                    "connectivity timers must be positive".to_string(),
                ));
            }
        }

        if self
            .presence
            .extensions
            .iter()
            .any(|e| e.extension.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "presence.extensions entries need an extension".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.timers.keepalive_interval(), Duration::from_secs(90));
        assert_eq!(config.timers.ice_ready_timeout(), Duration::from_millis(2000));
        assert_eq!(config.lines.history_limit, 20);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [account]
            username = "2001"

            [timers]
            keepalive_failure_threshold = 3

            [[presence.extensions]]
            extension = "101"
            display_name = "Reception"
            "#,
        )
        .unwrap();

        assert_eq!(config.account.username, "2001");
        assert_eq!(config.timers.keepalive_failure_threshold, 3);
        assert_eq!(config.timers.reconnect_max_attempts, 5);
        assert_eq!(config.presence.extensions.len(), 1);
        assert_eq!(
            config.presence.extensions[0].display_name.as_deref(),
            Some("Reception")
        );
    }

    #[test]
    fn test_ice_timeout_range() {
        let mut config = Config::default();
        config.timers.ice_ready_timeout_ms = 400;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));

        config.timers.ice_ready_timeout_ms = 5000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = Config::default();
        config.timers.keepalive_failure_threshold = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_probe_list_rejected_only_when_enabled() {
        let mut config = Config::default();
        config.connectivity.signaling_probe_urls.clear();
        assert!(config.validate().is_err());

        config.connectivity.enabled = false;
        assert!(config.validate().is_ok());
    }
}

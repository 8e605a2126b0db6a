//! Client configuration.
//!
//! [`ClientConfig`] is passed explicitly to every component that needs it;
//! nothing reads settings from process-wide state. Device identity lives
//! here too, generated by the host and handed in.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::protocol_constants::{DEFAULT_DEVICE_ID, DEFAULT_HTTP_PORT, DEFAULT_SLIMPROTO_PORT};
use crate::utils::format_mac;

/// Invalid configuration values.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Identity the player announces to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerIdentity {
    /// MAC-like id; the server keys all player state on it.
    pub mac: [u8; 6],
    pub uuid: Uuid,
    pub device_id: u8,
    /// Human-readable model shown in the server UI.
    pub model_name: String,
}

impl PlayerIdentity {
    #[must_use]
    pub fn new(mac: [u8; 6], uuid: Uuid) -> Self {
        Self {
            mac,
            uuid,
            device_id: DEFAULT_DEVICE_ID,
            model_name: "SlimLink Player".to_string(),
        }
    }

    /// Player id used in JSON-RPC requests.
    #[must_use]
    pub fn player_id(&self) -> String {
        format_mac(&self.mac)
    }

    #[cfg(test)]
    pub fn for_test() -> Self {
        Self::new(
            [0x00, 0x04, 0x20, 0x12, 0x34, 0x56],
            Uuid::from_bytes([7; 16]),
        )
    }
}

/// Knobs of the reconnection policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    /// Base delay in seconds; attempt `n` waits `base * 2^n`.
    pub base_delay_secs: f64,
    pub max_delay_foreground_secs: f64,
    pub max_delay_background_secs: f64,
    pub max_background_attempts: u32,
    /// On metered networks, stop after this many failures.
    pub max_expensive_failures: u32,
    pub jitter_min: f64,
    pub jitter_max: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            base_delay_secs: 2.0,
            max_delay_foreground_secs: 30.0,
            max_delay_background_secs: 60.0,
            max_background_attempts: 3,
            max_expensive_failures: 2,
            jitter_min: 0.8,
            jitter_max: 1.2,
        }
    }
}

impl ReconnectConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::invalid("reconnect.max_attempts", "must be >= 1"));
        }
        if !(self.base_delay_secs > 0.0) {
            return Err(ConfigError::invalid("reconnect.base_delay_secs", "must be > 0"));
        }
        if self.max_delay_foreground_secs < self.base_delay_secs
            || self.max_delay_background_secs < self.base_delay_secs
        {
            return Err(ConfigError::invalid(
                "reconnect.max_delay_*",
                "caps must not be below the base delay",
            ));
        }
        if !(self.jitter_min > 0.0 && self.jitter_min <= self.jitter_max) {
            return Err(ConfigError::invalid(
                "reconnect.jitter",
                "require 0 < jitter_min <= jitter_max",
            ));
        }
        Ok(())
    }
}

/// Configuration for one player instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Server host name or IP.
    pub server_host: String,
    /// SlimProto TCP port.
    pub slimproto_port: u16,
    /// Server HTTP port (streams, JSON-RPC).
    pub http_port: u16,
    /// Player name reported to the server until it assigns one.
    pub player_name: String,
    pub identity: PlayerIdentity,
    /// Timeout for one TCP connect attempt including DNS (seconds).
    pub connect_timeout_secs: u64,
    /// Timeout for one JSON-RPC request (seconds).
    pub rpc_timeout_secs: u64,
    /// Background countdown when the host grants no explicit time (seconds).
    pub background_grace_secs: u64,
    pub reconnect: ReconnectConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_host: "127.0.0.1".to_string(),
            slimproto_port: DEFAULT_SLIMPROTO_PORT,
            http_port: DEFAULT_HTTP_PORT,
            player_name: "SlimLink".to_string(),
            identity: PlayerIdentity::new([0x02, 0, 0, 0, 0, 0x01], Uuid::nil()),
            connect_timeout_secs: 10,
            rpc_timeout_secs: 5,
            background_grace_secs: 25,
            reconnect: ReconnectConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_host.trim().is_empty() {
            return Err(ConfigError::invalid("server_host", "must not be empty"));
        }
        if self.slimproto_port == 0 || self.http_port == 0 {
            return Err(ConfigError::invalid("ports", "must be non-zero"));
        }
        if self.connect_timeout_secs == 0 {
            return Err(ConfigError::invalid("connect_timeout_secs", "must be >= 1"));
        }
        if !(5..=10).contains(&self.rpc_timeout_secs) {
            return Err(ConfigError::invalid(
                "rpc_timeout_secs",
                "must be between 5 and 10 seconds",
            ));
        }
        self.reconnect.validate()
    }

    #[must_use]
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    #[must_use]
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    #[must_use]
    pub fn background_grace(&self) -> Duration {
        Duration::from_secs(self.background_grace_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        ClientConfig::default().validate().unwrap();
    }

    #[test]
    fn rpc_timeout_outside_range_is_rejected() {
        let config = ClientConfig {
            rpc_timeout_secs: 30,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_jitter_is_rejected() {
        let mut config = ClientConfig::default();
        config.reconnect.jitter_min = 1.3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn player_id_is_formatted_mac() {
        assert_eq!(PlayerIdentity::for_test().player_id(), "00:04:20:12:34:56");
    }
}

//! Player configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use slimlink_core::{parse_mac, ClientConfig, PlayerIdentity, ReconnectConfig};
use uuid::Uuid;

/// Player configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct PlayerConfig {
    /// Server host name or IP.
    /// Override: `SLIMLINK_SERVER`
    pub server: String,

    /// SlimProto port.
    /// Override: `SLIMLINK_SLIMPROTO_PORT`
    pub slimproto_port: u16,

    /// HTTP port for streams and JSON-RPC.
    /// Override: `SLIMLINK_HTTP_PORT`
    pub http_port: u16,

    /// Name shown in the server UI.
    /// Override: `SLIMLINK_PLAYER_NAME`
    pub player_name: String,

    /// Player MAC address (`aa:bb:cc:dd:ee:ff`). Generated when absent, which
    /// makes the server see a new player on every start.
    /// Override: `SLIMLINK_MAC`
    pub mac: Option<String>,

    /// Player UUID. Generated when absent.
    pub uuid: Option<Uuid>,

    /// Timeout for connecting to the server (seconds).
    pub connect_timeout_secs: u64,

    /// Timeout for JSON-RPC requests (seconds, 5-10).
    pub rpc_timeout_secs: u64,

    /// Reconnection policy.
    pub reconnect: ReconnectConfig,

    /// Length the simulated engine assumes for every track (seconds).
    pub simulated_track_secs: u64,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        let core = ClientConfig::default();
        Self {
            server: core.server_host,
            slimproto_port: core.slimproto_port,
            http_port: core.http_port,
            player_name: core.player_name,
            mac: None,
            uuid: None,
            connect_timeout_secs: core.connect_timeout_secs,
            rpc_timeout_secs: core.rpc_timeout_secs,
            reconnect: core.reconnect,
            simulated_track_secs: 240,
        }
    }
}

impl PlayerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies `SLIMLINK_*` overrides looked up through `lookup`.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(val) = lookup("SLIMLINK_SERVER") {
            self.server = val;
        }

        if let Some(val) = lookup("SLIMLINK_SLIMPROTO_PORT") {
            if let Ok(port) = val.parse() {
                self.slimproto_port = port;
            }
        }

        if let Some(val) = lookup("SLIMLINK_HTTP_PORT") {
            if let Ok(port) = val.parse() {
                self.http_port = port;
            }
        }

        if let Some(val) = lookup("SLIMLINK_PLAYER_NAME") {
            self.player_name = val;
        }

        if let Some(val) = lookup("SLIMLINK_MAC") {
            self.mac = Some(val);
        }
    }

    /// Resolves the device identity, generating missing parts.
    fn identity(&self) -> Result<PlayerIdentity> {
        let uuid = self.uuid.unwrap_or_else(Uuid::new_v4);
        let mac = match &self.mac {
            Some(text) => parse_mac(text).ok_or_else(|| anyhow!("Invalid MAC address: {}", text))?,
            None => {
                // Locally administered, unicast.
                let b = uuid.as_bytes();
                let mac = [0x02, b[0], b[1], b[2], b[3], b[4]];
                log::warn!(
                    "No MAC configured, using generated {}",
                    slimlink_core::format_mac(&mac)
                );
                mac
            }
        };
        Ok(PlayerIdentity::new(mac, uuid))
    }

    #[must_use]
    pub fn simulated_track_length(&self) -> Duration {
        Duration::from_secs(self.simulated_track_secs.max(1))
    }

    /// Converts to slimlink-core's ClientConfig type.
    pub fn to_client_config(&self) -> Result<ClientConfig> {
        Ok(ClientConfig {
            server_host: self.server.clone(),
            slimproto_port: self.slimproto_port,
            http_port: self.http_port,
            player_name: self.player_name.clone(),
            identity: self.identity()?,
            connect_timeout_secs: self.connect_timeout_secs,
            rpc_timeout_secs: self.rpc_timeout_secs,
            reconnect: self.reconnect.clone(),
            ..Default::default()
        })
    }
}

//! Engine and pairing configuration.

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::device::DeviceSpec;
use crate::protocol::{
    CHECK_INTERVAL_MS, COMMAND_TIMEOUT_MS, CONNECT_TIMEOUT_MS, CONNECTION_TIMEOUT_MS,
    DEVICE_UDP_PORT, GLOBAL_TIMEOUT_MS, KNOWN_MAC_CAPACITY, MAX_RETRANSMITS, PAIR_UDP_PORT,
    SUBSCRIBE_INTERVAL_MS, UNCONFIGURED_SSID,
};

/// Protocol engine timing and the outlets to register at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Local UDP port; outlets reply to the port they were addressed from.
    pub port: u16,
    pub subscribe_interval_ms: u32,
    /// Silence after which a device is considered disconnected.
    pub connection_timeout_ms: u32,
    /// How often the liveness sweep runs.
    pub check_interval_ms: u32,
    pub known_mac_capacity: usize,
    pub devices: Vec<DeviceSpec>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            port: DEVICE_UDP_PORT,
            subscribe_interval_ms: SUBSCRIBE_INTERVAL_MS,
            connection_timeout_ms: CONNECTION_TIMEOUT_MS,
            check_interval_ms: CHECK_INTERVAL_MS,
            known_mac_capacity: KNOWN_MAC_CAPACITY,
            devices: Vec::new(),
        }
    }
}

/// Pairing session timing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PairingConfig {
    pub port: u16,
    /// Access point name advertised by an unconfigured outlet.
    pub device_ssid: String,
    pub global_timeout_ms: u32,
    pub connect_timeout_ms: u32,
    pub command_timeout_ms: u32,
    pub max_retransmits: u8,
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            port: PAIR_UDP_PORT,
            device_ssid: UNCONFIGURED_SSID.to_string(),
            global_timeout_ms: GLOBAL_TIMEOUT_MS,
            connect_timeout_ms: CONNECT_TIMEOUT_MS,
            command_timeout_ms: COMMAND_TIMEOUT_MS,
            max_retransmits: MAX_RETRANSMITS,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine: EngineConfig,
    pub pairing: PairingConfig,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }
}

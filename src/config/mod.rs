//! # Configuration Management Module
//!
//! Node settings live in one TOML file. Every section has defaults, so a file
//! only needs the values that differ.
//!
//! ## Configuration Structure
//!
//! - [`NodeConfig`] - local mesh address and the user's display name
//! - [`MqttConfig`] - bridge topics and whether the broker link starts up
//! - [`TelemetryConfig`] - routing-table, monitor and metadata reporter intervals and strategy
//! - [`SensorConfig`] - sampling intervals for the temperature and DHT22 sensors, fixed battery level
//! - [`GpsConfig`] - fixed position reported when no receiver is attached
//! - [`StorageConfig`] - directory of the persisted key/value store
//! - [`LoggingConfig`] - log level and optional log file
//! - [`SimulationConfig`] - virtual peers started next to the local node
//!
//! ## Usage
//!
//! ```rust,no_run
//! use lorachat::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     Config::create_default("config.toml").await?;
//!     let config = Config::load("config.toml").await?;
//!     println!("Node {:04X} ({})", config.node.address, config.node.name);
//!     Ok(())
//! }
//! ```
//!
//! ## Configuration File Format
//!
//! ```toml
//! [node]
//! address = 16
//! name = "Alice"
//!
//! [mqtt]
//! enabled = false
//! topic_prefix = "to-server/"
//! subscribe_topic = "from-server/#"
//!
//! [telemetry]
//! rt_interval_secs = 60
//! monitor_strategy = "single_message"
//!
//! [[simulation.peers]]
//! address = 32
//! name = "Bob"
//! ```

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::validation::validate_contact_name;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Mesh address of this node. Zero is reserved.
    pub address: u16,
    /// Name announced to other nodes; at most ten bytes.
    pub name: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            address: 0x0010,
            name: "Node10".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    /// Treat the broker link as connected at startup.
    pub enabled: bool,
    pub topic_prefix: String,
    pub subscribe_topic: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            topic_prefix: "to-server/".to_string(),
            subscribe_topic: "from-server/#".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStrategy {
    /// One message per routing-table row.
    PerRoute,
    /// One message per cycle carrying every direct neighbour.
    SingleMessage,
}

impl Default for MonitorStrategy {
    fn default() -> Self {
        if cfg!(feature = "monitor-single-message") {
            MonitorStrategy::SingleMessage
        } else {
            MonitorStrategy::PerRoute
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub rt_interval_secs: u64,
    pub mon_interval_secs: u64,
    pub rt_autostart: bool,
    pub mon_autostart: bool,
    pub monitor_strategy: MonitorStrategy,
    pub metadata_interval_secs: u64,
    pub metadata_autostart: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            rt_interval_secs: 60,
            mon_interval_secs: 120,
            rt_autostart: false,
            mon_autostart: false,
            monitor_strategy: MonitorStrategy::default(),
            metadata_interval_secs: 60,
            metadata_autostart: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorConfig {
    pub temperature_interval_secs: u64,
    pub dht22_interval_secs: u64,
    pub autostart: bool,
    /// Charge reported in metadata when no battery gauge is attached.
    pub battery_percentage: f32,
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            temperature_interval_secs: 300,
            dht22_interval_secs: 300,
            autostart: false,
            battery_percentage: 100.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GpsConfig {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl Default for GpsConfig {
    fn default() -> Self {
        Self {
            latitude: 41.3874,
            longitude: 2.1686,
            altitude: 12.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "./data".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PeerConfig {
    pub address: u16,
    pub name: String,
    #[serde(default)]
    pub gateway: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SimulationConfig {
    pub peers: Vec<PeerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub node: NodeConfig,
    pub mqtt: MqttConfig,
    pub telemetry: TelemetryConfig,
    pub sensors: SensorConfig,
    pub gps: GpsConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
    pub simulation: SimulationConfig,
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        config.validate()?;
        Ok(config)
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.node.address == 0 {
            return Err(anyhow!("node.address must be non-zero"));
        }
        validate_contact_name(&self.node.name)
            .map_err(|e| anyhow!("node.name '{}': {}", self.node.name, e))?;
        if self.telemetry.rt_interval_secs == 0
            || self.telemetry.mon_interval_secs == 0
            || self.telemetry.metadata_interval_secs == 0
        {
            return Err(anyhow!("telemetry intervals must be at least one second"));
        }
        if self.sensors.temperature_interval_secs == 0 || self.sensors.dht22_interval_secs == 0 {
            return Err(anyhow!("sensor intervals must be at least one second"));
        }
        if !(0.0..=100.0).contains(&self.sensors.battery_percentage) {
            return Err(anyhow!("sensors.battery_percentage must be between 0 and 100"));
        }
        let mut seen = std::collections::HashSet::new();
        seen.insert(self.node.address);
        for peer in &self.simulation.peers {
            if peer.address == 0 || !seen.insert(peer.address) {
                return Err(anyhow!(
                    "simulation peer address {:04X} is zero or duplicated",
                    peer.address
                ));
            }
            validate_contact_name(&peer.name)
                .map_err(|e| anyhow!("simulation peer '{}': {}", peer.name, e))?;
        }
        Ok(())
    }
}

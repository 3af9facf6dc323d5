//! Host tool configuration.
//!
//! ```yaml
//! connection:
//!   address: 192.168.1.20:4001
//! hci:
//!   default_timeout_ms: 2000
//!   header_layout: compact
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use wimod_hci::HciConfig;

use crate::error::CliResult;

/// Default address of the serial-over-TCP bridge.
pub const DEFAULT_ADDRESS: &str = "127.0.0.1:4001";

/// Connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// `host:port` of the serial-over-TCP bridge.
    pub address: String,
    /// Interval of the expiry sweep in milliseconds.
    pub sweep_interval_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        ConnectionConfig {
            address: DEFAULT_ADDRESS.to_string(),
            sweep_interval_ms: 20,
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Connection settings.
    pub connection: ConnectionConfig,
    /// HCI core settings.
    pub hci: HciConfig,
}

impl CliConfig {
    /// Parse a YAML document.
    pub fn from_yaml(text: &str) -> CliResult<Self> {
        let config: CliConfig = serde_yaml::from_str(text)?;
        config.hci.validate()?;
        Ok(config)
    }

    /// Load a YAML file.
    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml(&text)
    }
}

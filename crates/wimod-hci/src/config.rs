//! Core configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::{CRC_SIZE, DEFAULT_MAX_FRAME_SIZE, DEFAULT_TIMEOUT_MS};
use crate::error::HciError;
use crate::message::{HciCodec, HeaderLayout};
use crate::slip::SlipMarkers;

/// Configuration for one HCI core instance.
///
/// All fields have defaults, so a partial YAML section is enough:
///
/// ```yaml
/// max_frame_size: 512
/// default_timeout_ms: 2000
/// header_layout: tagged
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HciConfig {
    /// Maximum unescaped frame size (header + payload + CRC).
    pub max_frame_size: usize,
    /// Timeout applied by adapters and `send_command` callers that do not
    /// pass their own.
    pub default_timeout_ms: u64,
    /// Header field layout.
    pub header_layout: HeaderLayout,
    /// Framing marker bytes.
    pub markers: SlipMarkers,
    /// Link name used as the `link` metric label.
    pub link_name: String,
}

impl Default for HciConfig {
    fn default() -> Self {
        HciConfig {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            header_layout: HeaderLayout::default(),
            markers: SlipMarkers::default(),
            link_name: "default".to_string(),
        }
    }
}

impl HciConfig {
    /// Default command timeout.
    pub fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Message codec matching this configuration.
    pub fn codec(&self) -> HciCodec {
        HciCodec::new(self.header_layout, self.max_frame_size)
    }

    /// Reject configurations the core cannot run with.
    pub fn validate(&self) -> Result<(), HciError> {
        self.markers.validate().map_err(HciError::InvalidConfig)?;

        let min = self.header_layout.header_size() + CRC_SIZE;
        if self.max_frame_size < min {
            return Err(HciError::InvalidConfig(format!(
                "max_frame_size {} is smaller than header plus checksum ({})",
                self.max_frame_size, min
            )));
        }
        if self.default_timeout_ms == 0 {
            return Err(HciError::InvalidConfig(
                "default_timeout_ms must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}

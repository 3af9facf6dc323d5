//! Protocol constants
//!
//! SLIP marker bytes, header sizes, and the SAP and message identifiers used
//! by the subsystem adapters.

// ============================================================================
// SLIP Framing
// ============================================================================

/// Frame delimiter.
pub const SLIP_END: u8 = 0xC0;
/// Escape byte.
pub const SLIP_ESC: u8 = 0xDB;
/// Escaped END (follows ESC).
pub const SLIP_ESC_END: u8 = 0xDC;
/// Escaped ESC (follows ESC).
pub const SLIP_ESC_ESC: u8 = 0xDD;

// ============================================================================
// Sizes
// ============================================================================

/// Size of the CRC16 trailer in bytes.
pub const CRC_SIZE: usize = 2;
/// Header size without correlation tag (sap id + message id).
pub const COMPACT_HEADER_SIZE: usize = 2;
/// Header size with correlation tag (sap id + message id + tag).
pub const TAGGED_HEADER_SIZE: usize = 3;
/// Default maximum unescaped frame size (header + payload + CRC).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024;
/// Default command timeout in milliseconds.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

// ============================================================================
// Response Conventions
// ============================================================================

/// Position of the status byte in a response payload.
pub const RSP_STATUS_POS: usize = 0;
/// Status byte value for success.
pub const STATUS_OK: u8 = 0x00;

// ============================================================================
// SAP Identifiers
// ============================================================================

/// Device management.
pub const DEVMGMT_SAP_ID: u8 = 0x01;
/// Radio link test.
pub const RLT_SAP_ID: u8 = 0x02;
/// Radio link (data exchange).
pub const RADIOLINK_SAP_ID: u8 = 0x03;
/// Remote control.
pub const REMOTECTRL_SAP_ID: u8 = 0x04;
/// Sensor application.
pub const SENSORAPP_SAP_ID: u8 = 0x05;

// ============================================================================
// Device Management Messages
// ============================================================================

/// Ping request.
pub const DEVMGMT_MSG_PING_REQ: u8 = 0x01;
/// Ping response.
pub const DEVMGMT_MSG_PING_RSP: u8 = 0x02;
/// Device info request.
pub const DEVMGMT_MSG_GET_DEVICE_INFO_REQ: u8 = 0x03;
/// Device info response.
pub const DEVMGMT_MSG_GET_DEVICE_INFO_RSP: u8 = 0x04;
/// Firmware info request.
pub const DEVMGMT_MSG_GET_FW_INFO_REQ: u8 = 0x05;
/// Firmware info response.
pub const DEVMGMT_MSG_GET_FW_INFO_RSP: u8 = 0x06;
/// Reset request.
pub const DEVMGMT_MSG_RESET_REQ: u8 = 0x07;
/// Reset response.
pub const DEVMGMT_MSG_RESET_RSP: u8 = 0x08;
/// System status request.
pub const DEVMGMT_MSG_GET_SYSTEM_STATUS_REQ: u8 = 0x17;
/// System status response.
pub const DEVMGMT_MSG_GET_SYSTEM_STATUS_RSP: u8 = 0x18;

// ============================================================================
// Radio Link Test Messages
// ============================================================================

/// Start radio link test.
pub const RLT_MSG_START_REQ: u8 = 0x01;
/// Start response.
pub const RLT_MSG_START_RSP: u8 = 0x02;
/// Stop radio link test.
pub const RLT_MSG_STOP_REQ: u8 = 0x03;
/// Stop response.
pub const RLT_MSG_STOP_RSP: u8 = 0x04;
/// Periodic test status indication.
pub const RLT_MSG_STATUS_IND: u8 = 0x06;

// ============================================================================
// Remote Control Messages
// ============================================================================

/// Button pressed indication.
pub const REMOTE_CTRL_MSG_BUTTON_PRESSED_IND: u8 = 0x02;

// ============================================================================
// Sensor Application Messages
// ============================================================================

/// Sensor data received indication.
pub const SENSORAPP_MSG_SEND_DATA_IND: u8 = 0x06;
/// Sensor acknowledgement indication.
pub const SENSORAPP_MSG_ACK_IND: u8 = 0x08;
/// Set configuration request.
pub const SENSORAPP_MSG_SET_CONFIG_REQ: u8 = 0x09;
/// Set configuration response.
pub const SENSORAPP_MSG_SET_CONFIG_RSP: u8 = 0x0A;
/// Get configuration request.
pub const SENSORAPP_MSG_GET_CONFIG_REQ: u8 = 0x0B;
/// Get configuration response.
pub const SENSORAPP_MSG_GET_CONFIG_RSP: u8 = 0x0C;

/// Status/format flag: optional RSSI/SNR/RX time fields are present.
pub const SENSORAPP_FORMAT_EXT_HCI_OUT_ACTIVE: u8 = 0x01;

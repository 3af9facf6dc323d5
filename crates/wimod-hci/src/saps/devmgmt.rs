//! Device management SAP.

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use super::{check_status, ensure_len, le_u16, le_u32};
use crate::constants::*;
use crate::dispatcher::HciClient;
use crate::error::HciResult;
use crate::message::HciMessage;
use crate::sap::FnSap;

/// Basic module identification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Module type code.
    pub module_type: u8,
    /// Radio device address.
    pub device_address: u16,
    /// Radio group address.
    pub group_address: u8,
    /// Factory-assigned device id.
    pub device_id: u32,
}

impl DeviceInfo {
    /// Wire size after the status byte.
    pub const SIZE: usize = 9;

    /// Decode from response bytes following the status byte.
    pub fn decode(data: &[u8]) -> HciResult<Self> {
        ensure_len(data, Self::SIZE, "device info")?;
        // data[4] is reserved
        Ok(DeviceInfo {
            module_type: data[0],
            device_address: le_u16(data, 1),
            group_address: data[3],
            device_id: le_u32(data, 5),
        })
    }
}

/// Firmware identification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareInfo {
    /// Minor version.
    pub minor_version: u8,
    /// Major version.
    pub major_version: u8,
    /// Build number.
    pub build_count: u16,
    /// Build date as reported by the module.
    pub build_date: String,
    /// Firmware image name.
    pub firmware_name: String,
}

impl FirmwareInfo {
    const BUILD_DATE_LEN: usize = 10;
    /// Minimum wire size after the status byte.
    pub const MIN_SIZE: usize = 4 + Self::BUILD_DATE_LEN;

    /// Decode from response bytes following the status byte.
    pub fn decode(data: &[u8]) -> HciResult<Self> {
        ensure_len(data, Self::MIN_SIZE, "firmware info")?;
        let date = &data[4..Self::MIN_SIZE];
        let name = &data[Self::MIN_SIZE..];
        Ok(FirmwareInfo {
            minor_version: data[0],
            major_version: data[1],
            build_count: le_u16(data, 2),
            build_date: trim_ascii(date),
            firmware_name: trim_ascii(name),
        })
    }

    /// `major.minor.build`.
    pub fn version(&self) -> String {
        format!("{}.{}.{}", self.major_version, self.minor_version, self.build_count)
    }
}

fn trim_ascii(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).trim().to_string()
}

/// Runtime counters reported by the module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemStatus {
    /// System tick resolution in milliseconds.
    pub sys_tick_resolution: u8,
    /// Ticks since boot.
    pub sys_tick_counter: u32,
    /// Real-time clock value.
    pub rtc_time: u32,
    /// Non-volatile memory status bits.
    pub nvm_status: u16,
    /// Battery level.
    pub battery_status: u16,
    /// Extra status bits.
    pub extra_status: u16,
    /// Radio packets received.
    pub rx_packets: u32,
    /// Received packets addressed to this module.
    pub rx_address_match: u32,
    /// Received packets with CRC errors.
    pub rx_crc_error: u32,
    /// Radio packets sent.
    pub tx_packets: u32,
    /// Transmit errors.
    pub tx_error: u32,
    /// Transmissions deferred by a busy channel.
    pub tx_media_busy_events: u32,
}

impl SystemStatus {
    /// Wire size after the status byte.
    pub const SIZE: usize = 39;

    /// Decode from response bytes following the status byte.
    pub fn decode(data: &[u8]) -> HciResult<Self> {
        ensure_len(data, Self::SIZE, "system status")?;
        Ok(SystemStatus {
            sys_tick_resolution: data[0],
            sys_tick_counter: le_u32(data, 1),
            rtc_time: le_u32(data, 5),
            nvm_status: le_u16(data, 9),
            battery_status: le_u16(data, 11),
            extra_status: le_u16(data, 13),
            rx_packets: le_u32(data, 15),
            rx_address_match: le_u32(data, 19),
            rx_crc_error: le_u32(data, 23),
            tx_packets: le_u32(data, 27),
            tx_error: le_u32(data, 31),
            tx_media_busy_events: le_u32(data, 35),
        })
    }
}

/// Device management commands.
#[derive(Debug, Clone)]
pub struct DeviceManagement {
    client: HciClient,
    timeout: Duration,
}

impl DeviceManagement {
    /// Register the SAP; indications are forwarded raw to `on_indication`.
    pub fn attach<F>(client: HciClient, on_indication: F) -> HciResult<Self>
    where
        F: Fn(HciMessage) + Send + Sync + 'static,
    {
        client.register_sap(Arc::new(
            FnSap::new(DEVMGMT_SAP_ID, on_indication).with_name("devmgmt"),
        ))?;
        let timeout = client.config().default_timeout();
        Ok(DeviceManagement { client, timeout })
    }

    /// Override the command timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn command(&self, msg_id: u8, payload: Vec<u8>) -> HciResult<HciMessage> {
        self.client
            .send_command(DEVMGMT_SAP_ID, msg_id, payload, self.timeout)
    }

    /// Check that the module is alive.
    pub fn ping(&self) -> HciResult<()> {
        let rsp = self.command(DEVMGMT_MSG_PING_REQ, Vec::new())?;
        check_status(&rsp)?;
        debug!("ping ok");
        Ok(())
    }

    /// Read module identification.
    pub fn get_device_info(&self) -> HciResult<DeviceInfo> {
        let rsp = self.command(DEVMGMT_MSG_GET_DEVICE_INFO_REQ, Vec::new())?;
        DeviceInfo::decode(check_status(&rsp)?)
    }

    /// Read firmware identification.
    pub fn get_firmware_info(&self) -> HciResult<FirmwareInfo> {
        let rsp = self.command(DEVMGMT_MSG_GET_FW_INFO_REQ, Vec::new())?;
        FirmwareInfo::decode(check_status(&rsp)?)
    }

    /// Restart the module. The response is sent before the module reboots.
    pub fn reset(&self) -> HciResult<()> {
        let rsp = self.command(DEVMGMT_MSG_RESET_REQ, Vec::new())?;
        check_status(&rsp)?;
        Ok(())
    }

    /// Read runtime counters.
    pub fn get_system_status(&self) -> HciResult<SystemStatus> {
        let rsp = self.command(DEVMGMT_MSG_GET_SYSTEM_STATUS_REQ, Vec::new())?;
        SystemStatus::decode(check_status(&rsp)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HciError;

    #[test]
    fn test_decode_device_info() {
        let data = [0x90, 0x34, 0x12, 0x10, 0x00, 0x78, 0x56, 0x34, 0x12];
        let info = DeviceInfo::decode(&data).unwrap();
        assert_eq!(
            info,
            DeviceInfo {
                module_type: 0x90,
                device_address: 0x1234,
                group_address: 0x10,
                device_id: 0x1234_5678,
            }
        );
    }

    #[test]
    fn test_decode_device_info_too_short() {
        assert!(matches!(
            DeviceInfo::decode(&[0x90, 0x34]),
            Err(HciError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_decode_firmware_info() {
        let mut data = vec![0x05, 0x01, 0x2C, 0x01];
        data.extend_from_slice(b"2024-03-01");
        data.extend_from_slice(b"LR-BASE\0\0");
        let info = FirmwareInfo::decode(&data).unwrap();
        assert_eq!(info.major_version, 1);
        assert_eq!(info.minor_version, 5);
        assert_eq!(info.build_count, 300);
        assert_eq!(info.build_date, "2024-03-01");
        assert_eq!(info.firmware_name, "LR-BASE");
        assert_eq!(info.version(), "1.5.300");
    }

    #[test]
    fn test_decode_firmware_info_without_name() {
        let mut data = vec![0x00, 0x02, 0x01, 0x00];
        data.extend_from_slice(b"2023-12-24");
        let info = FirmwareInfo::decode(&data).unwrap();
        assert_eq!(info.firmware_name, "");
    }

    #[test]
    fn test_decode_system_status() {
        let mut data = vec![0x01];
        data.extend_from_slice(&1000u32.to_le_bytes());
        data.extend_from_slice(&77u32.to_le_bytes());
        data.extend_from_slice(&0x0001u16.to_le_bytes());
        data.extend_from_slice(&3300u16.to_le_bytes());
        data.extend_from_slice(&0u16.to_le_bytes());
        for n in 1u32..=6 {
            data.extend_from_slice(&n.to_le_bytes());
        }
        let status = SystemStatus::decode(&data).unwrap();
        assert_eq!(status.sys_tick_counter, 1000);
        assert_eq!(status.rtc_time, 77);
        assert_eq!(status.battery_status, 3300);
        assert_eq!(status.rx_packets, 1);
        assert_eq!(status.tx_media_busy_events, 6);
    }
}

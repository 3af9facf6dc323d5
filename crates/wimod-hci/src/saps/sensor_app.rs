//! Sensor application SAP.
//!
//! A transmitter module periodically sends sensor readings; a receiver
//! module reports them (and the transmitter's acknowledgements) to the host.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::{check_status, ensure_len, le_u16, le_u32, EventSap};
use crate::constants::*;
use crate::dispatcher::HciClient;
use crate::error::{HciError, HciResult};
use crate::message::HciMessage;

/// Sensor application role.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum SensorMode {
    /// Deactivated.
    #[default]
    Off = 0,
    /// Sends sensor data.
    Transmitter = 1,
    /// Receives sensor data.
    Receiver = 2,
}

impl TryFrom<u8> for SensorMode {
    type Error = HciError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SensorMode::Off),
            1 => Ok(SensorMode::Transmitter),
            2 => Ok(SensorMode::Receiver),
            other => Err(HciError::InvalidResponse(format!(
                "unknown sensor mode {}",
                other
            ))),
        }
    }
}

/// Sensor application configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensorConfig {
    /// Role.
    pub mode: SensorMode,
    /// Option bits.
    pub options: u8,
    /// Transmit period in milliseconds.
    pub sending_period_ms: u32,
    /// Receive link timeout in milliseconds.
    pub link_timeout_ms: u32,
}

impl SensorConfig {
    /// Wire size.
    pub const SIZE: usize = 10;

    /// Option: request acknowledgements.
    pub const OPTION_SENSOR_ACK: u8 = 1 << 0;
    /// Option: report acknowledgements to the host.
    pub const OPTION_ACK_HCI_OUTPUT: u8 = 1 << 1;
    /// Option: link monitor output.
    pub const OPTION_LINK_MONITOR: u8 = 1 << 2;

    /// Encode the set-config payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.push(self.mode as u8);
        buf.push(self.options);
        buf.extend_from_slice(&self.sending_period_ms.to_le_bytes());
        buf.extend_from_slice(&self.link_timeout_ms.to_le_bytes());
        buf
    }

    /// Decode from get-config response bytes following the status byte.
    pub fn decode(data: &[u8]) -> HciResult<Self> {
        ensure_len(data, Self::SIZE, "sensor config")?;
        Ok(SensorConfig {
            mode: SensorMode::try_from(data[0])?,
            options: data[1],
            sending_period_ms: le_u32(data, 2),
            link_timeout_ms: le_u32(data, 6),
        })
    }
}

/// Link quality appended when the module runs with extended output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkQuality {
    /// Received signal strength, dBm.
    pub rssi: i16,
    /// Signal to noise ratio, dB.
    pub snr: i8,
    /// Receive timestamp from the module RTC.
    pub rx_time: u32,
}

impl LinkQuality {
    const SIZE: usize = 7;

    fn decode_tail(data: &[u8], offset: usize) -> Option<Self> {
        if data.len() < offset + Self::SIZE {
            return None;
        }
        Some(LinkQuality {
            rssi: le_u16(data, offset) as i16,
            snr: data[offset + 2] as i8,
            rx_time: le_u32(data, offset + 3),
        })
    }
}

/// Sensor readings received from a transmitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorData {
    /// Status/format flags.
    pub status_format: u8,
    /// Destination group.
    pub dest_group_address: u8,
    /// Destination device.
    pub dest_device_address: u16,
    /// Sender group.
    pub source_group_address: u8,
    /// Sender device.
    pub source_device_address: u16,
    /// Supply voltage.
    pub voltage: u16,
    /// Raw ADC reading.
    pub adc_value: u16,
    /// Temperature reading.
    pub temperature: u8,
    /// Digital input bits.
    pub digital_inputs: u8,
    /// Present with extended output.
    pub link: Option<LinkQuality>,
}

impl SensorData {
    /// Minimum wire size.
    pub const MIN_SIZE: usize = 13;

    /// Decode a send-data indication payload.
    pub fn decode(data: &[u8]) -> HciResult<Self> {
        ensure_len(data, Self::MIN_SIZE, "sensor data indication")?;
        Ok(SensorData {
            status_format: data[0],
            dest_group_address: data[1],
            dest_device_address: le_u16(data, 2),
            source_group_address: data[4],
            source_device_address: le_u16(data, 5),
            voltage: le_u16(data, 7),
            adc_value: le_u16(data, 9),
            temperature: data[11],
            digital_inputs: data[12],
            link: LinkQuality::decode_tail(data, Self::MIN_SIZE),
        })
    }

    /// Whether the module flagged extended output.
    pub fn is_extended(&self) -> bool {
        self.status_format & SENSORAPP_FORMAT_EXT_HCI_OUT_ACTIVE != 0
    }
}

/// Acknowledgement received from a transmitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SensorAck {
    /// Status/format flags.
    pub status_format: u8,
    /// Destination group.
    pub dest_group_address: u8,
    /// Destination device.
    pub dest_device_address: u16,
    /// Sender group.
    pub source_group_address: u8,
    /// Sender device.
    pub source_device_address: u16,
    /// Digital input bits.
    pub digital_inputs: u8,
    /// Present with extended output.
    pub link: Option<LinkQuality>,
}

impl SensorAck {
    /// Minimum wire size.
    pub const MIN_SIZE: usize = 8;

    /// Decode an acknowledgement indication payload.
    pub fn decode(data: &[u8]) -> HciResult<Self> {
        ensure_len(data, Self::MIN_SIZE, "sensor ack indication")?;
        Ok(SensorAck {
            status_format: data[0],
            dest_group_address: data[1],
            dest_device_address: le_u16(data, 2),
            source_group_address: data[4],
            source_device_address: le_u16(data, 5),
            digital_inputs: data[7],
            link: LinkQuality::decode_tail(data, Self::MIN_SIZE),
        })
    }
}

/// Indications of the sensor application SAP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SensorEvent {
    /// Sensor readings.
    Data(SensorData),
    /// Acknowledgement.
    Ack(SensorAck),
    /// Any other message, or a payload that failed to decode.
    Other(HciMessage),
}

impl SensorEvent {
    fn from_message(msg: HciMessage) -> Self {
        let decoded = match msg.msg_id {
            SENSORAPP_MSG_SEND_DATA_IND => SensorData::decode(&msg.payload).map(SensorEvent::Data),
            SENSORAPP_MSG_ACK_IND => SensorAck::decode(&msg.payload).map(SensorEvent::Ack),
            _ => return SensorEvent::Other(msg),
        };
        decoded.unwrap_or_else(|e| {
            warn!(error = %e, msg_id = msg.msg_id, "malformed sensor indication");
            SensorEvent::Other(msg)
        })
    }
}

/// Sensor application commands.
#[derive(Debug, Clone)]
pub struct SensorApp {
    client: HciClient,
    timeout: Duration,
}

impl SensorApp {
    /// Register the SAP; sensor indications go to `on_event`.
    pub fn attach<F>(client: HciClient, on_event: F) -> HciResult<Self>
    where
        F: Fn(SensorEvent) + Send + Sync + 'static,
    {
        client.register_sap(Arc::new(EventSap::new(
            SENSORAPP_SAP_ID,
            "sensor-app",
            SensorEvent::from_message,
            on_event,
        )))?;
        let timeout = client.config().default_timeout();
        Ok(SensorApp { client, timeout })
    }

    /// Write the configuration.
    pub fn set_config(&self, config: &SensorConfig) -> HciResult<()> {
        let rsp = self.client.send_command(
            SENSORAPP_SAP_ID,
            SENSORAPP_MSG_SET_CONFIG_REQ,
            config.encode(),
            self.timeout,
        )?;
        check_status(&rsp)?;
        Ok(())
    }

    /// Read the configuration.
    pub fn get_config(&self) -> HciResult<SensorConfig> {
        let rsp = self.client.send_command(
            SENSORAPP_SAP_ID,
            SENSORAPP_MSG_GET_CONFIG_REQ,
            Vec::new(),
            self.timeout,
        )?;
        SensorConfig::decode(check_status(&rsp)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data_payload() -> Vec<u8> {
        vec![
            0x00, // status/format
            0x10, 0x34, 0x12, // dest
            0x20, 0x78, 0x56, // source
            0xE4, 0x0C, // voltage 3300
            0x00, 0x02, // adc 512
            25, 0b0000_0101,
        ]
    }

    #[test]
    fn test_config_encode_decode() {
        let config = SensorConfig {
            mode: SensorMode::Transmitter,
            options: SensorConfig::OPTION_SENSOR_ACK | SensorConfig::OPTION_ACK_HCI_OUTPUT,
            sending_period_ms: 5000,
            link_timeout_ms: 30000,
        };
        let bytes = config.encode();
        assert_eq!(bytes, vec![1, 0x03, 0x88, 0x13, 0, 0, 0x30, 0x75, 0, 0]);
        assert_eq!(SensorConfig::decode(&bytes).unwrap(), config);
    }

    #[test]
    fn test_config_unknown_mode() {
        let mut bytes = SensorConfig::default().encode();
        bytes[0] = 9;
        assert!(matches!(SensorConfig::decode(&bytes), Err(HciError::InvalidResponse(_))));
    }

    #[test]
    fn test_decode_sensor_data_basic() {
        let data = SensorData::decode(&data_payload()).unwrap();
        assert_eq!(data.source_device_address, 0x5678);
        assert_eq!(data.voltage, 3300);
        assert_eq!(data.adc_value, 512);
        assert_eq!(data.temperature, 25);
        assert_eq!(data.digital_inputs, 0b101);
        assert!(!data.is_extended());
        assert_eq!(data.link, None);
    }

    #[test]
    fn test_decode_sensor_data_extended() {
        let mut payload = data_payload();
        payload[0] = SENSORAPP_FORMAT_EXT_HCI_OUT_ACTIVE;
        payload.extend_from_slice(&(-90i16).to_le_bytes());
        payload.push((-5i8) as u8);
        payload.extend_from_slice(&123_456u32.to_le_bytes());
        let data = SensorData::decode(&payload).unwrap();
        assert!(data.is_extended());
        assert_eq!(
            data.link,
            Some(LinkQuality {
                rssi: -90,
                snr: -5,
                rx_time: 123_456
            })
        );
    }

    #[test]
    fn test_decode_ack() {
        let payload = [0x00, 0x10, 0x34, 0x12, 0x20, 0x78, 0x56, 0x01];
        let ack = SensorAck::decode(&payload).unwrap();
        assert_eq!(ack.dest_device_address, 0x1234);
        assert_eq!(ack.digital_inputs, 1);
        assert_eq!(ack.link, None);
    }

    #[test]
    fn test_event_dispatch_by_msg_id() {
        let msg = HciMessage::new(SENSORAPP_SAP_ID, SENSORAPP_MSG_SEND_DATA_IND, data_payload());
        assert!(matches!(SensorEvent::from_message(msg), SensorEvent::Data(_)));

        let short = HciMessage::new(SENSORAPP_SAP_ID, SENSORAPP_MSG_ACK_IND, vec![0; 3]);
        assert!(matches!(SensorEvent::from_message(short), SensorEvent::Other(_)));
    }
}

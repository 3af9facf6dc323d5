//! Radio link test SAP.
//!
//! The module exchanges test packets with a peer and reports counters and
//! link quality through status indications.

use std::sync::Arc;
use std::time::Duration;

use tracing::warn;

use super::{check_status, ensure_len, le_u16, EventSap};
use crate::constants::*;
use crate::dispatcher::HciClient;
use crate::error::HciResult;
use crate::message::HciMessage;

/// Test run mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[repr(u8)]
pub enum RltMode {
    /// One run of `num_packets` packets.
    #[default]
    Single = 0,
    /// Runs repeat until stopped by the host.
    Repeated = 1,
}

/// Parameters of a test run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RltParameters {
    /// Peer group address.
    pub dest_group_address: u8,
    /// Peer device address.
    pub dest_device_address: u16,
    /// Dummy payload bytes per test packet.
    pub packet_size: u8,
    /// Test packets per run.
    pub num_packets: u16,
    /// Run mode.
    pub mode: RltMode,
}

impl RltParameters {
    /// Wire size.
    pub const SIZE: usize = 7;

    /// Encode the request payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.push(self.dest_group_address);
        buf.extend_from_slice(&self.dest_device_address.to_le_bytes());
        buf.push(self.packet_size);
        buf.extend_from_slice(&self.num_packets.to_le_bytes());
        buf.push(self.mode as u8);
        buf
    }
}

/// Test counters and link quality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RltStatus {
    /// 0 = OK, 1 = a new test run started.
    pub test_status: u8,
    /// Packets sent by the local device.
    pub local_tx_counter: u16,
    /// Packets received by the local device.
    pub local_rx_counter: u16,
    /// Packets sent by the peer.
    pub peer_tx_counter: u16,
    /// Packets received by the peer.
    pub peer_rx_counter: u16,
    /// RSSI of the last packet received locally, dBm.
    pub local_rssi: i16,
    /// RSSI of the last packet received by the peer, dBm.
    pub peer_rssi: i16,
    /// SNR of the last packet received locally, dB.
    pub local_snr: i8,
    /// SNR of the last packet received by the peer, dB.
    pub peer_snr: i8,
}

impl RltStatus {
    /// Wire size.
    pub const SIZE: usize = 15;

    /// Decode a status indication payload.
    pub fn decode(data: &[u8]) -> HciResult<Self> {
        ensure_len(data, Self::SIZE, "RLT status")?;
        Ok(RltStatus {
            test_status: data[0],
            local_tx_counter: le_u16(data, 1),
            local_rx_counter: le_u16(data, 3),
            peer_tx_counter: le_u16(data, 5),
            peer_rx_counter: le_u16(data, 7),
            local_rssi: le_u16(data, 9) as i16,
            peer_rssi: le_u16(data, 11) as i16,
            local_snr: data[13] as i8,
            peer_snr: data[14] as i8,
        })
    }
}

/// Indications of the radio link test SAP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RltEvent {
    /// Periodic test status.
    Status(RltStatus),
    /// Any other message, or a status that failed to decode.
    Other(HciMessage),
}

impl RltEvent {
    fn from_message(msg: HciMessage) -> Self {
        if msg.msg_id != RLT_MSG_STATUS_IND {
            return RltEvent::Other(msg);
        }
        match RltStatus::decode(&msg.payload) {
            Ok(status) => RltEvent::Status(status),
            Err(e) => {
                warn!(error = %e, "malformed RLT status indication");
                RltEvent::Other(msg)
            }
        }
    }
}

/// Radio link test commands.
#[derive(Debug, Clone)]
pub struct RadioLinkTest {
    client: HciClient,
    timeout: Duration,
}

impl RadioLinkTest {
    /// Register the SAP; status indications go to `on_event`.
    pub fn attach<F>(client: HciClient, on_event: F) -> HciResult<Self>
    where
        F: Fn(RltEvent) + Send + Sync + 'static,
    {
        client.register_sap(Arc::new(EventSap::new(
            RLT_SAP_ID,
            "rlt",
            RltEvent::from_message,
            on_event,
        )))?;
        let timeout = client.config().default_timeout();
        Ok(RadioLinkTest { client, timeout })
    }

    /// Start a test run.
    pub fn start(&self, params: &RltParameters) -> HciResult<()> {
        let rsp = self
            .client
            .send_command(RLT_SAP_ID, RLT_MSG_START_REQ, params.encode(), self.timeout)?;
        check_status(&rsp)?;
        Ok(())
    }

    /// Stop the running test.
    pub fn stop(&self) -> HciResult<()> {
        let rsp = self
            .client
            .send_command(RLT_SAP_ID, RLT_MSG_STOP_REQ, Vec::new(), self.timeout)?;
        check_status(&rsp)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_parameters() {
        let params = RltParameters {
            dest_group_address: 0x10,
            dest_device_address: 0x1234,
            packet_size: 20,
            num_packets: 500,
            mode: RltMode::Repeated,
        };
        assert_eq!(params.encode(), vec![0x10, 0x34, 0x12, 20, 0xF4, 0x01, 0x01]);
    }

    #[test]
    fn test_decode_status() {
        let data = [
            0x01, 10, 0, 9, 0, 10, 0, 8, 0, 0xB5, 0xFF, 0xB0, 0xFF, 0x07, 0xFE,
        ];
        let status = RltStatus::decode(&data).unwrap();
        assert_eq!(status.test_status, 1);
        assert_eq!(status.local_tx_counter, 10);
        assert_eq!(status.peer_rx_counter, 8);
        assert_eq!(status.local_rssi, -75);
        assert_eq!(status.peer_rssi, -80);
        assert_eq!(status.local_snr, 7);
        assert_eq!(status.peer_snr, -2);
    }

    #[test]
    fn test_short_status_becomes_other() {
        let msg = HciMessage::new(RLT_SAP_ID, RLT_MSG_STATUS_IND, vec![0; 14]);
        assert_eq!(RltEvent::from_message(msg.clone()), RltEvent::Other(msg));
    }

    #[test]
    fn test_unrelated_message_is_other() {
        let msg = HciMessage::new(RLT_SAP_ID, 0x20, vec![1, 2]);
        assert!(matches!(RltEvent::from_message(msg), RltEvent::Other(_)));
    }
}

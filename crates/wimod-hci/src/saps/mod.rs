//! Typed adapters for the WiMOD service access points.
//!
//! Each adapter registers itself on an [`HciClient`](crate::HciClient),
//! turns typed requests into payload bytes and turns response and indication
//! payloads back into typed values. All multi-byte fields are little-endian.

pub mod devmgmt;
pub mod remote_ctrl;
pub mod rlt;
pub mod sensor_app;

pub use devmgmt::{DeviceInfo, DeviceManagement, FirmwareInfo, SystemStatus};
pub use remote_ctrl::{ButtonPressed, ButtonSet, RemoteControl, RemoteCtrlEvent};
pub use rlt::{RadioLinkTest, RltEvent, RltMode, RltParameters, RltStatus};
pub use sensor_app::{
    LinkQuality, SensorAck, SensorApp, SensorConfig, SensorData, SensorEvent, SensorMode,
};

use crate::constants::{RSP_STATUS_POS, STATUS_OK};
use crate::error::{HciError, HciResult};
use crate::message::HciMessage;
use crate::sap::ServiceAccessPoint;

/// SAP that decodes each indication into a typed event before handing it to
/// a callback.
pub(crate) struct EventSap<E, F> {
    sap_id: u8,
    name: &'static str,
    decode: fn(HciMessage) -> E,
    callback: F,
}

impl<E, F> EventSap<E, F>
where
    F: Fn(E) + Send + Sync,
{
    pub(crate) fn new(sap_id: u8, name: &'static str, decode: fn(HciMessage) -> E, callback: F) -> Self {
        EventSap {
            sap_id,
            name,
            decode,
            callback,
        }
    }
}

impl<E, F> ServiceAccessPoint for EventSap<E, F>
where
    F: Fn(E) + Send + Sync,
{
    fn sap_id(&self) -> u8 {
        self.sap_id
    }

    fn name(&self) -> &str {
        self.name
    }

    fn on_indication(&self, msg: HciMessage) {
        (self.callback)((self.decode)(msg))
    }
}

/// Check the status byte of a response and return the bytes after it.
pub(crate) fn check_status(rsp: &HciMessage) -> HciResult<&[u8]> {
    let status = rsp.payload.get(RSP_STATUS_POS).copied().ok_or_else(|| {
        HciError::InvalidResponse(format!(
            "response 0x{:02X} on SAP 0x{:02X} has no status byte",
            rsp.msg_id, rsp.sap_id
        ))
    })?;
    if status != STATUS_OK {
        return Err(HciError::Status {
            sap_id: rsp.sap_id,
            msg_id: rsp.msg_id,
            status,
        });
    }
    Ok(&rsp.payload[RSP_STATUS_POS + 1..])
}

/// Reject `data` when it is shorter than `expected`.
pub(crate) fn ensure_len(data: &[u8], expected: usize, what: &str) -> HciResult<()> {
    if data.len() < expected {
        return Err(HciError::InvalidResponse(format!(
            "{} needs {} bytes, got {}",
            what,
            expected,
            data.len()
        )));
    }
    Ok(())
}

pub(crate) fn le_u16(data: &[u8], i: usize) -> u16 {
    u16::from_le_bytes([data[i], data[i + 1]])
}

pub(crate) fn le_u32(data: &[u8], i: usize) -> u32 {
    u32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_status_ok() {
        let rsp = HciMessage::new(0x01, 0x04, vec![0x00, 0xAA, 0xBB]);
        assert_eq!(check_status(&rsp).unwrap(), &[0xAA, 0xBB]);
    }

    #[test]
    fn test_check_status_error() {
        let rsp = HciMessage::new(0x02, 0x02, vec![0x03]);
        assert_eq!(
            check_status(&rsp).unwrap_err(),
            HciError::Status {
                sap_id: 0x02,
                msg_id: 0x02,
                status: 0x03
            }
        );
    }

    #[test]
    fn test_check_status_empty_payload() {
        let rsp = HciMessage::new(0x01, 0x02, Vec::new());
        assert!(matches!(check_status(&rsp), Err(HciError::InvalidResponse(_))));
    }

    #[test]
    fn test_little_endian_helpers() {
        let data = [0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        assert_eq!(le_u16(&data, 0), 0x1234);
        assert_eq!(le_u32(&data, 2), 0x1234_5678);
        assert!(ensure_len(&data, 7, "test").is_err());
        assert!(ensure_len(&data, 6, "test").is_ok());
    }
}

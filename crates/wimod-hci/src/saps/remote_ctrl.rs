//! Remote control SAP.
//!
//! Indication-only: a paired remote device reports button presses.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use super::{ensure_len, le_u16, EventSap};
use crate::constants::*;
use crate::dispatcher::HciClient;
use crate::error::HciResult;
use crate::message::HciMessage;

/// Bitmap of pressed buttons.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ButtonSet(pub u8);

impl ButtonSet {
    /// Button 1.
    pub const ONE: ButtonSet = ButtonSet(1 << 0);
    /// Button 2.
    pub const TWO: ButtonSet = ButtonSet(1 << 1);
    /// Button 3.
    pub const THREE: ButtonSet = ButtonSet(1 << 2);

    /// Whether every button in `other` is pressed.
    pub fn contains(self, other: ButtonSet) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether no button is pressed.
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// 1-based numbers of the pressed buttons.
    pub fn pressed(self) -> impl Iterator<Item = u8> {
        (0..8u8).filter(move |bit| self.0 & (1 << bit) != 0).map(|bit| bit + 1)
    }
}

impl fmt::Debug for ButtonSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.pressed()).finish()
    }
}

/// A button press reported by a remote device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonPressed {
    /// Group the message was sent to.
    pub dest_group_address: u8,
    /// Device the message was sent to.
    pub dest_device_address: u16,
    /// Sender group.
    pub source_group_address: u8,
    /// Sender device.
    pub source_device_address: u16,
    /// Pressed buttons.
    pub buttons: ButtonSet,
}

impl ButtonPressed {
    /// Wire size.
    pub const SIZE: usize = 7;

    /// Decode a button-pressed indication payload.
    pub fn decode(data: &[u8]) -> HciResult<Self> {
        ensure_len(data, Self::SIZE, "button pressed indication")?;
        Ok(ButtonPressed {
            dest_group_address: data[0],
            dest_device_address: le_u16(data, 1),
            source_group_address: data[3],
            source_device_address: le_u16(data, 4),
            buttons: ButtonSet(data[6]),
        })
    }
}

/// Indications of the remote control SAP.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCtrlEvent {
    /// Buttons pressed on a remote device.
    ButtonPressed(ButtonPressed),
    /// Any other message, or a press that failed to decode.
    Other(HciMessage),
}

impl RemoteCtrlEvent {
    fn from_message(msg: HciMessage) -> Self {
        if msg.msg_id != REMOTE_CTRL_MSG_BUTTON_PRESSED_IND {
            return RemoteCtrlEvent::Other(msg);
        }
        match ButtonPressed::decode(&msg.payload) {
            Ok(press) => RemoteCtrlEvent::ButtonPressed(press),
            Err(e) => {
                warn!(error = %e, "malformed button pressed indication");
                RemoteCtrlEvent::Other(msg)
            }
        }
    }
}

/// Remote control listener.
#[derive(Debug, Clone)]
pub struct RemoteControl {
    client: HciClient,
}

impl RemoteControl {
    /// Register the SAP; button presses go to `on_event`.
    pub fn attach<F>(client: HciClient, on_event: F) -> HciResult<Self>
    where
        F: Fn(RemoteCtrlEvent) + Send + Sync + 'static,
    {
        client.register_sap(Arc::new(EventSap::new(
            REMOTECTRL_SAP_ID,
            "remote-ctrl",
            RemoteCtrlEvent::from_message,
            on_event,
        )))?;
        Ok(RemoteControl { client })
    }

    /// Client this listener is attached to.
    pub fn client(&self) -> &HciClient {
        &self.client
    }
}

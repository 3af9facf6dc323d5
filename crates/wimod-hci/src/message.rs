//! HCI message model and content codec.
//!
//! Message content is a fixed-width header followed by the payload. The
//! checksum is appended by [`HciCodec::encode_frame`]; escaping is left to the
//! SLIP layer.
//!
//! ```text
//! Compact: +--------+--------+----------------+
//!          | sap_id | msg_id | payload[0..N]  |
//!          +--------+--------+----------------+
//! Tagged:  +--------+--------+-----+----------------+
//!          | sap_id | msg_id | tag | payload[0..N]  |
//!          +--------+--------+-----+----------------+
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::constants::{COMPACT_HEADER_SIZE, CRC_SIZE, TAGGED_HEADER_SIZE};
use crate::crc;
use crate::error::DecodeError;

/// Header field layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeaderLayout {
    /// `[sap_id][msg_id]`, no correlation tag.
    #[default]
    Compact,
    /// `[sap_id][msg_id][tag]`.
    Tagged,
}

impl HeaderLayout {
    /// Header size in bytes.
    pub const fn header_size(self) -> usize {
        match self {
            HeaderLayout::Compact => COMPACT_HEADER_SIZE,
            HeaderLayout::Tagged => TAGGED_HEADER_SIZE,
        }
    }

    /// Whether the layout carries a correlation tag.
    pub const fn has_tag(self) -> bool {
        matches!(self, HeaderLayout::Tagged)
    }
}

/// Decoded header fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HciHeader {
    /// Subsystem (SAP) identifier.
    pub sap_id: u8,
    /// Message identifier within the SAP.
    pub msg_id: u8,
    /// Correlation tag, when the layout carries one.
    pub tag: Option<u8>,
}

/// A host/module message: header plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HciMessage {
    /// Subsystem (SAP) identifier.
    pub sap_id: u8,
    /// Message identifier within the SAP.
    pub msg_id: u8,
    /// Correlation tag, when the layout carries one.
    pub tag: Option<u8>,
    /// Payload bytes.
    pub payload: Bytes,
}

impl HciMessage {
    /// Create an untagged message.
    pub fn new(sap_id: u8, msg_id: u8, payload: impl Into<Bytes>) -> Self {
        HciMessage {
            sap_id,
            msg_id,
            tag: None,
            payload: payload.into(),
        }
    }

    /// Set the correlation tag.
    pub fn with_tag(mut self, tag: u8) -> Self {
        self.tag = Some(tag);
        self
    }

    /// Header fields of this message.
    pub fn header(&self) -> HciHeader {
        HciHeader {
            sap_id: self.sap_id,
            msg_id: self.msg_id,
            tag: self.tag,
        }
    }

    /// First payload byte, which by convention is the status of a response.
    pub fn status(&self) -> Option<u8> {
        self.payload.first().copied()
    }
}

/// Encodes messages to content/frames and decodes them back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HciCodec {
    layout: HeaderLayout,
    max_frame_size: usize,
}

impl HciCodec {
    /// Create a codec for the given header layout and frame size limit.
    pub fn new(layout: HeaderLayout, max_frame_size: usize) -> Self {
        HciCodec {
            layout,
            max_frame_size,
        }
    }

    /// Active header layout.
    pub fn layout(&self) -> HeaderLayout {
        self.layout
    }

    /// Largest payload that still fits in a frame.
    pub fn max_payload_len(&self) -> usize {
        self.max_frame_size
            .saturating_sub(self.layout.header_size() + CRC_SIZE)
    }

    /// Encode header and payload, without checksum.
    pub fn encode_content(&self, msg: &HciMessage) -> Result<Vec<u8>, DecodeError> {
        let total = self.layout.header_size() + msg.payload.len() + CRC_SIZE;
        if total > self.max_frame_size {
            return Err(DecodeError::TooLong {
                max: self.max_frame_size,
                actual: total,
            });
        }

        let mut buf = Vec::with_capacity(total);
        buf.push(msg.sap_id);
        buf.push(msg.msg_id);
        match (self.layout, msg.tag) {
            (HeaderLayout::Tagged, Some(tag)) => buf.push(tag),
            (HeaderLayout::Tagged, None) => return Err(DecodeError::TagRequired),
            (HeaderLayout::Compact, Some(_)) => return Err(DecodeError::TagNotSupported),
            (HeaderLayout::Compact, None) => {}
        }
        buf.extend_from_slice(&msg.payload);
        Ok(buf)
    }

    /// Encode header, payload and checksum: the unescaped frame.
    pub fn encode_frame(&self, msg: &HciMessage) -> Result<Vec<u8>, DecodeError> {
        let mut buf = self.encode_content(msg)?;
        crc::append(&mut buf);
        Ok(buf)
    }

    /// Decode header and payload from content without checksum.
    pub fn decode_content(&self, content: &[u8]) -> Result<HciMessage, DecodeError> {
        let header_size = self.layout.header_size();
        if content.len() < header_size {
            return Err(DecodeError::TooShort {
                expected: header_size,
                actual: content.len(),
            });
        }
        let tag = self.layout.has_tag().then(|| content[2]);
        Ok(HciMessage {
            sap_id: content[0],
            msg_id: content[1],
            tag,
            payload: Bytes::copy_from_slice(&content[header_size..]),
        })
    }

    /// Verify the checksum trailer, then decode.
    pub fn decode_frame(&self, frame: &[u8]) -> Result<HciMessage, DecodeError> {
        let content = crc::split_checked(frame)?;
        self.decode_content(content)
    }
}

impl Default for HciCodec {
    fn default() -> Self {
        HciCodec::new(
            HeaderLayout::Compact,
            crate::constants::DEFAULT_MAX_FRAME_SIZE,
        )
    }
}

//! Error types for the HCI core.
//!
//! Framing, checksum and decode errors are recovered inside the decode path
//! and only show up as diagnostic counters. [`HciError`] is what command
//! callers and SAP adapters see.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by the SLIP decoder while delimiting frames.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FramingError {
    /// ESC was followed by a byte that is neither ESC_END nor ESC_ESC.
    #[error("invalid escape sequence: ESC followed by 0x{0:02X}")]
    InvalidEscape(u8),

    /// The in-progress frame grew beyond the configured maximum.
    #[error("frame exceeds maximum size of {max} bytes")]
    Oversized {
        /// Maximum allowed unescaped length.
        max: usize,
    },
}

/// CRC16 verification failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChecksumError {
    /// Frame too short to even carry a checksum.
    #[error("frame too short for checksum: {0} bytes")]
    Truncated(usize),

    /// Computed and received checksums differ.
    #[error("checksum mismatch: computed 0x{computed:04X}, received 0x{received:04X}")]
    Mismatch {
        /// Checksum computed over the frame content.
        computed: u16,
        /// Checksum carried in the frame trailer.
        received: u16,
    },
}

/// Errors decoding or encoding HCI message content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Content is shorter than the header.
    #[error("message too short: expected at least {expected} bytes, got {actual}")]
    TooShort {
        /// Minimum header size for the active layout.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Encoded frame would exceed the maximum frame size.
    #[error("message too long: maximum {max} bytes, got {actual}")]
    TooLong {
        /// Maximum frame size.
        max: usize,
        /// Size the frame would have.
        actual: usize,
    },

    /// A correlation tag was supplied but the header layout has no tag field.
    #[error("header layout has no correlation tag field")]
    TagNotSupported,

    /// The header layout has a correlation tag field but the message has no tag.
    #[error("header layout requires a correlation tag")]
    TagRequired,

    /// Frame failed checksum verification.
    #[error(transparent)]
    Checksum(#[from] ChecksumError),
}

/// Errors surfaced to command callers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HciError {
    /// The SAP already has an outstanding command.
    #[error("SAP 0x{sap_id:02X} is busy with an outstanding command")]
    Busy {
        /// Target SAP.
        sap_id: u8,
    },

    /// No matching response arrived before the deadline.
    #[error("command 0x{msg_id:02X} to SAP 0x{sap_id:02X} timed out after {timeout:?}")]
    Timeout {
        /// Target SAP.
        sap_id: u8,
        /// Request message id.
        msg_id: u8,
        /// Timeout the command was issued with.
        timeout: Duration,
    },

    /// The command was cancelled by its caller.
    #[error("command to SAP 0x{sap_id:02X} was cancelled")]
    Cancelled {
        /// Target SAP.
        sap_id: u8,
    },

    /// The transport closed or failed; the core instance is no longer usable.
    #[error("transport closed")]
    TransportClosed,

    /// No SAP is registered under this id.
    #[error("no SAP registered for id 0x{0:02X}")]
    UnknownSap(u8),

    /// A SAP is already registered under this id.
    #[error("SAP 0x{0:02X} is already registered")]
    AlreadyRegistered(u8),

    /// Message could not be encoded.
    #[error("codec error: {0}")]
    Codec(#[from] DecodeError),

    /// Transport write failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The module answered with a non-OK status byte.
    #[error("SAP 0x{sap_id:02X} message 0x{msg_id:02X} returned status 0x{status:02X}")]
    Status {
        /// Responding SAP.
        sap_id: u8,
        /// Response message id.
        msg_id: u8,
        /// Status byte.
        status: u8,
    },

    /// A response payload could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Configuration rejected by validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<std::io::Error> for HciError {
    fn from(err: std::io::Error) -> Self {
        HciError::Io(err.to_string())
    }
}

/// Result type alias for HCI operations.
pub type HciResult<T> = Result<T, HciError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_use_hex_ids() {
        let err = HciError::Busy { sap_id: 0x02 };
        assert_eq!(err.to_string(), "SAP 0x02 is busy with an outstanding command");

        let err = HciError::Status {
            sap_id: 0x01,
            msg_id: 0x02,
            status: 0x03,
        };
        assert!(err.to_string().contains("status 0x03"));
    }

    #[test]
    fn test_checksum_error_converts_to_decode_error() {
        let err: DecodeError = ChecksumError::Mismatch {
            computed: 0x1234,
            received: 0x4321,
        }
        .into();
        assert!(matches!(err, DecodeError::Checksum(_)));
        assert!(err.to_string().contains("0x1234"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
        let err: HciError = io.into();
        assert!(matches!(err, HciError::Io(ref msg) if msg.contains("pipe gone")));
    }
}

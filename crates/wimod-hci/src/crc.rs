//! CRC16 checksum engine.
//!
//! CRC-16/X-25: CCITT polynomial processed bit-reflected (0x8408), initial
//! value 0xFFFF, final XOR 0xFFFF. The checksum is appended least-significant
//! byte first.
//!
//! ```text
//! +--------+--------+-------------+--------+--------+
//! | sap_id | msg_id | payload ... | crc_lo | crc_hi |
//! +--------+--------+-------------+--------+--------+
//! ```

use crate::constants::CRC_SIZE;
use crate::error::ChecksumError;

const INIT: u16 = 0xFFFF;
const POLY_REFLECTED: u16 = 0x8408;

/// Residue left by running the unfinalized CRC over `content || crc`.
pub const GOOD_RESIDUE: u16 = 0xF0B8;

const TABLE: [u16; 256] = build_table();

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ POLY_REFLECTED;
            } else {
                crc >>= 1;
            }
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

/// Run the reflected CRC register over `bytes` without final XOR.
pub fn update(mut crc: u16, bytes: &[u8]) -> u16 {
    for &b in bytes {
        crc = (crc >> 8) ^ TABLE[((crc ^ b as u16) & 0xFF) as usize];
    }
    crc
}

/// Compute the checksum of `bytes`.
pub fn compute(bytes: &[u8]) -> u16 {
    !update(INIT, bytes)
}

/// Append the checksum of the current buffer contents.
pub fn append(buf: &mut Vec<u8>) {
    let crc = compute(buf);
    buf.extend_from_slice(&crc.to_le_bytes());
}

/// Verify a frame whose last two bytes are its checksum and return the
/// content without the trailer.
pub fn split_checked(frame: &[u8]) -> Result<&[u8], ChecksumError> {
    if frame.len() < CRC_SIZE {
        return Err(ChecksumError::Truncated(frame.len()));
    }
    let (content, trailer) = frame.split_at(frame.len() - CRC_SIZE);
    let received = u16::from_le_bytes([trailer[0], trailer[1]]);
    let computed = compute(content);
    if computed != received {
        return Err(ChecksumError::Mismatch { computed, received });
    }
    Ok(content)
}

/// Check whether a frame carries a valid checksum trailer.
pub fn verify(frame: &[u8]) -> bool {
    split_checked(frame).is_ok()
}

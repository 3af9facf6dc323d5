//! SLIP byte framer.
//!
//! Frames are delimited by END. Literal END and ESC bytes inside a frame are
//! sent as two-byte escape sequences:
//!
//! ```text
//! END  -> ESC ESC_END
//! ESC  -> ESC ESC_ESC
//! ```
//!
//! The encoder emits END before and after each frame so a receiver that joined
//! mid-stream resynchronizes on the very next frame. The decoder is fed one
//! byte at a time and keeps its escape state across calls.

use bytes::BytesMut;
use serde::{Deserialize, Serialize};

use crate::constants::{SLIP_END, SLIP_ESC, SLIP_ESC_END, SLIP_ESC_ESC};
use crate::error::FramingError;

/// Marker byte values used for framing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SlipMarkers {
    /// Frame delimiter.
    pub end: u8,
    /// Escape introducer.
    pub esc: u8,
    /// Byte following ESC that stands for a literal END.
    pub esc_end: u8,
    /// Byte following ESC that stands for a literal ESC.
    pub esc_esc: u8,
}

impl Default for SlipMarkers {
    fn default() -> Self {
        SlipMarkers {
            end: SLIP_END,
            esc: SLIP_ESC,
            esc_end: SLIP_ESC_END,
            esc_esc: SLIP_ESC_ESC,
        }
    }
}

impl SlipMarkers {
    /// Check that the markers describe an invertible encoding.
    pub fn validate(&self) -> Result<(), String> {
        if self.end == self.esc {
            return Err(format!("END and ESC must differ (both 0x{:02X})", self.end));
        }
        if self.esc_end == self.esc_esc {
            return Err(format!(
                "ESC_END and ESC_ESC must differ (both 0x{:02X})",
                self.esc_end
            ));
        }
        if self.esc_end == self.end || self.esc_esc == self.end {
            return Err("escape successors must not be the END marker".to_string());
        }
        Ok(())
    }
}

/// Escape `content` and wrap it in END markers.
pub fn encode(content: &[u8], markers: &SlipMarkers) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + content.len() / 8 + 2);
    out.push(markers.end);
    for &b in content {
        if b == markers.end {
            out.push(markers.esc);
            out.push(markers.esc_end);
        } else if b == markers.esc {
            out.push(markers.esc);
            out.push(markers.esc_esc);
        } else {
            out.push(b);
        }
    }
    out.push(markers.end);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecoderState {
    /// Accumulating frame bytes.
    Collecting,
    /// Previous byte was ESC.
    Escaped,
    /// Current frame was rejected; skipping to the next END.
    Discarding,
}

/// Incremental SLIP decoder.
#[derive(Debug)]
pub struct SlipDecoder {
    markers: SlipMarkers,
    max_frame_size: usize,
    buffer: BytesMut,
    state: DecoderState,
}

impl SlipDecoder {
    /// Create a decoder that rejects frames longer than `max_frame_size`
    /// unescaped bytes.
    pub fn new(markers: SlipMarkers, max_frame_size: usize) -> Self {
        SlipDecoder {
            markers,
            max_frame_size,
            buffer: BytesMut::with_capacity(max_frame_size.min(4096)),
            state: DecoderState::Collecting,
        }
    }

    /// Feed a single byte.
    ///
    /// Returns `Some(Ok(frame))` when an END completes a non-empty frame and
    /// `Some(Err(_))` at the byte that made the current frame invalid. After an
    /// error, bytes are skipped until the next END.
    pub fn push_byte(&mut self, byte: u8) -> Option<Result<Vec<u8>, FramingError>> {
        match self.state {
            DecoderState::Discarding => {
                if byte == self.markers.end {
                    self.state = DecoderState::Collecting;
                }
                None
            }
            DecoderState::Escaped => {
                let literal = if byte == self.markers.esc_end {
                    self.markers.end
                } else if byte == self.markers.esc_esc {
                    self.markers.esc
                } else {
                    self.buffer.clear();
                    // ESC END still terminates the broken frame.
                    self.state = if byte == self.markers.end {
                        DecoderState::Collecting
                    } else {
                        DecoderState::Discarding
                    };
                    return Some(Err(FramingError::InvalidEscape(byte)));
                };
                self.state = DecoderState::Collecting;
                self.append(literal)
            }
            DecoderState::Collecting => {
                if byte == self.markers.end {
                    if self.buffer.is_empty() {
                        return None;
                    }
                    let frame = self.buffer.split().to_vec();
                    Some(Ok(frame))
                } else if byte == self.markers.esc {
                    self.state = DecoderState::Escaped;
                    None
                } else {
                    self.append(byte)
                }
            }
        }
    }

    /// Feed a chunk of bytes, collecting every completed frame or error in order.
    pub fn push(&mut self, data: &[u8]) -> Vec<Result<Vec<u8>, FramingError>> {
        data.iter().filter_map(|&b| self.push_byte(b)).collect()
    }

    /// Number of unescaped bytes held for the in-progress frame.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Whether the decoder is holding an ESC awaiting its successor.
    pub fn is_escaped(&self) -> bool {
        self.state == DecoderState::Escaped
    }

    /// Drop any partial frame and return to the initial state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = DecoderState::Collecting;
    }

    fn append(&mut self, byte: u8) -> Option<Result<Vec<u8>, FramingError>> {
        if self.buffer.len() >= self.max_frame_size {
            self.buffer.clear();
            self.state = DecoderState::Discarding;
            return Some(Err(FramingError::Oversized {
                max: self.max_frame_size,
            }));
        }
        self.buffer.extend_from_slice(&[byte]);
        None
    }
}

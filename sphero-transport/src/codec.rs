//! Packet codec for the API v2 wire format.
//!
//! Wire format:
//! ```text
//! ┌─────┬───────┬───────┬───────┬────────┬─────┬─────┬──────────┬─────┬─────┐
//! │ SOP │ flags │ [tid] │ [sid] │ device │ cmd │ seq │ payload… │ chk │ EOP │
//! │ 8D  │       │ opt.  │ opt.  │        │     │     │          │     │ D8  │
//! └─────┴───────┴───────┴───────┴────────┴─────┴─────┴──────────┴─────┴─────┘
//! ```
//!
//! Everything between the markers is escaped: a byte equal to SOP, EOP or
//! ESC is sent as `ESC, byte & !0x88`. The checksum is the complement of the
//! byte sum of the unescaped body. There is no length field, so the decoder
//! only learns where the payload ends (and which byte is the checksum) when
//! the end marker arrives.

use thiserror::Error;
use tracing::trace;

use crate::protocol::{flags, framing};
use crate::types::Correlation;

/// Fixed header length when no target/source id is present
const BASE_HEADER_LEN: usize = 4;

/// Inbound frame rejected by the decoder
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Invalid escape sequence (0x{0:02X} after escape byte)")]
    InvalidEscape(u8),

    #[error("Start marker inside an unterminated frame")]
    UnexpectedStart,

    #[error("End marker outside a frame")]
    UnexpectedEnd,

    #[error("Frame too short: {len} bytes, need at least {min}")]
    TooShort { len: usize, min: usize },

    #[error("Checksum mismatch: expected 0x{expected:02X}, got 0x{actual:02X}")]
    Checksum { expected: u8, actual: u8 },

    #[error("Frame exceeds {0} bytes")]
    Overflow(usize),
}

/// Result of one completed frame
pub type DecodeOutcome = Result<Packet, ParseError>;

/// A decoded, checksum-verified inbound packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub flags: u8,
    pub target_id: Option<u8>,
    pub source_id: Option<u8>,
    pub device_id: u8,
    pub command_id: u8,
    pub sequence: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn correlation(&self) -> Correlation {
        Correlation {
            device_id: self.device_id,
            command_id: self.command_id,
            sequence: self.sequence,
        }
    }

    pub fn is_response(&self) -> bool {
        self.flags & flags::IS_RESPONSE != 0
    }

    /// Error code carried by response packets in their first payload byte
    pub fn response_code(&self) -> Option<u8> {
        if self.is_response() {
            self.payload.first().copied()
        } else {
            None
        }
    }

    /// Payload without the response code
    pub fn data(&self) -> &[u8] {
        if self.is_response() && !self.payload.is_empty() {
            &self.payload[1..]
        } else {
            &self.payload
        }
    }
}

/// Complement-of-sum checksum over unescaped body bytes
pub fn checksum(bytes: &[u8]) -> u8 {
    !bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

fn escape_into(byte: u8, out: &mut Vec<u8>) {
    if framing::is_reserved(byte) {
        out.push(framing::ESCAPE);
        out.push(byte & !framing::ESCAPE_MASK);
    } else {
        out.push(byte);
    }
}

/// Frame an unescaped body: append checksum, escape, add markers
pub fn frame(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + body.len() / 4 + 4);
    out.push(framing::START_OF_PACKET);
    for &b in body {
        escape_into(b, &mut out);
    }
    escape_into(checksum(body), &mut out);
    out.push(framing::END_OF_PACKET);
    out
}

/// Encode a packet with explicit flags
pub fn encode_with_flags(
    packet_flags: u8,
    device_id: u8,
    command_id: u8,
    sequence: u8,
    payload: &[u8],
) -> Vec<u8> {
    let mut body = Vec::with_capacity(BASE_HEADER_LEN + payload.len());
    body.extend_from_slice(&[packet_flags, device_id, command_id, sequence]);
    body.extend_from_slice(payload);
    frame(&body)
}

/// Encode an outgoing command
pub fn encode(device_id: u8, command_id: u8, sequence: u8, payload: &[u8]) -> Vec<u8> {
    encode_with_flags(flags::COMMAND, device_id, command_id, sequence, payload)
}

fn header_len(packet_flags: u8) -> usize {
    let mut len = BASE_HEADER_LEN;
    if packet_flags & flags::HAS_TARGET_ID != 0 {
        len += 1;
    }
    if packet_flags & flags::HAS_SOURCE_ID != 0 {
        len += 1;
    }
    len
}

/// Decoder state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderState {
    /// Discarding bytes until a start marker
    AwaitingStart,
    /// Collecting flags, optional ids, device, command and sequence
    ReadingHeader,
    /// Collecting payload; the last byte seen is the checksum candidate
    ReadingPayload,
}

/// Streaming packet decoder, fed one byte at a time
pub struct PacketDecoder {
    state: DecoderState,
    buffer: Vec<u8>,
    escaping: bool,
}

impl Default for PacketDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl PacketDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::AwaitingStart,
            buffer: Vec::with_capacity(32),
            escaping: false,
        }
    }

    pub fn state(&self) -> DecoderState {
        self.state
    }

    /// Drop any partial frame
    pub fn reset(&mut self) {
        self.state = DecoderState::AwaitingStart;
        self.buffer.clear();
        self.escaping = false;
    }

    fn begin(&mut self) {
        self.reset();
        self.state = DecoderState::ReadingHeader;
    }

    /// Feed a chunk, collecting every outcome it completes
    pub fn feed(&mut self, data: &[u8]) -> Vec<DecodeOutcome> {
        data.iter().filter_map(|&b| self.push(b)).collect()
    }

    /// Feed one byte. Returns an outcome when a frame completes or fails.
    pub fn push(&mut self, byte: u8) -> Option<DecodeOutcome> {
        match byte {
            framing::START_OF_PACKET => {
                let interrupted = self.state != DecoderState::AwaitingStart;
                self.begin();
                return interrupted.then_some(Err(ParseError::UnexpectedStart));
            }
            framing::END_OF_PACKET => {
                if self.state == DecoderState::AwaitingStart {
                    return Some(Err(ParseError::UnexpectedEnd));
                }
                let outcome = if self.escaping {
                    Err(ParseError::InvalidEscape(framing::END_OF_PACKET))
                } else {
                    self.finish()
                };
                self.reset();
                return Some(outcome);
            }
            _ if self.state == DecoderState::AwaitingStart => {
                trace!("Discarding 0x{:02X} outside frame", byte);
                return None;
            }
            framing::ESCAPE => {
                if self.escaping {
                    self.reset();
                    return Some(Err(ParseError::InvalidEscape(framing::ESCAPE)));
                }
                self.escaping = true;
                return None;
            }
            _ => {}
        }

        let byte = if self.escaping {
            self.escaping = false;
            match byte {
                framing::ESCAPED_START_OF_PACKET
                | framing::ESCAPED_END_OF_PACKET
                | framing::ESCAPED_ESCAPE => byte | framing::ESCAPE_MASK,
                other => {
                    self.reset();
                    return Some(Err(ParseError::InvalidEscape(other)));
                }
            }
        } else {
            byte
        };

        if self.buffer.len() >= framing::MAX_FRAME_LEN {
            self.reset();
            return Some(Err(ParseError::Overflow(framing::MAX_FRAME_LEN)));
        }
        self.buffer.push(byte);

        if self.state == DecoderState::ReadingHeader
            && self.buffer.len() >= header_len(self.buffer[0])
        {
            self.state = DecoderState::ReadingPayload;
        }
        None
    }

    fn finish(&self) -> DecodeOutcome {
        let body = &self.buffer;
        let min = body.first().map_or(BASE_HEADER_LEN, |&f| header_len(f)) + 1;
        if body.len() < min {
            return Err(ParseError::TooShort {
                len: body.len(),
                min,
            });
        }

        let (content, tail) = body.split_at(body.len() - 1);
        let expected = checksum(content);
        if tail[0] != expected {
            return Err(ParseError::Checksum {
                expected,
                actual: tail[0],
            });
        }

        let packet_flags = content[0];
        let mut pos = 1;
        let mut take_if = |present: bool| {
            present.then(|| {
                let v = content[pos];
                pos += 1;
                v
            })
        };
        let target_id = take_if(packet_flags & flags::HAS_TARGET_ID != 0);
        let source_id = take_if(packet_flags & flags::HAS_SOURCE_ID != 0);

        Ok(Packet {
            flags: packet_flags,
            target_id,
            source_id,
            device_id: content[pos],
            command_id: content[pos + 1],
            sequence: content[pos + 2],
            payload: content[pos + 3..].to_vec(),
        })
    }
}

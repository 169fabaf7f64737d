//! WebSocket frame types and codec
//!
//! Wire layout (RFC 6455 Section 5.2):
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```

use super::{Error, Result, MAX_PAYLOAD_SIZE};
use bytes::{BufMut, Bytes, BytesMut};
use std::fmt;

/// FIN bit of the first header byte
pub const FINAL_BIT: u8 = 0x80;

/// MASK bit of the second header byte
pub const MASK_BIT: u8 = 0x80;

/// Length marker: a 16-bit length follows
pub const PAYLOAD_LEN_16: u8 = 126;

/// Length marker: a 64-bit length follows
pub const PAYLOAD_LEN_64: u8 = 127;

/// Largest length that fits the 7-bit field
pub const MAX_SHORT_PAYLOAD: usize = 125;

/// Frame opcodes (RFC 6455 Section 11.8)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    /// Continuation of a fragmented message (0x0)
    Continuation = 0x0,
    /// UTF-8 text message (0x1)
    Text = 0x1,
    /// Binary message (0x2)
    Binary = 0x2,
    /// Close control frame (0x8)
    Close = 0x8,
    /// Ping control frame (0x9)
    Ping = 0x9,
    /// Pong control frame (0xA)
    Pong = 0xA,
}

impl Opcode {
    /// Convert opcode to u8
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Create opcode from the low nibble of a header byte
    pub fn from_u8(byte: u8) -> Option<Self> {
        match byte {
            0x0 => Some(Opcode::Continuation),
            0x1 => Some(Opcode::Text),
            0x2 => Some(Opcode::Binary),
            0x8 => Some(Opcode::Close),
            0x9 => Some(Opcode::Ping),
            0xA => Some(Opcode::Pong),
            _ => None,
        }
    }

    /// Whether this is a control opcode
    pub fn is_control(self) -> bool {
        self.as_u8() & 0x8 != 0
    }

    /// Get opcode name
    pub fn name(&self) -> &'static str {
        match self {
            Opcode::Continuation => "CONTINUATION",
            Opcode::Text => "TEXT",
            Opcode::Binary => "BINARY",
            Opcode::Close => "CLOSE",
            Opcode::Ping => "PING",
            Opcode::Pong => "PONG",
        }
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:x})", self.name(), self.as_u8())
    }
}

/// A single WebSocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// FIN flag
    pub is_final: bool,
    /// Frame opcode
    pub opcode: Opcode,
    /// Unmasked payload, `None` when empty
    pub payload: Option<Bytes>,
}

impl Frame {
    /// Create a new frame
    pub fn new(is_final: bool, opcode: Opcode, payload: Option<Bytes>) -> Self {
        Frame {
            is_final,
            opcode,
            payload: payload.filter(|p| !p.is_empty()),
        }
    }

    /// Final text frame
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(true, Opcode::Text, Some(payload.into()))
    }

    /// Final binary frame
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(true, Opcode::Binary, Some(payload.into()))
    }

    /// Close frame carrying a status code and reason
    pub fn close(code: u16, reason: &str) -> Self {
        let mut payload = BytesMut::with_capacity(2 + reason.len());
        payload.put_u16(code);
        payload.put_slice(reason.as_bytes());
        Self::new(true, Opcode::Close, Some(payload.freeze()))
    }

    /// Payload bytes (empty if none)
    pub fn payload(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }

    /// Get payload size
    pub fn payload_len(&self) -> usize {
        self.payload().len()
    }

    /// Status code of a close frame, if it carries one
    pub fn close_code(&self) -> Option<u16> {
        match (self.opcode, self.payload()) {
            (Opcode::Close, [hi, lo, ..]) => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        }
    }
}

/// Frame encoder/decoder
pub struct FrameCodec;

impl FrameCodec {
    /// Encode a server-to-client frame (never masked)
    pub fn encode(frame: &Frame) -> Bytes {
        let payload = frame.payload();
        let mut buf = BytesMut::with_capacity(payload.len() + 10);
        Self::encode_header(&mut buf, frame.is_final, frame.opcode, false, payload.len());
        buf.put_slice(payload);
        buf.freeze()
    }

    /// Encode a frame the way a client sends it, masked with `mask`
    pub fn encode_masked(frame: &Frame, mask: [u8; 4]) -> Bytes {
        let payload = frame.payload();
        let mut buf = BytesMut::with_capacity(payload.len() + 14);
        Self::encode_header(&mut buf, frame.is_final, frame.opcode, true, payload.len());
        buf.put_slice(&mask);
        buf.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
        buf.freeze()
    }

    /// Write the FIN/opcode byte and the length field
    fn encode_header(buf: &mut BytesMut, is_final: bool, opcode: Opcode, masked: bool, length: usize) {
        let first = if is_final { FINAL_BIT } else { 0 } | opcode.as_u8();
        let mask_bit = if masked { MASK_BIT } else { 0 };

        buf.put_u8(first);
        match length {
            n if n <= MAX_SHORT_PAYLOAD => buf.put_u8(mask_bit | n as u8),
            n if n <= u16::MAX as usize => {
                buf.put_u8(mask_bit | PAYLOAD_LEN_16);
                buf.put_u16(n as u16);
            }
            n => {
                buf.put_u8(mask_bit | PAYLOAD_LEN_64);
                buf.put_u64(n as u64);
            }
        }
    }

    /// Decode one frame from the front of `buf`
    ///
    /// Returns the frame and the number of bytes it occupied, or `Ok(None)`
    /// if `buf` does not hold a whole frame yet. The payload is unmasked if
    /// the MASK bit is set. A frame with an unknown opcode decodes as a
    /// close frame without payload.
    pub fn decode(buf: &[u8]) -> Result<Option<(Frame, usize)>> {
        if buf.len() < 2 {
            return Ok(None);
        }

        let is_final = buf[0] & FINAL_BIT != 0;
        let opcode = Opcode::from_u8(buf[0] & 0x0F);
        let masked = buf[1] & MASK_BIT != 0;

        let (length, mut offset) = match buf[1] & 0x7F {
            PAYLOAD_LEN_16 => match buf.get(2..4) {
                Some(bytes) => (Self::accumulate(bytes), 4),
                None => return Ok(None),
            },
            PAYLOAD_LEN_64 => match buf.get(2..10) {
                Some(bytes) => (Self::accumulate(bytes), 10),
                None => return Ok(None),
            },
            n => (n as u64, 2),
        };

        if length > MAX_PAYLOAD_SIZE {
            return Err(Error::FrameTooLarge(length));
        }
        let length = length as usize;

        let mask = if masked {
            let Some(key) = buf.get(offset..offset + 4) else {
                return Ok(None);
            };
            offset += 4;
            Some([key[0], key[1], key[2], key[3]])
        } else {
            None
        };

        let Some(data) = buf.get(offset..offset + length) else {
            return Ok(None);
        };
        let consumed = offset + length;

        let Some(opcode) = opcode else {
            return Ok(Some((Frame::new(is_final, Opcode::Close, None), consumed)));
        };

        let payload: Bytes = match mask {
            Some(mask) => data
                .iter()
                .enumerate()
                .map(|(i, b)| b ^ mask[i % 4])
                .collect::<Vec<u8>>()
                .into(),
            None => Bytes::copy_from_slice(data),
        };

        Ok(Some((Frame::new(is_final, opcode, Some(payload)), consumed)))
    }

    /// Big-endian length: shift left and OR in each byte
    fn accumulate(bytes: &[u8]) -> u64 {
        bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
    }
}

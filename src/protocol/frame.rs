//! WebSocket frame parsing and serialization (RFC 6455).
//!
//! The header is split out as [`FrameHeader`] so the incremental decoder in
//! [`crate::codec`] can validate the first bytes of a frame before the rest
//! of it has arrived.

use crate::error::{Error, Result};
use crate::protocol::OpCode;
use crate::protocol::mask::{apply_mask, apply_mask_fast};

/// Maximum payload size for control frames (RFC 6455).
pub const MAX_CONTROL_FRAME_PAYLOAD: usize = 125;

const FIN_BIT: u8 = 0b1000_0000;
const RSV_BITS: u8 = 0b0111_0000;
const OPCODE_BITS: u8 = 0b0000_1111;
const MASK_BIT: u8 = 0b1000_0000;
const LENGTH_BITS: u8 = 0b0111_1111;

const LENGTH_16BIT: u8 = 126;
const LENGTH_64BIT: u8 = 127;

/// Decoded fixed part of a frame header: everything up to, but not
/// including, the masking key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Final fragment flag.
    pub fin: bool,
    /// Frame opcode.
    pub opcode: OpCode,
    /// Whether a 4-byte masking key follows the length field.
    pub masked: bool,
    /// Real payload length (after extended length decoding).
    pub payload_len: usize,
}

impl FrameHeader {
    /// Number of extended payload length bytes announced by the second
    /// header byte (0, 2 or 8).
    #[inline]
    #[must_use]
    pub const fn extended_len_size(byte1: u8) -> usize {
        match byte1 & LENGTH_BITS {
            LENGTH_16BIT => 2,
            LENGTH_64BIT => 8,
            _ => 0,
        }
    }

    /// Check the first header byte: reserved bits must be zero and the
    /// opcode must be known.
    ///
    /// # Errors
    ///
    /// - `Error::ReservedBitsSet` if any of RSV1..RSV3 is set
    /// - `Error::ReservedOpcode` for an unknown opcode
    pub fn check_first_byte(byte0: u8) -> Result<OpCode> {
        if byte0 & RSV_BITS != 0 {
            return Err(Error::ReservedBitsSet);
        }
        OpCode::from_u8(byte0 & OPCODE_BITS)
    }

    /// Decode a header from `buf`, which must start at the first header
    /// byte. Bytes past the length field are ignored.
    ///
    /// # Errors
    ///
    /// - `Error::IncompleteFrame` if the length field is not complete yet
    /// - `Error::ReservedBitsSet` / `Error::ReservedOpcode` for invalid first bytes
    /// - `Error::PayloadTooLargeForPlatform` if the 64-bit length does not fit `usize`
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() < 2 {
            return Err(Error::IncompleteFrame {
                needed: 2 - buf.len(),
            });
        }

        let opcode = Self::check_first_byte(buf[0])?;
        let fin = buf[0] & FIN_BIT != 0;
        let masked = buf[1] & MASK_BIT != 0;

        let header_len = 2 + Self::extended_len_size(buf[1]);
        if buf.len() < header_len {
            return Err(Error::IncompleteFrame {
                needed: header_len - buf.len(),
            });
        }

        let payload_len = match buf[1] & LENGTH_BITS {
            LENGTH_16BIT => u16::from_be_bytes([buf[2], buf[3]]) as usize,
            LENGTH_64BIT => {
                let len_u64 = u64::from_be_bytes([
                    buf[2], buf[3], buf[4], buf[5], buf[6], buf[7], buf[8], buf[9],
                ]);
                usize::try_from(len_u64).map_err(|_| Error::PayloadTooLargeForPlatform {
                    size: len_u64,
                    max: usize::MAX as u64,
                })?
            }
            short => short as usize,
        };

        Ok(Self {
            fin,
            opcode,
            masked,
            payload_len,
        })
    }

    /// Length of the masking key that follows the fixed header.
    #[inline]
    #[must_use]
    pub const fn mask_len(&self) -> usize {
        if self.masked { 4 } else { 0 }
    }
}

/// A WebSocket frame as defined in RFC 6455.
///
/// ## Frame Structure
///
/// ```text
///  0                   1                   2                   3
///  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |F|R|R|R| opcode |M| Payload len |    Extended payload length    |
/// |I|S|S|S|  (4)   |A|     (7)     |             (16/64)           |
/// |N|V|V|V|       |S|             |   (if payload len==126/127)   |
/// | |1|2|3|       |K|             |                               |
/// +-+-+-+-+-------+-+-------------+-------------------------------+
/// |                         Masking key (if present)              |
/// +---------------------------------------------------------------+
/// |                     Payload data                              |
/// +---------------------------------------------------------------+
/// ```
///
/// Reserved bits are always written as zero and rejected on decode, so
/// they are not represented here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Final fragment flag. True if this is the last fragment of a message.
    pub fin: bool,
    /// Frame opcode defining the interpretation of payload data.
    pub opcode: OpCode,
    payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame with the given parameters.
    #[must_use]
    pub fn new(fin: bool, opcode: OpCode, payload: Vec<u8>) -> Self {
        Self {
            fin,
            opcode,
            payload,
        }
    }

    /// Create a text frame.
    #[must_use]
    pub fn text(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Text, data.into())
    }

    /// Create a binary frame.
    #[must_use]
    pub fn binary(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Binary, data.into())
    }

    /// Create a close frame with optional status code and reason.
    #[must_use]
    pub fn close(code: Option<u16>, reason: &str) -> Self {
        let payload = if let Some(code) = code {
            let mut data = code.to_be_bytes().to_vec();
            data.extend_from_slice(reason.as_bytes());
            data
        } else {
            Vec::new()
        };
        Self::new(true, OpCode::Close, payload)
    }

    /// Create a ping frame.
    #[must_use]
    pub fn ping(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Ping, data.into())
    }

    /// Create a pong frame.
    #[must_use]
    pub fn pong(data: impl Into<Vec<u8>>) -> Self {
        Self::new(true, OpCode::Pong, data.into())
    }

    /// Get the payload bytes.
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Take ownership of the payload.
    #[must_use]
    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Parse a complete frame from a contiguous buffer.
    ///
    /// Returns the parsed frame and the number of bytes consumed.
    ///
    /// ## Errors
    ///
    /// - `Error::IncompleteFrame` if not enough data is available
    /// - `Error::ReservedBitsSet` if a reserved bit is set
    /// - `Error::ReservedOpcode` if the opcode is unknown
    pub fn parse(buf: &[u8]) -> Result<(Self, usize)> {
        let header = FrameHeader::decode(buf)?;
        let mask_offset = 2 + FrameHeader::extended_len_size(buf[1]);
        let payload_start = mask_offset + header.mask_len();

        let total_size = payload_start.checked_add(header.payload_len).ok_or(
            Error::PayloadTooLargeForPlatform {
                size: header.payload_len as u64,
                max: usize::MAX as u64,
            },
        )?;

        if buf.len() < total_size {
            return Err(Error::IncompleteFrame {
                needed: total_size - buf.len(),
            });
        }

        let mut payload = buf[payload_start..total_size].to_vec();
        if header.masked {
            let mask = [
                buf[mask_offset],
                buf[mask_offset + 1],
                buf[mask_offset + 2],
                buf[mask_offset + 3],
            ];
            apply_mask_fast(&mut payload, mask);
        }

        Ok((Frame::new(header.fin, header.opcode, payload), total_size))
    }

    /// Validate the frame according to RFC 6455.
    ///
    /// # Errors
    ///
    /// - `Error::FragmentedControlFrame` if control frame has FIN=0
    /// - `Error::ControlFrameTooLarge` if control frame payload > 125 bytes
    pub fn validate(&self) -> Result<()> {
        if self.opcode.is_control() {
            if !self.fin {
                return Err(Error::FragmentedControlFrame);
            }
            if self.payload.len() > MAX_CONTROL_FRAME_PAYLOAD {
                return Err(Error::ControlFrameTooLarge(self.payload.len()));
            }
        }
        Ok(())
    }

    /// Write the frame to a buffer.
    ///
    /// Returns the number of bytes written.
    ///
    /// # Errors
    ///
    /// Returns an error if the buffer is too small.
    pub fn write(&self, buf: &mut [u8], mask: Option<[u8; 4]>) -> Result<usize> {
        let payload_len = self.payload.len();

        let (len_bits, extended_len_size) = if payload_len <= 125 {
            (payload_len as u8, 0)
        } else if payload_len <= 65535 {
            (LENGTH_16BIT, 2)
        } else {
            (LENGTH_64BIT, 8)
        };

        let total_size = self.wire_size(mask.is_some());
        if buf.len() < total_size {
            return Err(Error::InvalidFrame(format!(
                "Buffer too small: need {} bytes, have {}",
                total_size,
                buf.len()
            )));
        }

        let mut byte0 = self.opcode.as_u8();
        if self.fin {
            byte0 |= FIN_BIT;
        }
        buf[0] = byte0;

        let mut byte1 = len_bits;
        if mask.is_some() {
            byte1 |= MASK_BIT;
        }
        buf[1] = byte1;

        let mut offset = 2;
        match extended_len_size {
            2 => {
                buf[offset..offset + 2].copy_from_slice(&(payload_len as u16).to_be_bytes());
                offset += 2;
            }
            8 => {
                buf[offset..offset + 8].copy_from_slice(&(payload_len as u64).to_be_bytes());
                offset += 8;
            }
            _ => {}
        }

        if let Some(mask_key) = mask {
            buf[offset..offset + 4].copy_from_slice(&mask_key);
            offset += 4;
        }

        buf[offset..offset + payload_len].copy_from_slice(&self.payload);
        if let Some(mask_key) = mask {
            apply_mask(&mut buf[offset..offset + payload_len], mask_key);
        }

        Ok(total_size)
    }

    /// Serialize the frame into a freshly allocated buffer.
    #[must_use]
    pub fn encode(&self, mask: Option<[u8; 4]>) -> Vec<u8> {
        let mut buf = vec![0u8; self.wire_size(mask.is_some())];
        // The buffer is sized by wire_size, so write cannot fail.
        let _ = self.write(&mut buf, mask);
        buf
    }

    /// Calculate the size needed to write this frame.
    #[must_use]
    pub fn wire_size(&self, masked: bool) -> usize {
        let payload_len = self.payload.len();
        let extended_len_size = if payload_len <= 125 {
            0
        } else if payload_len <= 65535 {
            2
        } else {
            8
        };
        let mask_size = if masked { 4 } else { 0 };
        2 + extended_len_size + mask_size + payload_len
    }
}

use bytes::BytesMut;
use log::trace;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::mask::{apply_mask_fast, generate_mask};
use crate::protocol::{Frame, FrameHeader};
use crate::transport::Transport;

use super::StreamBuffer;

/// Incremental frame decoder and encoder over a [`StreamBuffer`].
///
/// Decoding runs in two stages, each of which only proceeds once the
/// bytes it needs are buffered:
///
/// 1. header: the two fixed bytes, then the 2 or 8 byte extended length;
/// 2. body: masking key and payload together.
///
/// Header bytes are moved into a separate accumulator as soon as they
/// arrive, so a frame whose header and body trickle in over many reads is
/// resumed where it left off.
#[derive(Debug)]
pub struct FrameCodec<T> {
    buffer: StreamBuffer<T>,
    header: BytesMut,
    pending: Option<FrameHeader>,
    write_buf: Vec<u8>,
    limits: Limits,
}

impl<T> FrameCodec<T> {
    #[must_use]
    pub fn new(buffer: StreamBuffer<T>, limits: Limits) -> Self {
        Self {
            buffer,
            header: BytesMut::with_capacity(10),
            pending: None,
            write_buf: Vec::new(),
            limits,
        }
    }

    #[must_use]
    pub fn buffer(&self) -> &StreamBuffer<T> {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut StreamBuffer<T> {
        &mut self.buffer
    }

    #[must_use]
    pub fn limits(&self) -> &Limits {
        &self.limits
    }

    /// Whether a frame has been partially decoded.
    #[must_use]
    pub fn in_frame(&self) -> bool {
        !self.header.is_empty() || self.pending.is_some()
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.buffer.into_inner()
    }
}

impl<T: Transport> FrameCodec<T> {
    /// Attempt to decode one frame without blocking.
    ///
    /// Returns `Ok(None)` when the frame is not complete yet; progress is
    /// kept for the next call.
    ///
    /// # Errors
    ///
    /// Protocol violations in the header, an oversized frame, end of
    /// stream and transport failures.
    pub fn try_read_frame(&mut self) -> Result<Option<Frame>> {
        let header = match self.pending {
            Some(header) => header,
            None => match self.read_header()? {
                Some(header) => header,
                None => return Ok(None),
            },
        };

        let mask_len = header.mask_len();
        if !self.buffer.ensure(mask_len + header.payload_len)? {
            return Ok(None);
        }
        self.pending = None;

        let mut payload = self.buffer.take(mask_len + header.payload_len);
        if header.masked {
            let key = payload.split_to(mask_len);
            apply_mask_fast(&mut payload, [key[0], key[1], key[2], key[3]]);
        }

        trace!(
            "decoded {} frame: fin={} len={}",
            header.opcode, header.fin, header.payload_len
        );
        let frame = Frame::new(header.fin, header.opcode, payload.to_vec());
        frame.validate()?;
        Ok(Some(frame))
    }

    fn read_header(&mut self) -> Result<Option<FrameHeader>> {
        if self.header.is_empty() {
            if !self.buffer.ensure(2)? {
                return Ok(None);
            }
            self.header = self.buffer.take(2);
            FrameHeader::check_first_byte(self.header[0])?;
        }

        let extended = FrameHeader::extended_len_size(self.header[1]);
        if self.header.len() < 2 + extended {
            if !self.buffer.ensure(extended)? {
                return Ok(None);
            }
            let rest = self.buffer.take(extended);
            self.header.extend_from_slice(&rest);
        }

        let header = FrameHeader::decode(&self.header)?;
        self.header.clear();
        self.limits.check_frame_size(header.payload_len)?;
        self.pending = Some(header);
        Ok(Some(header))
    }

    /// Block until one frame has been decoded.
    ///
    /// # Errors
    ///
    /// As [`Self::try_read_frame`]; end of stream is `Error::Connection`.
    pub fn read_frame(&mut self) -> Result<Frame> {
        loop {
            if let Some(frame) = self.try_read_frame()? {
                return Ok(frame);
            }
            self.wait_readable()?;
        }
    }

    /// One blocking read into the buffer.
    ///
    /// # Errors
    ///
    /// End of stream is `Error::Connection`, a read timeout `Error::Timeout`.
    pub fn wait_readable(&mut self) -> Result<()> {
        if self.buffer.fill()? == 0 {
            return Err(Error::Connection("Empty read; connection dead?".into()));
        }
        Ok(())
    }

    /// Encode and write one frame, masking it with a fresh random key if
    /// `masked` is set.
    ///
    /// # Errors
    ///
    /// Short writes and transport failures.
    pub fn write_frame(&mut self, frame: &Frame, masked: bool) -> Result<()> {
        let mask = if masked { Some(generate_mask()?) } else { None };

        self.write_buf.clear();
        self.write_buf.resize(frame.wire_size(masked), 0);
        let written = frame.write(&mut self.write_buf, mask)?;

        trace!(
            "encoded {} frame: fin={} len={} masked={}",
            frame.opcode,
            frame.fin,
            frame.payload().len(),
            masked
        );
        self.buffer.write_all(&self.write_buf[..written])
    }
}

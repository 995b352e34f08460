//! Splitting outgoing messages into frames (RFC 6455 Section 5.4).

use crate::protocol::{Frame, OpCode};

/// Iterator over the frames of one outgoing message.
///
/// Every chunk holds at most `fragment_size` bytes; the first carries the
/// message opcode and the rest are continuations. An empty payload still
/// produces a single final frame. Control opcodes are emitted as one frame
/// whatever their length.
#[derive(Debug, Clone)]
pub struct MessageFragmenter<'a> {
    payload: &'a [u8],
    opcode: OpCode,
    fragment_size: usize,
    offset: usize,
    started: bool,
}

impl<'a> MessageFragmenter<'a> {
    /// Create a fragmenter. A `fragment_size` of zero is treated as one.
    #[must_use]
    pub fn new(payload: &'a [u8], opcode: OpCode, fragment_size: usize) -> Self {
        let fragment_size = if opcode.is_control() {
            payload.len().max(1)
        } else {
            fragment_size.max(1)
        };
        Self {
            payload,
            opcode,
            fragment_size,
            offset: 0,
            started: false,
        }
    }

    /// Whether the message needs more than one frame.
    #[must_use]
    pub fn needs_fragmentation(&self) -> bool {
        self.payload.len() > self.fragment_size
    }

    /// Bytes not yet handed out.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.payload.len() - self.offset
    }
}

impl Iterator for MessageFragmenter<'_> {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.started && self.offset >= self.payload.len() {
            return None;
        }

        let end = self.payload.len().min(self.offset + self.fragment_size);
        let opcode = if self.started {
            OpCode::Continuation
        } else {
            self.opcode
        };
        let chunk = self.payload[self.offset..end].to_vec();

        self.started = true;
        self.offset = end;
        Some(Frame::new(end == self.payload.len(), opcode, chunk))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = if self.started {
            self.remaining().div_ceil(self.fragment_size)
        } else {
            self.payload.len().div_ceil(self.fragment_size).max(1)
        };
        (n, Some(n))
    }
}

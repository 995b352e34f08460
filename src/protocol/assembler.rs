//! Reassembly of fragmented messages (RFC 6455 Section 5.4).

use bytes::BytesMut;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::protocol::{Frame, OpCode};

/// Reassembles fragmented WebSocket messages.
///
/// Control frames are never buffered: they may arrive between the
/// fragments of a data message and are handled by the caller directly.
#[derive(Debug)]
pub struct MessageAssembler {
    buffer: BytesMut,
    opcode: Option<OpCode>,
    limits: Limits,
}

impl MessageAssembler {
    #[must_use]
    pub fn new(limits: Limits) -> Self {
        Self {
            buffer: BytesMut::new(),
            opcode: None,
            limits,
        }
    }

    /// Add a data frame to the message being assembled.
    ///
    /// Returns `Some(message)` when the frame completes a message and
    /// `None` while fragments are still expected. Control frames pass
    /// through untouched and yield `None`.
    ///
    /// # Errors
    ///
    /// - `Error::ProtocolViolation` for a continuation with no message in
    ///   progress or a new message started before the previous one ended
    /// - `Error::MessageTooLarge` when the reassembled size exceeds the limit
    pub fn push(&mut self, frame: Frame) -> Result<Option<AssembledMessage>> {
        if frame.opcode.is_control() {
            return Ok(None);
        }

        if frame.opcode == OpCode::Continuation {
            if self.opcode.is_none() {
                return Err(Error::ProtocolViolation(
                    "Unexpected continuation frame".into(),
                ));
            }
        } else if self.opcode.is_some() {
            return Err(Error::ProtocolViolation(
                "Expected continuation frame".into(),
            ));
        }

        let new_size = self.buffer.len() + frame.payload().len();
        self.limits.check_message_size(new_size)?;

        let opcode = match self.opcode {
            Some(opcode) => opcode,
            None => frame.opcode,
        };

        if frame.fin {
            let payload = if self.buffer.is_empty() {
                frame.into_payload()
            } else {
                self.buffer.extend_from_slice(frame.payload());
                self.buffer.split().to_vec()
            };
            self.opcode = None;
            Ok(Some(AssembledMessage { opcode, payload }))
        } else {
            self.opcode = Some(opcode);
            self.buffer.extend_from_slice(frame.payload());
            Ok(None)
        }
    }

    /// Whether a fragmented message is in progress.
    #[must_use]
    pub fn is_assembling(&self) -> bool {
        self.opcode.is_some()
    }

    /// Bytes buffered for the message in progress.
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Drop any partial message.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.opcode = None;
    }
}

/// A fully assembled WebSocket message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledMessage {
    /// Opcode of the first fragment.
    pub opcode: OpCode,
    pub payload: Vec<u8>,
}

impl AssembledMessage {
    /// # Errors
    ///
    /// Returns `Error::InvalidUtf8` if the payload is not valid UTF-8.
    pub fn into_text(self) -> Result<String> {
        String::from_utf8(self.payload).map_err(|_| Error::InvalidUtf8)
    }

    #[must_use]
    pub fn into_binary(self) -> Vec<u8> {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler() -> MessageAssembler {
        MessageAssembler::new(Limits::default())
    }

    #[test]
    fn test_single_frame_message() {
        let mut assembler = assembler();

        let msg = assembler.push(Frame::text(b"Hello".to_vec())).unwrap().unwrap();
        assert_eq!(msg.opcode, OpCode::Text);
        assert_eq!(msg.payload, b"Hello");
        assert!(!assembler.is_assembling());
    }

    #[test]
    fn test_empty_message() {
        let mut assembler = assembler();
        let msg = assembler.push(Frame::binary(Vec::new())).unwrap().unwrap();
        assert!(msg.payload.is_empty());
    }

    #[test]
    fn test_two_fragment_message() {
        let mut assembler = assembler();

        let frame1 = Frame::new(false, OpCode::Text, b"Hel".to_vec());
        assert!(assembler.push(frame1).unwrap().is_none());
        assert!(assembler.is_assembling());
        assert_eq!(assembler.pending_len(), 3);

        let frame2 = Frame::new(true, OpCode::Continuation, b"lo".to_vec());
        let msg = assembler.push(frame2).unwrap().unwrap();
        assert_eq!(msg.opcode, OpCode::Text);
        assert_eq!(msg.payload, b"Hello");
        assert_eq!(assembler.pending_len(), 0);
    }

    #[test]
    fn test_many_fragments() {
        let mut assembler = assembler();

        assert!(assembler.push(Frame::new(false, OpCode::Binary, vec![1, 2])).unwrap().is_none());
        for chunk in [vec![3, 4], vec![5, 6]] {
            let frame = Frame::new(false, OpCode::Continuation, chunk);
            assert!(assembler.push(frame).unwrap().is_none());
        }

        let msg = assembler
            .push(Frame::new(true, OpCode::Continuation, vec![7, 8]))
            .unwrap()
            .unwrap();
        assert_eq!(msg.opcode, OpCode::Binary);
        assert_eq!(msg.into_binary(), vec![1, 2, 3, 4, 5, 6, 7, 8]);
    }

    #[test]
    fn test_interleaved_control_frame() {
        let mut assembler = assembler();

        let first = Frame::new(false, OpCode::Text, b"Hel".to_vec());
        assert!(assembler.push(first).unwrap().is_none());

        assert!(assembler.push(Frame::ping(b"ping".to_vec())).unwrap().is_none());
        assert!(assembler.is_assembling());
        assert_eq!(assembler.pending_len(), 3);

        let msg = assembler
            .push(Frame::new(true, OpCode::Continuation, b"lo".to_vec()))
            .unwrap()
            .unwrap();
        assert_eq!(msg.payload, b"Hello");
    }

    #[test]
    fn test_max_message_size_exceeded() {
        let mut assembler = MessageAssembler::new(Limits::new(1024, 100, 4096));

        assert!(assembler.push(Frame::new(false, OpCode::Binary, vec![0u8; 60])).is_ok());
        let result = assembler.push(Frame::new(true, OpCode::Continuation, vec![0u8; 60]));
        assert_eq!(result, Err(Error::MessageTooLarge { size: 120, max: 100 }));
    }

    #[test]
    fn test_continuation_without_start_fails() {
        let mut assembler = assembler();

        let frame = Frame::new(true, OpCode::Continuation, b"data".to_vec());
        assert!(matches!(
            assembler.push(frame),
            Err(Error::ProtocolViolation(_))
        ));
    }

    #[test]
    fn test_new_message_without_continuation_fails() {
        let mut assembler = assembler();

        assembler.push(Frame::new(false, OpCode::Text, b"first".to_vec())).unwrap();
        let result = assembler.push(Frame::new(true, OpCode::Text, b"second".to_vec()));

        assert!(matches!(result, Err(Error::ProtocolViolation(_))));
    }

    #[test]
    fn test_into_text() {
        let msg = AssembledMessage {
            opcode: OpCode::Text,
            payload: "🎉".as_bytes().to_vec(),
        };
        assert_eq!(msg.into_text().unwrap(), "🎉");

        let msg = AssembledMessage {
            opcode: OpCode::Text,
            payload: vec![0x80, 0x81],
        };
        assert_eq!(msg.into_text(), Err(Error::InvalidUtf8));
    }

    #[test]
    fn test_reset() {
        let mut assembler = assembler();

        assembler.push(Frame::new(false, OpCode::Text, b"partial".to_vec())).unwrap();
        assert!(assembler.is_assembling());

        assembler.reset();
        assert!(!assembler.is_assembling());
        assert_eq!(assembler.pending_len(), 0);

        assert!(assembler.push(Frame::text(b"fresh".to_vec())).unwrap().is_some());
    }
}

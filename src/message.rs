//! Typed messages and close status codes (RFC 6455 Section 7.4).

use crate::protocol::OpCode;

/// WebSocket close status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CloseCode {
    /// Normal closure (1000).
    #[default]
    Normal,
    /// Endpoint is going away (1001).
    GoingAway,
    /// Protocol error (1002).
    ProtocolError,
    /// Unsupported data (1003).
    UnsupportedData,
    /// Invalid payload data, e.g. non-UTF-8 text (1007).
    InvalidPayload,
    /// Policy violation (1008).
    PolicyViolation,
    /// Message too big (1009).
    MessageTooBig,
    /// Internal error (1011).
    InternalError,
    /// Any other code.
    Other(u16),
}

impl CloseCode {
    #[must_use]
    pub const fn from_u16(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::GoingAway,
            1002 => CloseCode::ProtocolError,
            1003 => CloseCode::UnsupportedData,
            1007 => CloseCode::InvalidPayload,
            1008 => CloseCode::PolicyViolation,
            1009 => CloseCode::MessageTooBig,
            1011 => CloseCode::InternalError,
            other => CloseCode::Other(other),
        }
    }

    #[must_use]
    pub const fn as_u16(&self) -> u16 {
        match self {
            CloseCode::Normal => 1000,
            CloseCode::GoingAway => 1001,
            CloseCode::ProtocolError => 1002,
            CloseCode::UnsupportedData => 1003,
            CloseCode::InvalidPayload => 1007,
            CloseCode::PolicyViolation => 1008,
            CloseCode::MessageTooBig => 1009,
            CloseCode::InternalError => 1011,
            CloseCode::Other(code) => *code,
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        CloseCode::from_u16(code)
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> Self {
        code.as_u16()
    }
}

/// Decoded close frame payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseFrame {
    pub code: CloseCode,
    /// Text after the status code; invalid UTF-8 is replaced.
    pub reason: String,
}

impl CloseFrame {
    #[must_use]
    pub fn new(code: CloseCode, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// Decode a close payload. Payloads shorter than two bytes carry no
    /// status and yield `None`.
    #[must_use]
    pub fn parse(payload: &[u8]) -> Option<Self> {
        let (status, reason) = payload.split_first_chunk::<2>()?;
        Some(Self {
            code: CloseCode::from_u16(u16::from_be_bytes(*status)),
            reason: String::from_utf8_lossy(reason).into_owned(),
        })
    }
}

/// A complete message as returned by
/// [`FrameConnection::receive_message`](crate::FrameConnection::receive_message).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// A text message (UTF-8 encoded).
    Text(String),
    /// A binary message.
    Binary(Vec<u8>),
    /// A ping and its payload.
    Ping(Vec<u8>),
    /// A pong and its payload.
    Pong(Vec<u8>),
    /// The peer's close frame; `None` if it carried no status.
    Close(Option<CloseFrame>),
}

impl Message {
    /// Opcode of the frame that carried this message.
    #[must_use]
    pub const fn opcode(&self) -> OpCode {
        match self {
            Message::Text(_) => OpCode::Text,
            Message::Binary(_) => OpCode::Binary,
            Message::Ping(_) => OpCode::Ping,
            Message::Pong(_) => OpCode::Pong,
            Message::Close(_) => OpCode::Close,
        }
    }

    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self, Message::Text(_) | Message::Binary(_))
    }

    #[must_use]
    pub const fn is_close(&self) -> bool {
        matches!(self, Message::Close(_))
    }

    /// Borrow the text content, if this is a text message.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Borrow the payload bytes. A close message has none.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Message::Text(s) => s.as_bytes(),
            Message::Binary(data) | Message::Ping(data) | Message::Pong(data) => data,
            Message::Close(_) => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_code_conversions() {
        for (code, value) in [
            (CloseCode::Normal, 1000),
            (CloseCode::GoingAway, 1001),
            (CloseCode::ProtocolError, 1002),
            (CloseCode::UnsupportedData, 1003),
            (CloseCode::InvalidPayload, 1007),
            (CloseCode::PolicyViolation, 1008),
            (CloseCode::MessageTooBig, 1009),
            (CloseCode::InternalError, 1011),
            (CloseCode::Other(4000), 4000),
        ] {
            assert_eq!(CloseCode::from(value), code);
            assert_eq!(u16::from(code), value);
        }
    }

    #[test]
    fn test_close_frame_parse() {
        let frame = CloseFrame::parse(&[0x03, 0xe8, b'b', b'y', b'e']).unwrap();
        assert_eq!(frame, CloseFrame::new(CloseCode::Normal, "bye"));

        let frame = CloseFrame::parse(&[0x0f, 0xa0]).unwrap();
        assert_eq!(frame.code, CloseCode::Other(4000));
        assert!(frame.reason.is_empty());

        assert_eq!(CloseFrame::parse(&[]), None);
        assert_eq!(CloseFrame::parse(&[0x03]), None);
    }

    #[test]
    fn test_message_opcode() {
        assert_eq!(Message::Text("a".into()).opcode(), OpCode::Text);
        assert_eq!(Message::Binary(vec![]).opcode(), OpCode::Binary);
        assert_eq!(Message::Ping(vec![]).opcode(), OpCode::Ping);
        assert_eq!(Message::Pong(vec![]).opcode(), OpCode::Pong);
        assert_eq!(Message::Close(None).opcode(), OpCode::Close);
    }

    #[test]
    fn test_message_accessors() {
        let msg = Message::Text("hello".into());
        assert!(msg.is_data());
        assert_eq!(msg.as_text(), Some("hello"));
        assert_eq!(msg.as_bytes(), b"hello");

        let msg = Message::Ping(vec![1, 2]);
        assert!(!msg.is_data());
        assert_eq!(msg.as_text(), None);
        assert_eq!(msg.as_bytes(), &[1, 2]);

        assert!(Message::Close(None).is_close());
        assert!(Message::Close(None).as_bytes().is_empty());
    }
}

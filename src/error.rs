//! Error types for the WebSocket protocol engine.
//!
//! Every variant belongs to one of four broad kinds (see [`ErrorKind`]):
//! a bad URI, a connection/protocol failure, a malformed upgrade request
//! received by a server, or a caller asking for an opcode that does not
//! exist.

use thiserror::Error;

/// Result type alias for WebSocket operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The URI scheme is neither `ws` nor `wss`, or the URI does not parse.
    InvalidUri,
    /// Transport, handshake or framing failure.
    Connection,
    /// A server received an upgrade request it cannot answer.
    BadRequest,
    /// The caller named an opcode outside the known set.
    InvalidOpcode,
}

/// Errors that can occur during WebSocket operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The URI could not be used for a WebSocket connection.
    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    /// Transport level failure (connect, short write, dead stream).
    #[error("Connection error: {0}")]
    Connection(String),

    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(String),

    /// A blocking read or connect did not complete within the configured timeout.
    #[error("Operation timed out")]
    Timeout,

    /// Connection has been closed.
    #[error("Connection closed: {0:?}")]
    ConnectionClosed(Option<u16>),

    /// The peer's handshake response was rejected.
    #[error("Invalid handshake: {0}")]
    InvalidHandshake(String),

    /// Handshake head exceeds the configured maximum.
    #[error("Handshake too large: {size} bytes (max: {max})")]
    HandshakeTooLarge {
        /// Bytes read so far.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// A server received an invalid upgrade request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Caller supplied an opcode outside the known set.
    #[error("Invalid opcode '{0}'. Try 'text' or 'binary'")]
    InvalidOpcode(String),

    /// Protocol violation detected.
    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    /// Frame could not be serialized or is structurally invalid.
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Reserved bits set in a received frame.
    #[error("Reserved bits should be zero")]
    ReservedBitsSet,

    /// Received frame carries an opcode outside the known set.
    #[error("Bad opcode in websocket frame: {0:#x}")]
    ReservedOpcode(u8),

    /// Control frame fragmented (RFC violation).
    #[error("Control frames cannot be fragmented")]
    FragmentedControlFrame,

    /// Control frame payload too large (>125 bytes).
    #[error("Control frame payload too large: {0} bytes (max: 125)")]
    ControlFrameTooLarge(usize),

    /// Frame size exceeds configured maximum.
    #[error("Frame too large: {size} bytes (max: {max})")]
    FrameTooLarge {
        /// Actual frame size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Message size exceeds configured maximum.
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge {
        /// Actual message size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// 64-bit payload length does not fit the platform's `usize`.
    #[error("Payload of {size} bytes exceeds platform maximum {max}")]
    PayloadTooLargeForPlatform {
        /// Length announced by the frame header.
        size: u64,
        /// Largest length the platform can address.
        max: u64,
    },

    /// Not enough bytes to decode a complete frame.
    #[error("Incomplete frame: need {needed} more bytes")]
    IncompleteFrame {
        /// Number of additional bytes needed.
        needed: usize,
    },

    /// Invalid UTF-8 in a text message.
    #[error("Invalid UTF-8 in text message")]
    InvalidUtf8,

    /// Header value would break the HTTP framing of the handshake.
    #[error("Invalid value for header {header}: {reason}")]
    InvalidHeaderValue {
        /// Header name.
        header: String,
        /// Why the value was refused.
        reason: String,
    },
}

impl Error {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidUri(_) => ErrorKind::InvalidUri,
            Error::BadRequest(_) => ErrorKind::BadRequest,
            Error::InvalidOpcode(_) => ErrorKind::InvalidOpcode,
            _ => ErrorKind::Connection,
        }
    }

    /// Whether the connection can keep being used after this error.
    ///
    /// Only a read timeout leaves the stream in a consistent state.
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Error::Timeout)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => Error::Timeout,
            _ => Error::Io(err.to_string()),
        }
    }
}

impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Error::InvalidUri(err.to_string())
    }
}

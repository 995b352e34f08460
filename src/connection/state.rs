//! Connection lifecycle, including the close handshake (RFC 6455 Section 7).

/// WebSocket connection state.
///
/// ```text
/// Connecting -> Open -> ClosingLocal  -> Closed
///                    -> ClosingRemote -> Closed
/// ```
///
/// Any unrecoverable read error also moves straight to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// Handshake not completed yet.
    #[default]
    Connecting,
    /// Ready for data transfer.
    Open,
    /// We sent a close frame and wait for the peer's.
    ClosingLocal,
    /// The peer sent a close frame; our answer is being sent.
    ClosingRemote,
    /// Fully closed; the transport has been shut down.
    Closed,
}

impl ConnectionState {
    /// Handshake done and not closed yet.
    #[must_use]
    #[inline]
    pub const fn is_connected(&self) -> bool {
        matches!(
            self,
            ConnectionState::Open | ConnectionState::ClosingLocal | ConnectionState::ClosingRemote
        )
    }

    /// Waiting for the peer to acknowledge our close frame.
    #[must_use]
    #[inline]
    pub const fn is_closing(&self) -> bool {
        matches!(self, ConnectionState::ClosingLocal)
    }

    /// Data frames may be sent.
    #[must_use]
    #[inline]
    pub const fn can_send(&self) -> bool {
        matches!(self, ConnectionState::Open)
    }

    /// Frames may still arrive.
    #[must_use]
    #[inline]
    pub const fn can_receive(&self) -> bool {
        matches!(self, ConnectionState::Open | ConnectionState::ClosingLocal)
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionState::Connecting => write!(f, "Connecting"),
            ConnectionState::Open => write!(f, "Open"),
            ConnectionState::ClosingLocal => write!(f, "ClosingLocal"),
            ConnectionState::ClosingRemote => write!(f, "ClosingRemote"),
            ConnectionState::Closed => write!(f, "Closed"),
        }
    }
}

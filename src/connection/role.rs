//! Which side of the connection we are.

/// WebSocket connection role.
///
/// Determines the default masking of outgoing frames (RFC 6455 Section 5.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The initiating side; masks outgoing frames.
    Client,
    /// The accepting side; sends frames unmasked.
    Server,
}

impl Role {
    /// Whether frames sent by this role are masked by default.
    #[inline]
    #[must_use]
    pub const fn must_mask(&self) -> bool {
        matches!(self, Role::Client)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Client => write!(f, "client"),
            Role::Server => write!(f, "server"),
        }
    }
}

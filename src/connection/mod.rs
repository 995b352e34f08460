//! An established WebSocket session and its state machine.
//!
//! ## Connection Lifecycle
//!
//! 1. **Open** - state right after a successful handshake
//! 2. **ClosingLocal** / **ClosingRemote** - one side has sent a close frame
//! 3. **Closed** - close handshake done or connection failed; transport shut down
//!
//! Outgoing messages are split by [`MessageFragmenter`]; incoming fragments
//! are joined by the protocol layer's assembler before they are returned.

#[allow(clippy::module_inception)]
mod connection;
mod fragmenter;
mod role;
mod state;

pub use connection::FrameConnection;
pub use fragmenter::MessageFragmenter;
pub use role::Role;
pub use state::ConnectionState;

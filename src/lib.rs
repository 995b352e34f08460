//! # wsengine - synchronous RFC 6455 WebSocket protocol engine
//!
//! `wsengine` speaks the WebSocket protocol over any owned duplex byte
//! stream, as either the initiating (client) or accepting (server) side.
//!
//! ## Features
//!
//! - **Incremental frame decoding** from streams that deliver bytes in arbitrary chunks
//! - **Blocking or single-attempt receives** on the same connection
//! - **Automatic fragmentation** of outgoing messages and reassembly of incoming ones
//! - **Close handshake** with status codes and reasons
//! - **Resource limits** on frame, message and handshake sizes
//!
//! Compression extensions and TLS are out of scope; `wss://` works with a
//! caller-supplied [`Transport`] through [`Client::with_connector`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use wsengine::{Client, CloseCode, OpCode};
//!
//! let mut client = Client::new("ws://127.0.0.1:8000/echo")?;
//! client.send(b"Hello", OpCode::Text, true)?;
//! if let Some(reply) = client.receive(false)? {
//!     println!("{:?}: {}", client.last_opcode(), String::from_utf8_lossy(&reply));
//! }
//! client.close(CloseCode::Normal, "done")?;
//! # Ok::<(), wsengine::Error>(())
//! ```

pub mod client;
pub mod codec;
pub mod config;
pub mod connection;
pub mod error;
pub mod message;
pub mod protocol;
pub mod server;
pub mod transport;

pub use client::Client;
pub use config::{Config, Limits};
pub use connection::{ConnectionState, FrameConnection, Role};
pub use error::{Error, ErrorKind, Result};
pub use message::{CloseCode, CloseFrame, Message};
pub use protocol::{HandshakeRequest, HandshakeResponse, OpCode, WS_GUID, compute_accept_key};
pub use server::Server;
pub use transport::Transport;

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpStream;

    fn assert_send<T: Send>() {}
    fn assert_sync<T: Sync>() {}

    #[test]
    fn test_public_types_are_send() {
        assert_send::<Error>();
        assert_send::<Config>();
        assert_send::<Limits>();
        assert_send::<Message>();
        assert_send::<CloseCode>();
        assert_send::<CloseFrame>();
        assert_send::<ConnectionState>();
        assert_send::<Role>();
        assert_send::<FrameConnection<TcpStream>>();
        assert_send::<Client>();
        assert_send::<Server>();
    }

    #[test]
    fn test_public_types_are_sync() {
        assert_sync::<Error>();
        assert_sync::<Config>();
        assert_sync::<Limits>();
        assert_sync::<Message>();
        assert_sync::<CloseCode>();
        assert_sync::<CloseFrame>();
        assert_sync::<ConnectionState>();
        assert_sync::<Role>();
        assert_sync::<FrameConnection<TcpStream>>();
    }
}

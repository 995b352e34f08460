use std::io;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::codec::{FrameCodec, StreamBuffer};
use crate::config::Config;
use crate::connection::fragmenter::MessageFragmenter;
use crate::connection::{ConnectionState, Role};
use crate::error::{Error, Result};
use crate::message::{CloseFrame, Message};
use crate::protocol::assembler::{AssembledMessage, MessageAssembler};
use crate::protocol::{Frame, OpCode};
use crate::transport::Transport;

/// What one decode attempt produced.
enum Incoming {
    /// A complete text or binary message.
    Data(AssembledMessage),
    /// A ping or pong with its payload.
    Control(OpCode, Vec<u8>),
    /// The peer's close frame payload, status included.
    Close(Vec<u8>),
}

impl Incoming {
    fn into_payload(self) -> Vec<u8> {
        match self {
            Incoming::Data(message) => message.payload,
            Incoming::Control(_, payload) => payload,
            Incoming::Close(mut payload) => {
                if payload.len() >= 2 {
                    payload.drain(..2);
                }
                payload
            }
        }
    }
}

enum Step {
    /// Not enough bytes buffered for the next frame.
    Pending,
    /// A fragment was absorbed; more may already be buffered.
    Fragment,
    Ready(Incoming),
}

/// An established WebSocket session over an owned transport.
///
/// Created by [`Client`](crate::Client) and [`Server`](crate::Server) once
/// the handshake has succeeded, or directly with [`FrameConnection::new`]
/// over a stream that is already upgraded.
///
/// ## Example
///
/// ```rust,no_run
/// use wsengine::{Client, OpCode};
///
/// let mut client = Client::new("ws://127.0.0.1:9001/echo")?;
/// client.send(b"hello", OpCode::Text, true)?;
/// let reply = client.receive(false)?;
/// client.close(1000u16, "bye")?;
/// # Ok::<(), wsengine::Error>(())
/// ```
#[derive(Debug)]
pub struct FrameConnection<T> {
    codec: FrameCodec<T>,
    state: ConnectionState,
    role: Role,
    last_opcode: Option<OpCode>,
    close_status: Option<u16>,
    assembler: MessageAssembler,
    config: Config,
}

impl<T> FrameConnection<T> {
    /// Wrap a stream on which the handshake has already completed.
    #[must_use]
    pub fn new(io: T, role: Role, config: Config) -> Self {
        let buffer = StreamBuffer::new(io, config.read_buffer_size);
        Self::from_buffer(buffer, role, config)
    }

    /// Continue over a buffer that may already hold bytes read past the
    /// handshake.
    pub(crate) fn from_buffer(buffer: StreamBuffer<T>, role: Role, config: Config) -> Self {
        Self {
            codec: FrameCodec::new(buffer, config.limits.clone()),
            state: ConnectionState::Open,
            role,
            last_opcode: None,
            close_status: None,
            assembler: MessageAssembler::new(config.limits.clone()),
            config,
        }
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Whether the session is usable: handshake done and close not finished.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    /// Whether we sent a close frame and still wait for the answer.
    #[must_use]
    pub fn is_closing(&self) -> bool {
        self.state.is_closing()
    }

    /// Opcode of the most recent non-continuation frame received.
    #[must_use]
    pub fn last_opcode(&self) -> Option<OpCode> {
        self.last_opcode
    }

    /// Status code of the most recent close frame received.
    #[must_use]
    pub fn close_status(&self) -> Option<u16> {
        self.close_status
    }

    #[must_use]
    pub fn fragment_size(&self) -> usize {
        self.config.fragment_size
    }

    /// Set the maximum payload per outgoing frame.
    pub fn set_fragment_size(&mut self, size: usize) -> &mut Self {
        self.config.fragment_size = size;
        self
    }

    #[must_use]
    pub fn get_ref(&self) -> &T {
        self.codec.buffer().get_ref()
    }

    pub fn get_mut(&mut self) -> &mut T {
        self.codec.buffer_mut().get_mut()
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.codec.into_inner()
    }
}

impl<T: Transport> FrameConnection<T> {
    /// Apply a new timeout to the transport and remember it.
    ///
    /// # Errors
    ///
    /// Propagates the transport's refusal.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.config.timeout = timeout;
        if self.state != ConnectionState::Closed {
            self.get_mut().set_timeout(timeout)?;
        }
        Ok(())
    }

    /// Send `payload` as one message, split into frames of at most
    /// `fragment_size` bytes.
    ///
    /// Sending a close frame this way starts the close handshake without
    /// waiting for the answer; see [`Self::close`].
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` once the connection is closing or closed
    /// - `Error::ControlFrameTooLarge` for a control payload over 125 bytes
    /// - `Error::Connection` on a short write, or other transport failures;
    ///   the connection is closed since part of a frame may be on the wire
    pub fn send(&mut self, payload: &[u8], opcode: OpCode, masked: bool) -> Result<()> {
        if !self.state.can_send() {
            return Err(Error::ConnectionClosed(self.close_status));
        }

        for frame in MessageFragmenter::new(payload, opcode, self.config.fragment_size) {
            frame.validate()?;
            self.write_frame(&frame, masked)?;
        }

        if opcode == OpCode::Close {
            debug!("{} sent close frame", self.role);
            self.state = ConnectionState::ClosingLocal;
        }
        Ok(())
    }

    /// Send a text message, masked according to the role.
    ///
    /// # Errors
    ///
    /// As [`Self::send`].
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        self.send(text.as_bytes(), OpCode::Text, self.role.must_mask())
    }

    /// Send a binary message, masked according to the role.
    ///
    /// # Errors
    ///
    /// As [`Self::send`].
    pub fn send_binary(&mut self, data: &[u8]) -> Result<()> {
        self.send(data, OpCode::Binary, self.role.must_mask())
    }

    /// # Errors
    ///
    /// As [`Self::send`].
    pub fn ping(&mut self, data: &[u8]) -> Result<()> {
        self.send(data, OpCode::Ping, self.role.must_mask())
    }

    /// # Errors
    ///
    /// As [`Self::send`].
    pub fn pong(&mut self, data: &[u8]) -> Result<()> {
        self.send(data, OpCode::Pong, self.role.must_mask())
    }

    /// Receive the next payload.
    ///
    /// With `try_only == false` this blocks (bounded by the transport
    /// timeout) until a complete message, a ping, a pong or a close frame
    /// arrives. With `try_only == true` a single decode attempt is made and
    /// `None` is returned if it did not complete anything.
    ///
    /// Check [`Self::last_opcode`] to tell what the payload was. For a
    /// close frame the payload is the reason text.
    ///
    /// # Errors
    ///
    /// - `Error::ConnectionClosed` if the connection was already closed
    /// - `Error::Timeout` if a blocking read timed out; the connection stays open
    /// - protocol violations and transport failures, which close the connection
    pub fn receive(&mut self, try_only: bool) -> Result<Option<Vec<u8>>> {
        Ok(self.poll(try_only)?.map(Incoming::into_payload))
    }

    /// Like [`Self::receive`], but returns a typed [`Message`].
    ///
    /// # Errors
    ///
    /// As [`Self::receive`]; a text message that is not valid UTF-8 is
    /// `Error::InvalidUtf8`.
    pub fn receive_message(&mut self, try_only: bool) -> Result<Option<Message>> {
        let message = match self.poll(try_only)? {
            None => return Ok(None),
            Some(Incoming::Data(assembled)) if assembled.opcode == OpCode::Text => {
                match assembled.into_text() {
                    Ok(text) => Message::Text(text),
                    Err(e) => return Err(self.fail(e)),
                }
            }
            Some(Incoming::Data(assembled)) => Message::Binary(assembled.into_binary()),
            Some(Incoming::Control(OpCode::Ping, payload)) => Message::Ping(payload),
            Some(Incoming::Control(_, payload)) => Message::Pong(payload),
            Some(Incoming::Close(payload)) => Message::Close(CloseFrame::parse(&payload)),
        };
        Ok(Some(message))
    }

    /// Run the close handshake: send a close frame with `code` and
    /// `reason`, then read until the peer answers. Data arriving in the
    /// meantime is discarded. A peer that drops the stream instead of
    /// answering also completes the close.
    ///
    /// Returns the reason text of the peer's close frame, or `None` if the
    /// peer dropped the stream or the connection was not open.
    ///
    /// # Errors
    ///
    /// - `Error::ControlFrameTooLarge` if the reason exceeds 123 bytes
    /// - `Error::Timeout` if the peer does not answer in time
    /// - transport failures
    pub fn close(&mut self, code: impl Into<u16>, reason: &str) -> Result<Option<Vec<u8>>> {
        match self.state {
            ConnectionState::Open => {
                let frame = Frame::close(Some(code.into()), reason);
                frame.validate()?;
                self.write_frame(&frame, self.role.must_mask())?;
                self.state = ConnectionState::ClosingLocal;
                debug!("{} sent close frame, awaiting answer", self.role);
            }
            ConnectionState::ClosingLocal => {}
            _ => return Ok(None),
        }

        loop {
            match self.poll(false) {
                Ok(Some(incoming @ Incoming::Close(_))) => {
                    return Ok(Some(incoming.into_payload()));
                }
                Ok(Some(Incoming::Data(message))) => {
                    warn!(
                        "discarding {} byte {} message received while closing",
                        message.payload.len(),
                        message.opcode
                    );
                }
                Ok(Some(Incoming::Control(opcode, _))) => {
                    trace!("ignoring {} received while closing", opcode);
                }
                Ok(None) => {}
                Err(_) if self.codec.buffer().is_eof() => {
                    debug!("{} peer dropped the stream during close", self.role);
                    return Ok(None);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn poll(&mut self, try_only: bool) -> Result<Option<Incoming>> {
        if !self.state.can_receive() {
            return Err(Error::ConnectionClosed(self.close_status));
        }

        loop {
            match self.step() {
                Ok(Step::Ready(incoming)) => return Ok(Some(incoming)),
                Ok(_) if try_only => return Ok(None),
                Ok(Step::Fragment) => {}
                Ok(Step::Pending) => {
                    if let Err(e) = self.codec.wait_readable() {
                        return Err(self.fail(e));
                    }
                }
                Err(e) => return Err(self.fail(e)),
            }
        }
    }

    fn step(&mut self) -> Result<Step> {
        let Some(frame) = self.codec.try_read_frame()? else {
            return Ok(Step::Pending);
        };

        if frame.opcode != OpCode::Continuation {
            self.last_opcode = Some(frame.opcode);
        }

        match frame.opcode {
            OpCode::Close => Ok(Step::Ready(Incoming::Close(self.on_close(frame)))),
            OpCode::Ping => {
                let payload = frame.into_payload();
                if self.config.auto_pong && self.state == ConnectionState::Open {
                    trace!("answering ping with {} byte pong", payload.len());
                    self.write_frame(&Frame::pong(payload.clone()), self.role.must_mask())?;
                }
                Ok(Step::Ready(Incoming::Control(OpCode::Ping, payload)))
            }
            OpCode::Pong => Ok(Step::Ready(Incoming::Control(
                OpCode::Pong,
                frame.into_payload(),
            ))),
            OpCode::Text | OpCode::Binary | OpCode::Continuation => {
                match self.assembler.push(frame)? {
                    Some(message) => Ok(Step::Ready(Incoming::Data(message))),
                    None => Ok(Step::Fragment),
                }
            }
        }
    }

    fn on_close(&mut self, frame: Frame) -> Vec<u8> {
        let payload = frame.into_payload();
        let status = match payload.as_slice() {
            [hi, lo, ..] => Some(u16::from_be_bytes([*hi, *lo])),
            _ => None,
        };
        if status.is_some() {
            self.close_status = status;
        }

        if self.state == ConnectionState::ClosingLocal {
            debug!("{} close handshake complete, status {:?}", self.role, status);
        } else {
            self.state = ConnectionState::ClosingRemote;
            debug!("{} peer initiated close, status {:?}", self.role, status);

            let ack = match status {
                Some(code) => Frame::close(Some(code), &format!("Close acknowledged: {code}")),
                None => Frame::close(None, ""),
            };
            if let Err(e) = self.codec.write_frame(&ack, self.role.must_mask()) {
                warn!("failed to acknowledge close: {}", e);
            }
        }

        self.shutdown();
        payload
    }

    /// Write one frame. Any failure, a write timeout included, may leave a
    /// partial frame on the wire, so the connection is closed.
    fn write_frame(&mut self, frame: &Frame, masked: bool) -> Result<()> {
        let result = self.codec.write_frame(frame, masked);
        if let Err(e) = &result {
            debug!("{} write failed: {}", self.role, e);
            self.shutdown();
        }
        result
    }

    /// Record a failed read. Anything but a timeout leaves the stream in
    /// an unknown position, so the connection is closed.
    fn fail(&mut self, err: Error) -> Error {
        if !err.is_recoverable() && self.state != ConnectionState::Closed {
            debug!("{} connection failed: {}", self.role, err);
            self.shutdown();
        }
        err
    }

    fn shutdown(&mut self) {
        if let Err(e) = self.get_mut().shutdown() {
            if e.kind() != io::ErrorKind::NotConnected {
                warn!("transport shutdown failed: {}", e);
            }
        }
        self.assembler.reset();
        self.state = ConnectionState::Closed;
    }
}

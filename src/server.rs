//! The accepting side: listener management and the server handshake.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, trace};

use crate::codec::StreamBuffer;
use crate::config::Config;
use crate::connection::{FrameConnection, Role};
use crate::error::{Error, Result};
use crate::protocol::{HandshakeRequest, HandshakeResponse};
use crate::transport::Transport;

/// Highest port [`Server::listen`] will try.
pub const MAX_LISTEN_PORT: u16 = 10000;

/// Pause between accept attempts while a timeout is running.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Run the server handshake over `io` and return the open connection
/// together with the client's request.
///
/// Frames the client sends right behind its request are kept for the
/// frame decoder. On failure the transport is shut down.
///
/// # Errors
///
/// - `Error::BadRequest` if the request line is not `GET <path> HTTP/1.x`,
///   the `Sec-WebSocket-Key` header is missing or the head is too large
/// - transport failures
pub fn accept<T: Transport>(
    mut io: T,
    config: Config,
) -> Result<(FrameConnection<T>, HandshakeRequest)> {
    io.set_timeout(config.timeout)?;
    let mut buffer = StreamBuffer::new(io, config.read_buffer_size);

    match respond(&mut buffer, &config) {
        Ok(request) => {
            debug!("server accepted upgrade for {}", request.path);
            let conn = FrameConnection::from_buffer(buffer, Role::Server, config);
            Ok((conn, request))
        }
        Err(e) => {
            debug!("server handshake failed: {}", e);
            let _ = buffer.get_mut().shutdown();
            Err(e)
        }
    }
}

fn respond<T: Transport>(
    buffer: &mut StreamBuffer<T>,
    config: &Config,
) -> Result<HandshakeRequest> {
    let head = buffer
        .read_head(&config.limits)
        .map_err(|e| match e {
            Error::HandshakeTooLarge { size, max } => {
                Error::BadRequest(format!("Request head too large: {size} bytes (max: {max})"))
            }
            other => other,
        })?;
    trace!("upgrade request head: {} bytes", head.len());

    let request = HandshakeRequest::parse(&head)?;

    let mut response = Vec::with_capacity(160);
    HandshakeResponse::write_accepting(request.key(), &mut response);
    buffer.write_all(&response)?;
    Ok(request)
}

/// A listening WebSocket server.
///
/// Each [`Server::accept`] call waits for one TCP connection, performs the
/// handshake and hands back the connection. The headers of the most
/// recently accepted request stay available through [`Server::header`].
///
/// ```rust,no_run
/// use wsengine::{Config, Server};
///
/// let mut server = Server::bind("127.0.0.1:9001", Config::server())?;
/// let mut conn = server.accept()?;
/// while let Some(payload) = conn.receive(false)? {
///     if !conn.is_connected() {
///         break;
///     }
///     conn.send_binary(&payload)?;
/// }
/// # Ok::<(), wsengine::Error>(())
/// ```
#[derive(Debug)]
pub struct Server {
    listener: TcpListener,
    config: Config,
    request: Option<HandshakeRequest>,
}

impl Server {
    /// Listen on `addr`.
    ///
    /// # Errors
    ///
    /// `Error::Connection` if the address cannot be bound.
    pub fn bind(addr: impl ToSocketAddrs, config: Config) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| Error::Connection(format!("Unable to listen: {e}")))?;
        Ok(Self::from_listener(listener, config))
    }

    /// Listen on all interfaces, starting at `port` and moving up one port
    /// at a time while the port is taken.
    ///
    /// # Errors
    ///
    /// `Error::Connection` if no port up to [`MAX_LISTEN_PORT`] is free.
    pub fn listen(port: u16, config: Config) -> Result<Self> {
        for port in port..=MAX_LISTEN_PORT {
            match TcpListener::bind((Ipv4Addr::UNSPECIFIED, port)) {
                Ok(listener) => return Ok(Self::from_listener(listener, config)),
                Err(e) => trace!("port {} unavailable: {}", port, e),
            }
        }
        Err(Error::Connection("No valid port to listen.".into()))
    }

    #[must_use]
    pub fn from_listener(listener: TcpListener, config: Config) -> Self {
        Self {
            listener,
            config,
            request: None,
        }
    }

    /// # Errors
    ///
    /// Propagates the socket error.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr().map_or(0, |addr| addr.port())
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Wait for the next client and complete its handshake. The wait is
    /// bounded by the configured timeout.
    ///
    /// # Errors
    ///
    /// - `Error::Timeout` if no client connects in time
    /// - accept failures, and the handshake errors of [`accept`]
    pub fn accept(&mut self) -> Result<FrameConnection<TcpStream>> {
        let (stream, peer) = self.wait_for_client()?;
        debug!("accepted TCP connection from {}", peer);

        let (conn, request) = accept(stream, self.config.clone())?;
        self.request = Some(request);
        Ok(conn)
    }

    fn wait_for_client(&self) -> Result<(TcpStream, SocketAddr)> {
        let Some(timeout) = self.config.timeout.filter(|t| !t.is_zero()) else {
            return Ok(self.listener.accept()?);
        };

        self.listener.set_nonblocking(true)?;
        let deadline = Instant::now() + timeout;
        let result = loop {
            match self.listener.accept() {
                Ok(accepted) => break Ok(accepted),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    let now = Instant::now();
                    if now >= deadline {
                        trace!("no client within {:?}", timeout);
                        break Err(Error::Timeout);
                    }
                    thread::sleep(ACCEPT_POLL_INTERVAL.min(deadline - now));
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => break Err(Error::from(e)),
            }
        };
        self.listener.set_nonblocking(false)?;

        let (stream, peer) = result?;
        stream.set_nonblocking(false)?;
        Ok((stream, peer))
    }

    /// The most recently accepted upgrade request.
    #[must_use]
    pub fn request(&self) -> Option<&HandshakeRequest> {
        self.request.as_ref()
    }

    /// Case-insensitive lookup of a header in the most recently accepted
    /// request.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.request.as_ref()?.header(name)
    }
}

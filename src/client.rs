//! The initiating side: URI validation, lazy connect and the client
//! handshake.

use std::fmt;
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use log::debug;
use url::Url;

use crate::codec::StreamBuffer;
use crate::config::Config;
use crate::connection::{FrameConnection, Role};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::protocol::{ClientRequest, HandshakeResponse, OpCode, generate_key};
use crate::transport::Transport;

/// Opens the transport for a URL, honouring the connect timeout.
pub type Connector<T> = Box<dyn FnMut(&Url, Option<Duration>) -> Result<T> + Send>;

/// Run the client handshake over `io` and return the open connection.
///
/// Bytes the server sends right after its response are kept for the
/// frame decoder. On failure the transport is shut down.
///
/// # Errors
///
/// - `Error::InvalidUri` if the URL has no host
/// - `Error::InvalidHeaderValue` if a configured header contains CR/LF
/// - `Error::InvalidHandshake` if the response is not a 101 carrying the
///   expected `Sec-WebSocket-Accept`
/// - transport failures
pub fn connect<T: Transport>(io: T, url: &Url, config: Config) -> Result<FrameConnection<T>> {
    let key = generate_key()?;
    handshake(io, url, config, &key)
}

fn handshake<T: Transport>(
    mut io: T,
    url: &Url,
    config: Config,
    key: &str,
) -> Result<FrameConnection<T>> {
    let mut request = Vec::with_capacity(256);
    ClientRequest::new(url, key, &config).write(&mut request)?;

    io.set_timeout(config.timeout)?;
    let mut buffer = StreamBuffer::new(io, config.read_buffer_size);

    let result = buffer
        .write_all(&request)
        .and_then(|()| buffer.read_head(&config.limits))
        .and_then(|head| HandshakeResponse::parse(&head))
        .and_then(|response| response.verify(key));

    if let Err(e) = result {
        debug!("client handshake with {} failed: {}", url, e);
        let _ = buffer.get_mut().shutdown();
        return Err(e);
    }

    debug!("client handshake with {} complete", url);
    Ok(FrameConnection::from_buffer(buffer, Role::Client, config))
}

/// Open a plain TCP stream to the URL's host and port.
///
/// # Errors
///
/// `Error::Connection` for `wss` URLs, which need a TLS connector, and
/// when no resolved address accepts the connection.
pub fn connect_tcp(url: &Url, timeout: Option<Duration>) -> Result<TcpStream> {
    if url.scheme() == "wss" {
        return Err(Error::Connection(format!(
            "Unable to connect to socket \"{url}\": wss requires a TLS connector"
        )));
    }
    let host = url
        .host_str()
        .ok_or_else(|| Error::InvalidUri(format!("missing host in {url}")))?;
    let port = url.port_or_known_default().unwrap_or(80);

    let unable = |reason: String| {
        Error::Connection(format!("Unable to connect to socket \"{url}\": {reason}"))
    };

    let addrs = (host, port)
        .to_socket_addrs()
        .map_err(|e| unable(e.to_string()))?;

    let mut last_err = None;
    for addr in addrs {
        let attempt = match timeout.filter(|t| !t.is_zero()) {
            Some(timeout) => TcpStream::connect_timeout(&addr, timeout),
            None => TcpStream::connect(addr),
        };
        match attempt {
            Ok(stream) => {
                stream.set_nodelay(true).map_err(|e| unable(e.to_string()))?;
                return Ok(stream);
            }
            Err(e) => last_err = Some(e),
        }
    }

    Err(unable(last_err.map_or_else(
        || "no address resolved".to_string(),
        |e| e.to_string(),
    )))
}

/// Normalize and check a client URI: a missing scheme means `ws://`, and
/// only `ws` and `wss` are accepted.
///
/// # Errors
///
/// `Error::InvalidUri` for any other scheme or an unparsable URI.
pub fn parse_uri(uri: &str) -> Result<Url> {
    let url = if uri.contains("://") {
        if !uri.starts_with("ws://") && !uri.starts_with("wss://") {
            return Err(Error::InvalidUri(format!("Given URI \"{uri}\" is invalid")));
        }
        Url::parse(uri)?
    } else {
        Url::parse(&format!("ws://{uri}"))?
    };

    if url.host_str().is_none_or(str::is_empty) {
        return Err(Error::InvalidUri(format!("Given URI \"{uri}\" is invalid")));
    }
    Ok(url)
}

/// A WebSocket client bound to one URI.
///
/// The connection is opened on first use by [`Client::send`] or
/// [`Client::receive`] (or explicitly with [`Client::connect`]). Once the
/// connection has closed it is not reopened.
///
/// ```rust,no_run
/// use wsengine::{Client, Config};
///
/// let mut client = Client::with_config("localhost:8000/chat", Config::client())?;
/// client.send_text("hello")?;
/// while let Some(message) = client.receive_message(false)? {
///     println!("{message:?}");
///     break;
/// }
/// # Ok::<(), wsengine::Error>(())
/// ```
pub struct Client<T = TcpStream> {
    url: Url,
    config: Config,
    connector: Connector<T>,
    conn: Option<FrameConnection<T>>,
}

impl Client<TcpStream> {
    /// Client for `uri` with default configuration.
    ///
    /// # Errors
    ///
    /// `Error::InvalidUri` if the URI is not `ws`/`wss`.
    pub fn new(uri: &str) -> Result<Self> {
        Self::with_config(uri, Config::client())
    }

    /// # Errors
    ///
    /// `Error::InvalidUri` if the URI is not `ws`/`wss`.
    pub fn with_config(uri: &str, config: Config) -> Result<Self> {
        Self::with_connector(uri, config, connect_tcp)
    }
}

impl<T: Transport> Client<T> {
    /// Client that opens its transport with `connector`, e.g. to supply a
    /// TLS stream for `wss`.
    ///
    /// # Errors
    ///
    /// `Error::InvalidUri` if the URI is not `ws`/`wss`.
    pub fn with_connector<F>(uri: &str, config: Config, connector: F) -> Result<Self>
    where
        F: FnMut(&Url, Option<Duration>) -> Result<T> + Send + 'static,
    {
        Ok(Self {
            url: parse_uri(uri)?,
            config,
            connector: Box::new(connector),
            conn: None,
        })
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Connect and run the handshake, unless that already happened.
    ///
    /// # Errors
    ///
    /// Connect failures and handshake failures, see [`connect`].
    pub fn connect(&mut self) -> Result<&mut FrameConnection<T>> {
        if self.conn.is_none() {
            let io = (self.connector)(&self.url, self.config.timeout)?;
            self.conn = Some(connect(io, &self.url, self.config.clone())?);
        }
        self.conn
            .as_mut()
            .ok_or_else(|| Error::Connection("not connected".into()))
    }

    /// The established connection, if any.
    #[must_use]
    pub fn connection(&self) -> Option<&FrameConnection<T>> {
        self.conn.as_ref()
    }

    /// Send a message, connecting first if needed.
    ///
    /// # Errors
    ///
    /// See [`FrameConnection::send`].
    pub fn send(&mut self, payload: &[u8], opcode: OpCode, masked: bool) -> Result<()> {
        self.connect()?.send(payload, opcode, masked)
    }

    /// # Errors
    ///
    /// See [`FrameConnection::send`].
    pub fn send_text(&mut self, text: &str) -> Result<()> {
        self.connect()?.send_text(text)
    }

    /// # Errors
    ///
    /// See [`FrameConnection::send`].
    pub fn send_binary(&mut self, data: &[u8]) -> Result<()> {
        self.connect()?.send_binary(data)
    }

    /// # Errors
    ///
    /// See [`FrameConnection::send`].
    pub fn ping(&mut self, data: &[u8]) -> Result<()> {
        self.connect()?.ping(data)
    }

    /// Receive the next payload, connecting first if needed.
    ///
    /// # Errors
    ///
    /// See [`FrameConnection::receive`].
    pub fn receive(&mut self, try_only: bool) -> Result<Option<Vec<u8>>> {
        self.connect()?.receive(try_only)
    }

    /// # Errors
    ///
    /// See [`FrameConnection::receive_message`].
    pub fn receive_message(&mut self, try_only: bool) -> Result<Option<Message>> {
        self.connect()?.receive_message(try_only)
    }

    /// Close the connection, returning the peer's close reason. Does
    /// nothing if it was never opened.
    ///
    /// # Errors
    ///
    /// See [`FrameConnection::close`].
    pub fn close(&mut self, code: impl Into<u16>, reason: &str) -> Result<Option<Vec<u8>>> {
        match self.conn.as_mut() {
            Some(conn) => conn.close(code, reason),
            None => Ok(None),
        }
    }

    /// Change the timeout, applying it to a live transport.
    ///
    /// # Errors
    ///
    /// Propagates the transport's refusal.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> Result<()> {
        self.config.timeout = timeout;
        match self.conn.as_mut() {
            Some(conn) => conn.set_timeout(timeout),
            None => Ok(()),
        }
    }

    pub fn set_fragment_size(&mut self, size: usize) -> &mut Self {
        self.config.fragment_size = size;
        if let Some(conn) = self.conn.as_mut() {
            conn.set_fragment_size(size);
        }
        self
    }

    #[must_use]
    pub fn fragment_size(&self) -> usize {
        self.config.fragment_size
    }

    #[must_use]
    pub fn last_opcode(&self) -> Option<OpCode> {
        self.conn.as_ref().and_then(FrameConnection::last_opcode)
    }

    #[must_use]
    pub fn close_status(&self) -> Option<u16> {
        self.conn.as_ref().and_then(FrameConnection::close_status)
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.conn.as_ref().is_some_and(FrameConnection::is_connected)
    }
}

impl<T: fmt::Debug> fmt::Debug for Client<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("url", &self.url.as_str())
            .field("config", &self.config)
            .field("conn", &self.conn)
            .finish_non_exhaustive()
    }
}

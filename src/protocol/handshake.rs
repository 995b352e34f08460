//! WebSocket handshake implementation (RFC 6455 Section 4).
//!
//! Pure message building and parsing; the I/O side lives in
//! [`crate::client`] and [`crate::server`].

use std::collections::HashMap;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use sha1::{Digest, Sha1};
use url::Url;

use crate::config::Config;
use crate::error::{Error, Result};

/// The WebSocket GUID used in the Sec-WebSocket-Accept calculation (RFC 6455).
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Parse `Name: value` lines into a map keyed by lowercase name.
///
/// Stops at the first empty line. Lines without a colon are skipped.
fn parse_headers<'a, I>(lines: I) -> HashMap<String, String>
where
    I: Iterator<Item = &'a str>,
{
    let mut headers = HashMap::new();
    for line in lines {
        if line.is_empty() {
            break;
        }
        if let Some((name, value)) = line.split_once(':') {
            headers.insert(name.trim().to_lowercase(), value.trim().to_string());
        }
    }
    headers
}

/// Reject values that would inject extra lines into the HTTP head.
///
/// # Errors
/// Returns `Error::InvalidHeaderValue` if the value contains `\r` or `\n`.
fn validate_header_value(header_name: &str, value: &str) -> Result<()> {
    if value.contains('\r') || value.contains('\n') {
        return Err(Error::InvalidHeaderValue {
            header: header_name.to_string(),
            reason: "contains CR or LF characters".to_string(),
        });
    }
    Ok(())
}

fn push_header(buf: &mut Vec<u8>, name: &str, value: &str) -> Result<()> {
    validate_header_value(name, name)?;
    validate_header_value(name, value)?;
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
    Ok(())
}

/// Computes the Sec-WebSocket-Accept value from the client's Sec-WebSocket-Key.
///
/// The accept key is calculated as: Base64(SHA-1(key + GUID))
///
/// # Example
///
/// ```
/// use wsengine::protocol::handshake::compute_accept_key;
///
/// let key = "dGhlIHNhbXBsZSBub25jZQ==";
/// let accept = compute_accept_key(key);
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    BASE64.encode(hasher.finalize())
}

/// Generate a fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
///
/// # Errors
///
/// Returns `Error::Io` if the system random source is unavailable.
pub fn generate_key() -> Result<String> {
    let mut nonce = [0u8; 16];
    getrandom::getrandom(&mut nonce)
        .map_err(|e| Error::Io(format!("random source unavailable: {e}")))?;
    Ok(BASE64.encode(nonce))
}

/// The upgrade request a client sends.
#[derive(Debug, Clone)]
pub struct ClientRequest<'a> {
    url: &'a Url,
    key: &'a str,
    config: &'a Config,
}

impl<'a> ClientRequest<'a> {
    #[must_use]
    pub fn new(url: &'a Url, key: &'a str, config: &'a Config) -> Self {
        Self { url, key, config }
    }

    /// Target of the request line: path plus query and fragment if present.
    #[must_use]
    pub fn target(&self) -> String {
        let mut target = self.url.path().to_string();
        if target.is_empty() {
            target.push('/');
        }
        if let Some(query) = self.url.query().filter(|q| !q.is_empty()) {
            target.push('?');
            target.push_str(query);
        }
        if let Some(fragment) = self.url.fragment().filter(|f| !f.is_empty()) {
            target.push('#');
            target.push_str(fragment);
        }
        target
    }

    /// Serialize the request head.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidUri` if the URL has no host
    /// - `Error::InvalidHeaderValue` if a configured header contains CR/LF
    pub fn write(&self, buf: &mut Vec<u8>) -> Result<()> {
        let host = self
            .url
            .host_str()
            .ok_or_else(|| Error::InvalidUri(format!("missing host in {}", self.url)))?;
        let port = self
            .url
            .port_or_known_default()
            .ok_or_else(|| Error::InvalidUri(format!("missing port in {}", self.url)))?;

        buf.extend_from_slice(format!("GET {} HTTP/1.1\r\n", self.target()).as_bytes());
        push_header(buf, "Host", &format!("{host}:{port}"))?;
        push_header(buf, "User-Agent", &self.config.user_agent)?;
        push_header(buf, "Upgrade", "websocket")?;
        push_header(buf, "Connection", "Upgrade")?;
        push_header(buf, "Sec-WebSocket-Key", self.key)?;
        push_header(buf, "Sec-WebSocket-Version", "13")?;

        if let Some(origin) = self.config.origin.as_deref().filter(|o| !o.is_empty()) {
            push_header(buf, "Sec-WebSocket-Origin", origin)?;
        }

        let user = self.url.username();
        let pass = self.url.password().unwrap_or("");
        if !user.is_empty() || !pass.is_empty() {
            let credentials = BASE64.encode(format!("{user}:{pass}"));
            push_header(buf, "Authorization", &format!("Basic {credentials}"))?;
        }

        for (name, value) in &self.config.headers {
            push_header(buf, name, value)?;
        }

        buf.extend_from_slice(b"\r\n");
        Ok(())
    }
}

/// Parsed upgrade request received by a server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// The request target (e.g. `/chat?room=1`).
    pub path: String,
    /// Headers keyed by lowercase name.
    pub headers: HashMap<String, String>,
}

impl HandshakeRequest {
    /// Parse an upgrade request head.
    ///
    /// # Errors
    ///
    /// Returns `Error::BadRequest` if the first line is not
    /// `GET <path> HTTP/1.x` or the `Sec-WebSocket-Key` header is missing.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(data);
        let mut lines = text.split('\n').map(|l| l.trim_end_matches('\r'));

        let request_line = lines.next().unwrap_or("");
        let path = parse_request_line(request_line)
            .ok_or_else(|| Error::BadRequest("Invalid Request headers.".into()))?
            .to_string();

        let headers = parse_headers(lines);
        if !headers.contains_key("sec-websocket-key") {
            return Err(Error::BadRequest("No key found in upgrade request".into()));
        }

        Ok(Self { path, headers })
    }

    /// Value of the `Sec-WebSocket-Key` header.
    #[must_use]
    pub fn key(&self) -> &str {
        self.header("sec-websocket-key").unwrap_or("")
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

fn parse_request_line(line: &str) -> Option<&str> {
    let mut parts = line.split(' ').filter(|p| !p.is_empty());
    let method = parts.next()?;
    let path = parts.next()?;
    let version = parts.next()?;
    if method != "GET" || !version.starts_with("HTTP/1.") || parts.next().is_some() {
        return None;
    }
    Some(path)
}

/// Parsed server response to an upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeResponse {
    /// HTTP status code.
    pub status: u16,
    /// The Sec-WebSocket-Accept value, if present.
    pub accept: Option<String>,
    /// Headers keyed by lowercase name.
    pub headers: HashMap<String, String>,
}

impl HandshakeResponse {
    /// Write the `101 Switching Protocols` answer for `key`.
    pub fn write_accepting(key: &str, buf: &mut Vec<u8>) {
        buf.extend_from_slice(b"HTTP/1.1 101 Switching Protocols\r\n");
        buf.extend_from_slice(b"Upgrade: websocket\r\n");
        buf.extend_from_slice(b"Connection: Upgrade\r\n");
        let accept = format!("Sec-WebSocket-Accept: {}\r\n", compute_accept_key(key));
        buf.extend_from_slice(accept.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }

    /// Parse a response head.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` if the status line is malformed.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let text = String::from_utf8_lossy(data);
        let mut lines = text.split('\n').map(|l| l.trim_end_matches('\r'));

        let status_line = lines.next().unwrap_or("");
        let mut parts = status_line.split_whitespace();
        let status = match (parts.next(), parts.next()) {
            (Some(version), Some(code)) if version.starts_with("HTTP/") => code.parse().ok(),
            _ => None,
        }
        .ok_or_else(|| Error::InvalidHandshake(format!("Invalid status line: {status_line}")))?;

        let headers = parse_headers(lines);
        let accept = headers.get("sec-websocket-accept").cloned();

        Ok(Self {
            status,
            accept,
            headers,
        })
    }

    /// Check the response answers a request made with `key`.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidHandshake` unless the status is 101 and the
    /// accept value matches.
    pub fn verify(&self, key: &str) -> Result<()> {
        if self.status != 101 {
            return Err(Error::InvalidHandshake(format!(
                "Expected 101 status, got {}",
                self.status
            )));
        }
        let expected = compute_accept_key(key);
        match self.accept.as_deref() {
            Some(accept) if accept == expected => Ok(()),
            Some(accept) => Err(Error::InvalidHandshake(format!(
                "Sec-WebSocket-Accept mismatch: expected {expected}, got {accept}"
            ))),
            None => Err(Error::InvalidHandshake(
                "Missing Sec-WebSocket-Accept header".into(),
            )),
        }
    }
}

//! Read buffering over a [`Transport`].
//!
//! Bytes are appended in arrival order and consumed from the front with
//! [`BytesMut::split_to`], so a frame that arrives in many small pieces is
//! never re-copied as it grows.

use std::io;

use bytes::BytesMut;
use log::trace;

use crate::config::Limits;
use crate::error::{Error, Result};
use crate::transport::Transport;

const HEAD_TERMINATOR: &[u8] = b"\r\n\r\n";

/// Owns the transport and the bytes read from it but not yet consumed.
#[derive(Debug)]
pub struct StreamBuffer<T> {
    io: T,
    buf: BytesMut,
    scratch: Vec<u8>,
    eof: bool,
}

impl<T> StreamBuffer<T> {
    /// Wrap `io`, reading at most `read_size` bytes per transport call.
    #[must_use]
    pub fn new(io: T, read_size: usize) -> Self {
        let read_size = read_size.max(1);
        Self {
            io,
            buf: BytesMut::with_capacity(read_size),
            scratch: vec![0; read_size],
            eof: false,
        }
    }

    /// Unconsumed bytes.
    #[inline]
    #[must_use]
    pub fn buffered(&self) -> &[u8] {
        &self.buf
    }

    /// Whether the transport has reported end of stream.
    #[inline]
    #[must_use]
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    /// Remove and return the first `n` buffered bytes.
    ///
    /// Callers must have checked availability with [`Self::ensure`] or
    /// [`Self::buffered`]; asking for more than is buffered returns what
    /// is there.
    pub fn take(&mut self, n: usize) -> BytesMut {
        let n = n.min(self.buf.len());
        self.buf.split_to(n)
    }

    #[must_use]
    pub fn get_ref(&self) -> &T {
        &self.io
    }

    pub fn get_mut(&mut self) -> &mut T {
        &mut self.io
    }

    #[must_use]
    pub fn into_inner(self) -> T {
        self.io
    }

    fn append(&mut self, n: usize) {
        if n == 0 {
            self.eof = true;
        } else {
            self.buf.extend_from_slice(&self.scratch[..n]);
        }
    }
}

impl<T: Transport> StreamBuffer<T> {
    /// Make at least `n` bytes available without blocking.
    ///
    /// Returns `Ok(false)` if the transport has nothing more right now;
    /// whatever did arrive stays buffered for the next attempt.
    ///
    /// # Errors
    ///
    /// End of stream is `Error::Connection`; transport failures are
    /// propagated.
    pub fn ensure(&mut self, n: usize) -> Result<bool> {
        while self.buf.len() < n {
            match self.io.read_nonblocking(&mut self.scratch) {
                Ok(0) => {
                    self.eof = true;
                    return Err(Error::Connection("Empty read; connection dead?".into()));
                }
                Ok(read) => self.append(read),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    /// One blocking read appended to the buffer. Returns the number of
    /// bytes read; zero means end of stream.
    ///
    /// # Errors
    ///
    /// A read timeout is `Error::Timeout`; other transport failures are
    /// propagated.
    pub fn fill(&mut self) -> Result<usize> {
        loop {
            match self.io.read(&mut self.scratch) {
                Ok(n) => {
                    self.append(n);
                    return Ok(n);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Block until `n` bytes are buffered, then consume and return them.
    ///
    /// # Errors
    ///
    /// End of stream before `n` bytes is `Error::Connection`.
    pub fn read_exact(&mut self, n: usize) -> Result<BytesMut> {
        while self.buf.len() < n {
            if self.fill()? == 0 {
                return Err(Error::Connection(format!(
                    "Connection closed after {} of {} bytes",
                    self.buf.len(),
                    n
                )));
            }
        }
        Ok(self.buf.split_to(n))
    }

    /// Block until an HTTP head terminated by an empty line has arrived
    /// and return it, terminator included. Bytes following the head stay
    /// buffered. At end of stream whatever arrived is returned.
    ///
    /// # Errors
    ///
    /// `Error::HandshakeTooLarge` once more than the handshake limit
    /// arrives without a terminator, or the terminated head exceeds it.
    pub fn read_head(&mut self, limits: &Limits) -> Result<BytesMut> {
        let mut scanned = 0;
        loop {
            if let Some(pos) = self.buf[scanned..]
                .windows(HEAD_TERMINATOR.len())
                .position(|w| w == HEAD_TERMINATOR)
            {
                let end = scanned + pos + HEAD_TERMINATOR.len();
                limits.check_handshake_size(end)?;
                trace!("read {} byte handshake head", end);
                return Ok(self.buf.split_to(end));
            }
            limits.check_handshake_size(self.buf.len())?;
            scanned = self.buf.len().saturating_sub(HEAD_TERMINATOR.len() - 1);
            if self.fill()? == 0 {
                return Ok(self.buf.split());
            }
        }
    }

    /// Write all of `data` and flush.
    ///
    /// # Errors
    ///
    /// A transport that stops accepting bytes is `Error::Connection`.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let mut written = 0;
        while written < data.len() {
            match self.io.write(&data[written..]) {
                Ok(0) => {
                    return Err(Error::Connection(format!(
                        "Could only write {} out of {} bytes",
                        written,
                        data.len()
                    )));
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        self.io.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockStream;

    #[test]
    fn test_ensure_accumulates_partial_reads() {
        let mut stream = MockStream::new();
        stream.push(b"ab");
        stream.gap();
        stream.push(b"c");
        stream.gap();
        stream.push(b"def");

        let mut buffer = StreamBuffer::new(stream, 64);
        assert!(!buffer.ensure(4).unwrap());
        assert_eq!(buffer.buffered(), b"ab");
        assert!(!buffer.ensure(4).unwrap());
        assert_eq!(buffer.buffered(), b"abc");
        assert!(buffer.ensure(4).unwrap());
        assert_eq!(&buffer.take(4)[..], b"abcd");
        assert_eq!(buffer.buffered(), b"ef");
    }

    #[test]
    fn test_ensure_zero_is_ready() {
        let mut buffer = StreamBuffer::new(MockStream::new(), 64);
        assert!(buffer.ensure(0).unwrap());
    }

    #[test]
    fn test_ensure_eof_is_connection_error() {
        let mut stream = MockStream::new();
        stream.eof = true;
        let mut buffer = StreamBuffer::new(stream, 64);

        let err = buffer.ensure(1).unwrap_err();
        assert_eq!(err, Error::Connection("Empty read; connection dead?".into()));
        assert!(buffer.is_eof());
    }

    #[test]
    fn test_read_exact_small_reads() {
        let mut stream = MockStream::new();
        for b in b"hello world" {
            stream.push(&[*b]);
        }
        let mut buffer = StreamBuffer::new(stream, 1);

        assert_eq!(&buffer.read_exact(5).unwrap()[..], b"hello");
        assert_eq!(&buffer.read_exact(6).unwrap()[..], b" world");
    }

    #[test]
    fn test_read_exact_eof() {
        let mut buffer = StreamBuffer::new(MockStream::with_data(b"abc"), 64);
        let err = buffer.read_exact(4).unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[test]
    fn test_read_head_keeps_leftover() {
        let mut stream = MockStream::new();
        stream.push(b"GET / HTTP/1.1\r\nHost: x\r");
        stream.push(b"\n\r\n\x81\x00");
        let mut buffer = StreamBuffer::new(stream, 8);

        let head = buffer.read_head(&Limits::default()).unwrap();
        assert_eq!(&head[..], b"GET / HTTP/1.1\r\nHost: x\r\n\r\n");
        assert_eq!(buffer.buffered(), b"\x81\x00");
    }

    #[test]
    fn test_read_head_eof_returns_partial() {
        let mut buffer = StreamBuffer::new(MockStream::with_data(b"GET / HTTP/1.1\r\n"), 64);
        let head = buffer.read_head(&Limits::default()).unwrap();
        assert_eq!(&head[..], b"GET / HTTP/1.1\r\n");
    }

    #[test]
    fn test_read_head_too_large() {
        let data = vec![b'a'; 200];
        let mut buffer = StreamBuffer::new(MockStream::with_data(&data), 64);
        let err = buffer.read_head(&Limits::new(1024, 1024, 100)).unwrap_err();
        assert!(matches!(err, Error::HandshakeTooLarge { max: 100, .. }));
    }

    #[test]
    fn test_read_head_terminated_past_limit() {
        let head = b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n";
        let mut buffer = StreamBuffer::new(MockStream::with_data(head), 64);
        let err = buffer.read_head(&Limits::new(1024, 1024, 20)).unwrap_err();
        assert_eq!(
            err,
            Error::HandshakeTooLarge {
                size: head.len(),
                max: 20
            }
        );
    }

    #[test]
    fn test_write_all() {
        let mut buffer = StreamBuffer::new(MockStream::new(), 64);
        buffer.write_all(b"hello").unwrap();
        assert_eq!(buffer.get_ref().written, b"hello");
    }

    #[test]
    fn test_short_write() {
        let mut stream = MockStream::new();
        stream.write_limit = Some(3);
        let mut buffer = StreamBuffer::new(stream, 64);

        let err = buffer.write_all(b"hello").unwrap_err();
        assert_eq!(
            err,
            Error::Connection("Could only write 3 out of 5 bytes".into())
        );
    }
}

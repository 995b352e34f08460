//! The duplex byte stream a connection runs over.
//!
//! Writes block until complete. Reads come in two flavours: the ordinary
//! blocking [`Read::read`], bounded by the configured timeout, and
//! [`Transport::read_nonblocking`], which returns `WouldBlock` instead of
//! waiting.

use std::io::{self, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

/// An owned, bidirectional byte stream.
pub trait Transport: Read + Write {
    /// Read whatever is available without waiting.
    ///
    /// Returns `Err` with [`io::ErrorKind::WouldBlock`] when nothing is
    /// buffered by the OS and `Ok(0)` at end of stream.
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Bound blocking reads and writes. `None` waits forever.
    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    /// Shut down both directions of the stream.
    fn shutdown(&mut self) -> io::Result<()>;
}

// A zero duration is rejected by the socket API; treat it as "no timeout".
fn socket_timeout(timeout: Option<Duration>) -> Option<Duration> {
    timeout.filter(|t| !t.is_zero())
}

macro_rules! socket_transport {
    ($ty:ty) => {
        impl Transport for $ty {
            fn read_nonblocking(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                self.set_nonblocking(true)?;
                let result = self.read(buf);
                self.set_nonblocking(false)?;
                result
            }

            fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
                let timeout = socket_timeout(timeout);
                self.set_read_timeout(timeout)?;
                self.set_write_timeout(timeout)
            }

            fn shutdown(&mut self) -> io::Result<()> {
                <$ty>::shutdown(self, Shutdown::Both)
            }
        }
    };
}

socket_transport!(TcpStream);

#[cfg(unix)]
socket_transport!(std::os::unix::net::UnixStream);

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_nonblocking(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        (**self).read_nonblocking(buf)
    }

    fn set_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        (**self).set_timeout(timeout)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        (**self).shutdown()
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockStream;
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn test_mock_gaps() {
        let mut stream = MockStream::new();
        stream.push(b"ab");
        stream.gap();
        stream.push(b"cd");

        let mut buf = [0u8; 8];
        assert_eq!(stream.read_nonblocking(&mut buf).unwrap(), 2);
        let err = stream.read_nonblocking(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);
        assert_eq!(stream.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"cd");
        assert_eq!(stream.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_tcp_read_nonblocking_would_block() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let mut client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        let (mut server, _) = listener.accept().unwrap();

        let mut buf = [0u8; 16];
        let err = server.read_nonblocking(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::WouldBlock);

        client.write_all(b"ping").unwrap();
        server.set_timeout(Some(Duration::from_secs(2))).unwrap();
        // The socket is back in blocking mode after the non-blocking attempt.
        let n = server.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");

        Transport::shutdown(&mut client).unwrap();
        assert_eq!(server.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_zero_timeout_means_none() {
        assert_eq!(socket_timeout(Some(Duration::ZERO)), None);
        assert_eq!(
            socket_timeout(Some(Duration::from_millis(5))),
            Some(Duration::from_millis(5))
        );
    }
}

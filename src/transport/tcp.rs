//! Non-blocking `std::net` transport.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};

use tracing::debug;

use super::{Listener, Stream};

/// Probe size used by [`TcpStreamAdapter::available`].
const PEEK_SIZE: usize = 2048;

/// A [`Listener`] over [`std::net::TcpListener`] in non-blocking mode.
///
/// # Examples
///
/// ```rust,no_run
/// use hubhttp::transport::{Listener, TcpListenerAdapter};
///
/// let mut listener = TcpListenerAdapter::new("127.0.0.1");
/// listener.listen(8080).unwrap();
/// assert!(listener.accept().unwrap().is_none());
/// ```
#[derive(Debug)]
pub struct TcpListenerAdapter {
    host: String,
    inner: Option<TcpListener>,
}

impl TcpListenerAdapter {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            inner: None,
        }
    }

    /// Returns the bound address once listening. Useful with port `0`.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.inner.as_ref().and_then(|l| l.local_addr().ok())
    }
}

impl Listener for TcpListenerAdapter {
    type Stream = TcpStreamAdapter;

    fn listen(&mut self, port: u16) -> io::Result<()> {
        let listener = TcpListener::bind((self.host.as_str(), port))?;
        listener.set_nonblocking(true)?;
        self.inner = Some(listener);
        Ok(())
    }

    fn accept(&mut self) -> io::Result<Option<TcpStreamAdapter>> {
        let Some(listener) = self.inner.as_ref() else {
            return Ok(None);
        };
        match listener.accept() {
            Ok((stream, addr)) => {
                stream.set_nonblocking(true)?;
                stream.set_nodelay(true)?;
                debug!(peer = %addr, "tcp connection accepted");
                Ok(Some(TcpStreamAdapter {
                    inner: stream,
                    addr,
                    open: true,
                }))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn stop(&mut self) {
        self.inner = None;
    }
}

/// A [`Stream`] over a non-blocking [`std::net::TcpStream`].
#[derive(Debug)]
pub struct TcpStreamAdapter {
    inner: TcpStream,
    addr: SocketAddr,
    open: bool,
}

impl TcpStreamAdapter {
    fn peek_len(&mut self) -> io::Result<usize> {
        let mut probe = [0u8; PEEK_SIZE];
        self.inner.peek(&mut probe)
    }
}

impl Stream for TcpStreamAdapter {
    fn connected(&mut self) -> bool {
        if !self.open {
            return false;
        }
        match self.peek_len() {
            // orderly shutdown from the peer
            Ok(0) => {
                self.open = false;
                false
            }
            Ok(_) => true,
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => true,
            Err(_) => {
                self.open = false;
                false
            }
        }
    }

    fn available(&mut self) -> usize {
        if !self.open {
            return 0;
        }
        self.peek_len().unwrap_or(0)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn close(&mut self) {
        if self.open {
            let _ = self.inner.flush();
            let _ = self.inner.shutdown(Shutdown::Both);
            self.open = false;
        }
    }

    fn peer(&self) -> String {
        self.addr.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn accept_is_non_blocking_and_streams_read() {
        let mut listener = TcpListenerAdapter::new("127.0.0.1");
        listener.listen(0).unwrap();
        assert!(listener.accept().unwrap().is_none());

        let addr = listener.local_addr().unwrap();
        let mut client = TcpStream::connect(addr).unwrap();
        client.write_all(b"ping").unwrap();

        let mut stream = None;
        for _ in 0..200 {
            if let Some(s) = listener.accept().unwrap() {
                stream = Some(s);
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let mut stream = stream.expect("connection accepted");
        assert!(stream.connected());

        for _ in 0..200 {
            if stream.available() >= 4 {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let mut buf = [0u8; 8];
        let n = stream.read(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"ping");

        stream.print("pong").unwrap();
        stream.close();
        assert!(!stream.connected());

        let mut reply = Vec::new();
        client
            .set_read_timeout(Some(Duration::from_secs(2)))
            .unwrap();
        client.read_to_end(&mut reply).unwrap();
        assert_eq!(reply, b"pong");
    }
}

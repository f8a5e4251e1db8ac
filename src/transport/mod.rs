//! Socket abstraction consumed by the engine.
//!
//! On the device these traits wrap the network stack's server and client
//! sockets. [`tcp`] provides a non-blocking `std::net` implementation for
//! hosts with a full operating system.

use std::io;

pub mod tcp;

#[cfg(test)]
pub(crate) mod mock;

pub use tcp::{TcpListenerAdapter, TcpStreamAdapter};

/// A listening socket polled once per tick.
pub trait Listener {
    type Stream: Stream;

    /// Starts listening on `port`.
    fn listen(&mut self, port: u16) -> io::Result<()>;

    /// Returns a pending connection, or `None` when nobody is waiting.
    /// Must not block.
    fn accept(&mut self) -> io::Result<Option<Self::Stream>>;

    /// Stops listening. Already accepted streams are unaffected.
    fn stop(&mut self);
}

/// One accepted connection.
///
/// `read` follows `std::io::Read`: `Ok(0)` means the peer closed, and
/// [`io::ErrorKind::WouldBlock`] means no data is buffered yet.
pub trait Stream {
    fn connected(&mut self) -> bool;

    /// Number of bytes that can be read without blocking.
    fn available(&mut self) -> usize;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    /// Writes some prefix of `buf`. `Ok(0)` means no progress was made.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize>;

    /// Writes the whole string, ignoring partial-write accounting.
    fn print(&mut self, text: &str) -> io::Result<()> {
        let mut rest = text.as_bytes();
        while !rest.is_empty() {
            match self.write(rest)? {
                0 => return Err(io::ErrorKind::WriteZero.into()),
                n => rest = &rest[n..],
            }
        }
        Ok(())
    }

    fn close(&mut self);

    /// Human-readable peer identity for logs.
    fn peer(&self) -> String {
        String::from("unknown")
    }
}

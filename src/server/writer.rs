//! Chunked, deadline-bounded response writer.

use std::io;

use thiserror::Error;

use crate::http::Response;
use crate::platform::Clock;
use crate::transport::Stream;

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("socket accepted no bytes")]
    NoProgress,

    #[error("response write exceeded {elapsed_ms} ms")]
    Timeout { elapsed_ms: u64 },

    #[error("write failed: {0}")]
    Io(#[from] io::Error),
}

/// Writes a response head then its body in fixed-size chunks.
#[derive(Debug, Clone, Copy)]
pub struct ResponseWriter {
    chunk_size: usize,
    timeout_ms: u64,
}

impl ResponseWriter {
    pub fn new(chunk_size: usize, timeout_ms: u64) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            timeout_ms,
        }
    }

    /// Sends `response` on `stream`.
    ///
    /// # Errors
    ///
    /// Fails on the first write that makes no progress, on an I/O error, or
    /// once the whole response has taken longer than the write timeout.
    pub fn write<S>(&self, stream: &mut S, response: &Response, clock: &dyn Clock) -> Result<(), WriteError>
    where
        S: Stream + ?Sized,
    {
        let started = clock.now_ms();
        let head = response.encode_head();
        self.send(stream, &head, started, clock)?;
        for chunk in response.body_ref().chunks(self.chunk_size) {
            self.send(stream, chunk, started, clock)?;
        }
        Ok(())
    }

    fn send<S>(&self, stream: &mut S, mut data: &[u8], started: u64, clock: &dyn Clock) -> Result<(), WriteError>
    where
        S: Stream + ?Sized,
    {
        while !data.is_empty() {
            let elapsed_ms = clock.now_ms().saturating_sub(started);
            if elapsed_ms > self.timeout_ms {
                return Err(WriteError::Timeout { elapsed_ms });
            }
            let end = data.len().min(self.chunk_size);
            match stream.write(&data[..end]) {
                Ok(0) => return Err(WriteError::NoProgress),
                Ok(n) => data = &data[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => clock.pause(1),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::StatusCode;
    use crate::platform::ManualClock;
    use crate::transport::mock::MockPeer;

    fn response(len: usize) -> Response {
        Response::new(StatusCode::OK).body_bytes(vec![b'x'; len])
    }

    #[test]
    fn writes_head_then_body() {
        let (peer, mut stream) = MockPeer::new();
        let clock = ManualClock::new();
        ResponseWriter::new(512, 1000)
            .write(&mut stream, &response(1500), &clock)
            .unwrap();
        let out = peer.output();
        assert!(out.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(out.contains("Content-Length: 1500\r\n\r\n"));
        assert!(out.ends_with(&"x".repeat(1500)));
    }

    #[test]
    fn partial_writes_are_continued() {
        let (peer, mut stream) = MockPeer::new();
        peer.limit_writes(7);
        let clock = ManualClock::new();
        ResponseWriter::new(64, 1000)
            .write(&mut stream, &response(100), &clock)
            .unwrap();
        assert!(peer.output().ends_with(&"x".repeat(100)));
    }

    #[test]
    fn stalled_socket_is_no_progress() {
        let (peer, mut stream) = MockPeer::new();
        peer.limit_writes(0);
        let clock = ManualClock::new();
        let err = ResponseWriter::new(512, 1000)
            .write(&mut stream, &response(10), &clock)
            .unwrap_err();
        assert!(matches!(err, WriteError::NoProgress));
    }

    #[test]
    fn slow_socket_times_out() {
        let (peer, mut stream) = MockPeer::new();
        let clock = ManualClock::new();
        peer.with_costs(&clock, 0, 300);
        let err = ResponseWriter::new(16, 1000)
            .write(&mut stream, &response(200), &clock)
            .unwrap_err();
        assert!(matches!(err, WriteError::Timeout { elapsed_ms } if elapsed_ms > 1000));
    }
}

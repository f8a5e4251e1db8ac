//! One accepted client connection and the incremental request read loop.

use std::io;

use bytes::BytesMut;
use tracing::debug;

use crate::error::ExchangeError;
use crate::http::request::{Request, RequestError};
use crate::platform::Clock;
use crate::transport::Stream;

use super::ServerConfig;
use super::governor::ResourceGovernor;

/// A client connection owned by the connection table.
///
/// The stream is closed when the connection is dropped, so removing an entry
/// from the table is enough to release the socket.
pub struct Connection<S: Stream> {
    id: u64,
    stream: S,
    last_activity: u64,
}

impl<S: Stream> Connection<S> {
    pub fn new(id: u64, stream: S, now_ms: u64) -> Self {
        Self {
            id,
            stream,
            last_activity: now_ms,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn touch(&mut self, now_ms: u64) {
        self.last_activity = now_ms;
    }

    pub fn is_idle(&self, now_ms: u64, timeout_ms: u64) -> bool {
        now_ms.saturating_sub(self.last_activity) >= timeout_ms
    }

    pub fn connected(&mut self) -> bool {
        self.stream.connected()
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn peer(&self) -> String {
        self.stream.peer()
    }

    /// Waits briefly for the first byte of a request, then reads until the
    /// head parses and any declared body has arrived.
    ///
    /// Returns `Ok(None)` when nothing arrived within `available_wait_ms`; the
    /// connection is polled again on the next tick.
    ///
    /// # Errors
    ///
    /// - [`ExchangeError::Closed`] / [`ExchangeError::Read`] when the peer went away.
    /// - [`ExchangeError::PayloadTooLarge`] when the buffered request outgrows
    ///   `max_request_size`.
    /// - [`ExchangeError::BadRequest`] for a malformed head.
    /// - [`ExchangeError::ReadTimeout`] when the request is not complete within
    ///   `client_timeout_ms`.
    pub fn read_request(
        &mut self,
        config: &ServerConfig,
        governor: &ResourceGovernor,
        clock: &dyn Clock,
    ) -> Result<Option<Request>, ExchangeError> {
        if !self.wait_available(config.available_wait_ms, clock)? {
            return Ok(None);
        }

        let started = clock.now_ms();
        let mut buf = BytesMut::with_capacity(config.read_chunk_size);
        let mut chunk = vec![0u8; config.read_chunk_size.max(1)];
        let mut head: Option<(Request, usize)> = None;

        loop {
            if clock.now_ms().saturating_sub(started) > config.client_timeout_ms {
                return Err(ExchangeError::ReadTimeout {
                    timeout_ms: config.client_timeout_ms,
                });
            }

            let n = match self.stream.read(&mut chunk) {
                Ok(0) => return Err(ExchangeError::Closed),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    clock.pause(1);
                    continue;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(ExchangeError::Read(e)),
            };

            governor.check_growth(buf.len(), n)?;
            buf.extend_from_slice(&chunk[..n]);

            if head.is_none() {
                match Request::parse(&buf) {
                    Ok(parsed) => head = Some(parsed),
                    Err(RequestError::Incomplete) => continue,
                    Err(e) => return Err(e.into()),
                }
            }

            let Some((request, offset)) = head.as_ref() else {
                continue;
            };
            let Some(declared) = request.content_length() else {
                break;
            };
            let needed = offset.saturating_add(declared);
            if needed > governor.max_request_size() {
                return Err(ExchangeError::PayloadTooLarge {
                    max_bytes: governor.max_request_size(),
                });
            }
            if buf.len() >= needed {
                break;
            }
            debug!(conn = self.id, buffered = buf.len(), needed, "awaiting body");
        }

        let Some((mut request, offset)) = head else {
            return Err(ExchangeError::Closed);
        };
        let end = request
            .content_length()
            .map_or(buf.len(), |len| offset.saturating_add(len).min(buf.len()));
        request.set_body(buf.freeze().slice(offset..end));
        Ok(Some(request))
    }

    fn wait_available(&mut self, wait_ms: u64, clock: &dyn Clock) -> Result<bool, ExchangeError> {
        let start = clock.now_ms();
        loop {
            if self.stream.available() > 0 {
                return Ok(true);
            }
            if !self.stream.connected() {
                return Err(ExchangeError::Closed);
            }
            if clock.now_ms().saturating_sub(start) >= wait_ms {
                return Ok(false);
            }
            clock.pause(1);
        }
    }
}

impl<S: Stream> Drop for Connection<S> {
    fn drop(&mut self) {
        self.stream.close();
    }
}

//! Scripted in-memory transport for engine tests.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use super::{Listener, Stream};
use crate::platform::ManualClock;

#[derive(Debug, Default)]
struct PeerState {
    inbound: VecDeque<Vec<u8>>,
    outbound: Vec<u8>,
    connected: bool,
    closed: bool,
    reads: usize,
    read_cost_ms: u64,
    write_limit: Option<usize>,
    write_cost_ms: u64,
    clock: Option<ManualClock>,
}

/// Test-side handle onto a [`MockStream`] that has been handed to the server.
#[derive(Debug, Clone)]
pub(crate) struct MockPeer {
    state: Rc<RefCell<PeerState>>,
}

impl MockPeer {
    pub(crate) fn new() -> (Self, MockStream) {
        let state = Rc::new(RefCell::new(PeerState {
            connected: true,
            ..PeerState::default()
        }));
        (
            Self {
                state: Rc::clone(&state),
            },
            MockStream { state },
        )
    }

    /// Queues one chunk to be returned by a single `read` call.
    pub(crate) fn send(&self, chunk: impl AsRef<[u8]>) -> &Self {
        self.state
            .borrow_mut()
            .inbound
            .push_back(chunk.as_ref().to_vec());
        self
    }

    pub(crate) fn hang_up(&self) {
        self.state.borrow_mut().connected = false;
    }

    /// Every read or write advances `clock` by the given cost.
    pub(crate) fn with_costs(&self, clock: &ManualClock, read_ms: u64, write_ms: u64) {
        let mut state = self.state.borrow_mut();
        state.clock = Some(clock.clone());
        state.read_cost_ms = read_ms;
        state.write_cost_ms = write_ms;
    }

    /// Caps the number of bytes accepted per write; `0` stalls every write.
    pub(crate) fn limit_writes(&self, max: usize) {
        self.state.borrow_mut().write_limit = Some(max);
    }

    pub(crate) fn output(&self) -> String {
        String::from_utf8_lossy(&self.state.borrow().outbound).into_owned()
    }

    pub(crate) fn take_output(&self) -> String {
        let bytes = std::mem::take(&mut self.state.borrow_mut().outbound);
        String::from_utf8_lossy(&bytes).into_owned()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.borrow().closed
    }

    pub(crate) fn reads(&self) -> usize {
        self.state.borrow().reads
    }
}

#[derive(Debug)]
pub(crate) struct MockStream {
    state: Rc<RefCell<PeerState>>,
}

impl Stream for MockStream {
    fn connected(&mut self) -> bool {
        let state = self.state.borrow();
        state.connected && !state.closed
    }

    fn available(&mut self) -> usize {
        self.state.borrow().inbound.iter().map(Vec::len).sum()
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        state.reads += 1;
        if let Some(clock) = &state.clock {
            clock.advance(state.read_cost_ms);
        }
        let Some(mut chunk) = state.inbound.pop_front() else {
            return if state.connected {
                Err(io::ErrorKind::WouldBlock.into())
            } else {
                Ok(0)
            };
        };
        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            state.inbound.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut state = self.state.borrow_mut();
        if let Some(clock) = &state.clock {
            clock.advance(state.write_cost_ms);
        }
        let n = state.write_limit.map_or(buf.len(), |max| max.min(buf.len()));
        state.outbound.extend_from_slice(&buf[..n]);
        Ok(n)
    }

    fn close(&mut self) {
        self.state.borrow_mut().closed = true;
    }
}

/// Listener handing out pre-built [`MockStream`]s in order.
#[derive(Debug, Default)]
pub(crate) struct MockListener {
    pending: Rc<RefCell<VecDeque<MockStream>>>,
    listening: bool,
}

impl MockListener {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Returns a handle that can enqueue connections after the listener moved.
    pub(crate) fn backlog(&self) -> Backlog {
        Backlog {
            pending: Rc::clone(&self.pending),
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Backlog {
    pending: Rc<RefCell<VecDeque<MockStream>>>,
}

impl Backlog {
    /// Queues a new client connection and returns its peer handle.
    pub(crate) fn connect(&self) -> MockPeer {
        let (peer, stream) = MockPeer::new();
        self.pending.borrow_mut().push_back(stream);
        peer
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.borrow().len()
    }
}

impl Listener for MockListener {
    type Stream = MockStream;

    fn listen(&mut self, _port: u16) -> io::Result<()> {
        self.listening = true;
        Ok(())
    }

    fn accept(&mut self) -> io::Result<Option<MockStream>> {
        if !self.listening {
            return Ok(None);
        }
        Ok(self.pending.borrow_mut().pop_front())
    }

    fn stop(&mut self) {
        self.listening = false;
    }
}

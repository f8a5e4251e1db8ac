//! Device collaborators the engine depends on but does not own.
//!
//! The engine never reads the wall clock, the heap, or the watchdog directly;
//! the host supplies them through the traits below. Portable host
//! implementations are provided for desktop use and tests.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::{Duration, Instant};

/// Monotonic millisecond clock plus the cooperative pause used while polling.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin.
    fn now_ms(&self) -> u64;

    /// Yields the execution context for roughly `ms` milliseconds.
    fn pause(&self, ms: u64);
}

/// Clock backed by [`Instant`] and [`std::thread::sleep`].
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    fn pause(&self, ms: u64) {
        std::thread::sleep(Duration::from_millis(ms));
    }
}

/// A clock that only moves when told to.
///
/// `pause` advances the shared time instead of sleeping, so simulations of
/// idle timeouts and tick budgets run instantly. Clones share the same time.
///
/// # Examples
///
/// ```
/// use hubhttp::platform::{Clock, ManualClock};
///
/// let clock = ManualClock::new();
/// let view = clock.clone();
/// clock.advance(250);
/// view.pause(5);
/// assert_eq!(clock.now_ms(), 255);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, ms: u64) {
        self.now.set(self.now.get().saturating_add(ms));
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.get()
    }

    fn pause(&self, ms: u64) {
        self.advance(ms);
    }
}

/// Reports the number of free heap bytes.
pub trait MemoryProbe {
    fn free_bytes(&self) -> usize;
}

impl<F> MemoryProbe for F
where
    F: Fn() -> usize,
{
    fn free_bytes(&self) -> usize {
        self()
    }
}

/// Probe for hosts without a meaningful heap ceiling; always reports plenty.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unmetered;

impl MemoryProbe for Unmetered {
    fn free_bytes(&self) -> usize {
        usize::MAX
    }
}

/// Liveness hook reset while the engine is busy.
pub trait Watchdog {
    fn feed(&self);
}

impl<F> Watchdog for F
where
    F: Fn(),
{
    fn feed(&self) {
        self()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoWatchdog;

impl Watchdog for NoWatchdog {
    fn feed(&self) {}
}

/// Line-oriented device log that can replay its most recent lines.
pub trait LogSink {
    fn append(&self, line: &str);

    /// Returns the last `lines` lines joined with `\n`, oldest first.
    fn tail(&self, lines: usize) -> String;
}

/// A bounded in-memory [`LogSink`] that discards the oldest lines first.
///
/// # Examples
///
/// ```
/// use hubhttp::platform::{LogSink, RingLog};
///
/// let log = RingLog::with_capacity(2);
/// log.append("boot");
/// log.append("wifi up");
/// log.append("sensor ok");
/// assert_eq!(log.tail(5), "wifi up\nsensor ok");
/// ```
#[derive(Debug)]
pub struct RingLog {
    lines: RefCell<VecDeque<String>>,
    capacity: usize,
}

impl RingLog {
    pub const DEFAULT_CAPACITY: usize = 64;

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            lines: RefCell::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.lines.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.borrow().is_empty()
    }
}

impl Default for RingLog {
    fn default() -> Self {
        Self::with_capacity(Self::DEFAULT_CAPACITY)
    }
}

impl LogSink for RingLog {
    fn append(&self, line: &str) {
        let mut lines = self.lines.borrow_mut();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.to_owned());
    }

    fn tail(&self, lines: usize) -> String {
        let buffered = self.lines.borrow();
        let skip = buffered.len().saturating_sub(lines);
        buffered
            .iter()
            .skip(skip)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

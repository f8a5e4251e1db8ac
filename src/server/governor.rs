//! Resource governor: bounds on memory, request size, and time per tick.

use crate::error::ExchangeError;
use crate::platform::{Clock, MemoryProbe};

use super::ServerConfig;

/// The limits the engine enforces on every connection and every tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceGovernor {
    min_free_memory: usize,
    max_request_size: usize,
    tick_budget_ms: u64,
    max_connections: usize,
}

impl ResourceGovernor {
    pub fn from_config(config: &ServerConfig) -> Self {
        Self {
            min_free_memory: config.min_free_memory,
            max_request_size: config.max_request_size,
            tick_budget_ms: config.tick_budget_ms,
            max_connections: config.max_connections.max(1),
        }
    }

    /// Refuses work while free memory is below the configured floor.
    pub fn admit(&self, probe: &dyn MemoryProbe) -> Result<(), ExchangeError> {
        let free = probe.free_bytes();
        if free < self.min_free_memory {
            return Err(ExchangeError::ServiceUnavailable {
                free,
                floor: self.min_free_memory,
            });
        }
        Ok(())
    }

    /// Checks that appending `incoming` bytes to `buffered` stays within the ceiling.
    pub fn check_growth(&self, buffered: usize, incoming: usize) -> Result<(), ExchangeError> {
        if buffered.saturating_add(incoming) > self.max_request_size {
            return Err(ExchangeError::PayloadTooLarge {
                max_bytes: self.max_request_size,
            });
        }
        Ok(())
    }

    pub fn max_request_size(&self) -> usize {
        self.max_request_size
    }

    /// Whether the accept step may add another connection to a table of `open`.
    pub fn has_capacity(&self, open: usize) -> bool {
        open < self.max_connections
    }

    /// Starts the time budget for one sweep over the connection table.
    pub fn start_tick(&self, clock: &dyn Clock) -> TickBudget {
        TickBudget {
            started_ms: clock.now_ms(),
            budget_ms: self.tick_budget_ms,
        }
    }
}

/// Time allowance for one tick's connection sweep.
#[derive(Debug, Clone, Copy)]
pub struct TickBudget {
    started_ms: u64,
    budget_ms: u64,
}

impl TickBudget {
    pub fn exhausted(&self, clock: &dyn Clock) -> bool {
        clock.now_ms().saturating_sub(self.started_ms) > self.budget_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ManualClock;

    fn governor() -> ResourceGovernor {
        ResourceGovernor::from_config(
            &ServerConfig::default()
                .with_max_request_size(4096)
                .with_max_connections(0),
        )
    }

    #[test]
    fn admit_rejects_below_floor() {
        let g = governor();
        let low = || 1000usize;
        let high = || 64 * 1024usize;
        assert!(matches!(
            g.admit(&low),
            Err(ExchangeError::ServiceUnavailable { free: 1000, floor: 4096 })
        ));
        assert!(g.admit(&high).is_ok());
    }

    #[test]
    fn growth_is_bounded_cumulatively() {
        let g = governor();
        assert!(g.check_growth(0, 4096).is_ok());
        assert!(g.check_growth(4000, 96).is_ok());
        assert!(g.check_growth(4000, 97).is_err());
        assert!(g.check_growth(0, 5000).is_err());
    }

    #[test]
    fn zero_cap_behaves_as_one() {
        let g = governor();
        assert!(g.has_capacity(0));
        assert!(!g.has_capacity(1));
    }

    #[test]
    fn tick_budget_expires_after_limit() {
        let clock = ManualClock::new();
        let g = ResourceGovernor::from_config(
            &ServerConfig::default().with_tick_budget(std::time::Duration::from_millis(10)),
        );
        let budget = g.start_tick(&clock);
        clock.advance(10);
        assert!(!budget.exhausted(&clock));
        clock.advance(1);
        assert!(budget.exhausted(&clock));
    }
}

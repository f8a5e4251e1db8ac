//! Server configuration.
//!
//! A [`ServerConfig`] is fixed once the server is running. It can be built in
//! code with the `with_*` methods or loaded from JSON; any field missing from
//! the JSON takes its default.
//!
//! ```
//! use hubhttp::server::ServerConfig;
//!
//! let cfg = ServerConfig::from_json(r#"{ "port": 8080, "keep_alive": true }"#).unwrap();
//! assert_eq!(cfg.port, 8080);
//! assert!(cfg.keep_alive);
//! assert_eq!(cfg.max_connections, 4);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest accepted request ceiling.
pub const DEFAULT_BUFFER_SIZE: usize = 2048;

/// Largest accepted request ceiling.
pub const MAX_BUFFER_SIZE: usize = 8192;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid server configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// Settings for one [`HttpServer`](super::HttpServer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// TCP port to listen on.
    pub port: u16,
    /// Ceiling for the buffered request (start line, headers and body).
    pub max_request_size: usize,
    /// Deadline for receiving a complete request once its first byte arrived.
    pub client_timeout_ms: u64,
    /// Idle time after which a connection is pruned.
    pub connection_inactivity_timeout_ms: u64,
    /// Target size of the connection table; `0` behaves as `1`.
    pub max_connections: usize,
    /// Keep connections open after an exchange.
    pub keep_alive: bool,
    /// Mirror request and response summaries into the device log.
    pub debug: bool,

    /// Free heap below which connections are answered with `503`.
    pub min_free_memory: usize,
    /// Upper bound for one sweep over the connection table.
    pub tick_budget_ms: u64,
    /// Bytes requested from the socket per read.
    pub read_chunk_size: usize,
    /// Bytes handed to the socket per write.
    pub write_chunk_size: usize,
    /// Deadline for writing one complete response.
    pub write_timeout_ms: u64,
    /// How long a connection is polled for its first byte each tick.
    pub available_wait_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 80,
            max_request_size: MAX_BUFFER_SIZE,
            client_timeout_ms: 5000,
            connection_inactivity_timeout_ms: 300_000,
            max_connections: 4,
            keep_alive: false,
            debug: false,
            min_free_memory: 4096,
            tick_budget_ms: 256,
            read_chunk_size: DEFAULT_BUFFER_SIZE,
            write_chunk_size: 512,
            write_timeout_ms: 1000,
            available_wait_ms: 4,
        }
    }
}

impl ServerConfig {
    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Json`] for malformed JSON or mistyped fields.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(json)?;
        Ok(cfg.normalized())
    }

    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Sets the request ceiling, clamped into
    /// `DEFAULT_BUFFER_SIZE..=MAX_BUFFER_SIZE`.
    #[must_use]
    pub fn with_max_request_size(mut self, bytes: usize) -> Self {
        self.max_request_size = bytes.clamp(DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE);
        self
    }

    #[must_use]
    pub fn with_client_timeout(mut self, timeout: Duration) -> Self {
        self.client_timeout_ms = duration_ms(timeout);
        self
    }

    #[must_use]
    pub fn with_connection_inactivity_timeout(mut self, timeout: Duration) -> Self {
        self.connection_inactivity_timeout_ms = duration_ms(timeout);
        self
    }

    /// Sets the connection cap; `0` is treated as `1`.
    #[must_use]
    pub fn with_max_connections(mut self, max: usize) -> Self {
        self.max_connections = max.max(1);
        self
    }

    #[must_use]
    pub fn with_keep_alive(mut self, enabled: bool) -> Self {
        self.keep_alive = enabled;
        self
    }

    #[must_use]
    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    #[must_use]
    pub fn with_min_free_memory(mut self, bytes: usize) -> Self {
        self.min_free_memory = bytes;
        self
    }

    #[must_use]
    pub fn with_tick_budget(mut self, budget: Duration) -> Self {
        self.tick_budget_ms = duration_ms(budget);
        self
    }

    #[must_use]
    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout_ms = duration_ms(timeout);
        self
    }

    /// Repairs values the engine cannot run with: a zero connection cap,
    /// zero-sized I/O chunks and a request ceiling outside
    /// `DEFAULT_BUFFER_SIZE..=MAX_BUFFER_SIZE`.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_request_size = self.max_request_size.clamp(DEFAULT_BUFFER_SIZE, MAX_BUFFER_SIZE);
        self.max_connections = self.max_connections.max(1);
        self.read_chunk_size = self.read_chunk_size.max(1);
        self.write_chunk_size = self.write_chunk_size.max(1);
        self
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}

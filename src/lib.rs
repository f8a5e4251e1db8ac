//! # hubhttp
//!
//! A cooperative HTTP/1.1 server engine for memory-constrained network devices.
//!
//! The host owns the main loop and calls [`HttpServer::tick`] repeatedly. Each
//! tick accepts at most one connection and services a small, bounded table of
//! connections without blocking, so sensor polling and other device work keep
//! running between ticks.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::rc::Rc;
//!
//! use hubhttp::http::{Request, Response, StatusCode};
//! use hubhttp::platform::RingLog;
//! use hubhttp::security::CorsPolicy;
//! use hubhttp::server::{HttpServer, ServerConfig};
//! use hubhttp::transport::TcpListenerAdapter;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut server = HttpServer::new(TcpListenerAdapter::new("0.0.0.0"));
//!     server.attach_log(Rc::new(RingLog::default()));
//!     server.enable_cors(CorsPolicy::new());
//!     server.get("/api/temp/:sensor", |req: &Request| {
//!         Response::new(StatusCode::OK).text(format!("{} = 21.5", req.param("sensor").unwrap_or("?")))
//!     });
//!
//!     server.begin_with(ServerConfig::default().with_port(8080))?;
//!     loop {
//!         server.tick();
//!         std::thread::sleep(std::time::Duration::from_millis(2));
//!     }
//! }
//! ```

pub mod error;
pub mod http;
pub mod middleware;
pub mod platform;
pub mod router;
pub mod security;
pub mod server;
pub mod transport;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use error::{BoxError, ExchangeError};
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use middleware::Flow;
pub use server::{HttpServer, ServerConfig, ServerError};

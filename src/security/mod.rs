//! Security concerns applied by the engine around every exchange.
//!
//! Currently implemented:
//!
//! - [`CorsPolicy`]: Cross-Origin Resource Sharing header injection and
//!   preflight (`OPTIONS`) short-circuiting.

pub mod cors;

pub use cors::CorsPolicy;

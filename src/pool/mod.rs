//! Router connection pool.
//!
//! # Data Flow
//! ```text
//! ConnectorPool::run
//!     → one slot per (router, window index)
//!     → websocket::connect (register)
//!     → websocket::run_socket (engine until Closed)
//!     → graceful: reconnect now / failed: backoff, then reconnect
//! ```

pub mod connector;

pub use connector::{ConnectorPool, PoolError};

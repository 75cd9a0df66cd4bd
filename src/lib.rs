//! Reverse-tunnel connector library.
//!
//! Registers outbound WebSocket connections with one or more routers and replays the
//! requests they carry against a private backend.

pub mod backend;
pub mod config;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod pool;
pub mod protocol;
pub mod resilience;

pub use backend::{HyperForwarder, RequestForwarder};
pub use config::schema::ConnectorConfig;
pub use lifecycle::Shutdown;
pub use pool::ConnectorPool;
pub use protocol::{ConnectorError, ConnectorSocket, RequestPreamble};

//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ConnectorPool slot
//!     → tls.rs (rustls client config, optional trust-all)
//!     → websocket.rs (register with router, credit-gated reader, writer task)
//!     → transport.rs (Transport trait handed to the engine)
//!     → connection.rs (socket IDs, open socket accounting)
//! ```
//!
//! # Design Decisions
//! - The engine only sees the `Transport` trait; WebSocket details stay here
//! - TLS trust is an explicit value passed at construction, never global state

pub mod connection;
pub mod tls;
pub mod transport;
pub mod websocket;

pub use connection::{ConnectionId, SocketTracker};
pub use transport::Transport;

//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → slots stop reconnecting → live sockets close with 1001 → pool exits
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: stop reconnecting, close sockets, wait for the close handshake
//! - Each close handshake is bounded by `timeouts.close_secs`

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::{spawn_signal_handler, wait_for_signal};

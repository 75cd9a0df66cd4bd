//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Socket slot terminated with an error:
//!     → backoff.rs (exponential delay with jitter)
//!     → reconnect
//! ```
//!
//! # Design Decisions
//! - The engine never retries; reconnection policy lives with the pool
//! - A graceful close resets the backoff and reconnects immediately

pub mod backoff;

pub use backoff::{calculate_backoff, Backoff};

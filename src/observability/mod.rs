//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! engine, pool, backend
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!
//! Consumers:
//!     → stdout
//!     → Metrics endpoint (Prometheus scrape)
//! ```
//!
//! # Design Decisions
//! - Connection ID flows through every socket log line
//! - Metrics calls are no-ops until a recorder is installed

pub mod logging;
pub mod metrics;

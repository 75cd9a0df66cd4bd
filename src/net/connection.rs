//! Connector socket identity and accounting.
//!
//! # Responsibilities
//! - Generate unique socket IDs for tracing
//! - Count open sockets so the pool and shutdown can observe them

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::watch;

/// Relaxed ordering is enough; IDs only need to be unique.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connector socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Counts sockets that reached `Open` and have not yet closed.
///
/// A watch channel holds the current count.
#[derive(Debug, Clone)]
pub struct SocketTracker {
    opened_total: Arc<AtomicU64>,
    open: Arc<watch::Sender<u64>>,
}

impl SocketTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            opened_total: Arc::new(AtomicU64::new(0)),
            open: Arc::new(tx),
        }
    }

    /// Record a socket becoming usable.
    pub fn opened(&self) {
        self.opened_total.fetch_add(1, Ordering::Relaxed);
        self.open.send_modify(|n| *n += 1);
    }

    /// Record an open socket terminating.
    pub fn closed(&self) {
        self.open.send_modify(|n| *n = n.saturating_sub(1));
    }

    /// Sockets currently open.
    pub fn open_count(&self) -> u64 {
        *self.open.borrow()
    }

    /// Sockets opened since the tracker was created.
    pub fn opened_total(&self) -> u64 {
        self.opened_total.load(Ordering::Relaxed)
    }
}

impl Default for SocketTracker {
    fn default() -> Self {
        Self::new()
    }
}

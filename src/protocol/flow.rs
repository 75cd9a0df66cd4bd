//! Response flow control.
//!
//! The router acknowledges response bytes with `WindowUpdate` frames. The response pump
//! waits while the unacknowledged total sits at or above the high watermark.

use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use tokio::sync::Notify;

/// Tracks unacknowledged response bytes for one stream.
#[derive(Debug)]
pub struct FlowWindow {
    unacked: AtomicI64,
    high_watermark: i64,
    notify: Notify,
    closed: AtomicBool,
}

impl FlowWindow {
    pub fn new(high_watermark: usize) -> Self {
        Self {
            unacked: AtomicI64::new(0),
            high_watermark: i64::try_from(high_watermark).unwrap_or(i64::MAX),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Account for bytes written to the router.
    pub fn record_sent(&self, bytes: usize) {
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        self.unacked.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Release bytes acknowledged by a `WindowUpdate` frame.
    pub fn acknowledge(&self, bytes: u32) {
        self.unacked.fetch_sub(i64::from(bytes), Ordering::AcqRel);
        self.notify.notify_waiters();
    }

    pub fn unacknowledged(&self) -> i64 {
        self.unacked.load(Ordering::Acquire)
    }

    fn has_capacity(&self) -> bool {
        self.unacknowledged() < self.high_watermark
    }

    /// Wait until more bytes may be sent. Returns false once the window is closed.
    pub async fn wait_for_capacity(&self) -> bool {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Register before checking so an update between the check and the await is not lost.
            notified.as_mut().enable();

            if self.closed.load(Ordering::Acquire) {
                return false;
            }
            if self.has_capacity() {
                return true;
            }
            notified.await;
        }
    }

    /// Wake every waiter and refuse further sends.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn capacity_available_below_watermark() {
        let window = FlowWindow::new(10);
        window.record_sent(9);
        assert!(window.wait_for_capacity().await);
    }

    #[tokio::test]
    async fn waits_until_acknowledged() {
        let window = Arc::new(FlowWindow::new(10));
        window.record_sent(10);

        let waiter = {
            let window = window.clone();
            tokio::spawn(async move { window.wait_for_capacity().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        window.acknowledge(4);
        let ready = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert!(ready);
        assert_eq!(window.unacknowledged(), 6);
    }

    #[tokio::test]
    async fn close_releases_waiters() {
        let window = Arc::new(FlowWindow::new(1));
        window.record_sent(5);
        let waiter = {
            let window = window.clone();
            tokio::spawn(async move { window.wait_for_capacity().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        window.close();
        assert!(!waiter.await.unwrap());
        assert!(window.is_closed());
    }
}

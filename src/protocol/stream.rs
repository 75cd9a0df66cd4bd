//! Shared state of the request/response stream in flight on a socket.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use crate::protocol::flow::FlowWindow;

/// State shared between the engine and the response sink of one request.
///
/// The request id may be bound after forwarding has started: a text preamble carries
/// no id, so the first `Data` frame supplies it.
#[derive(Debug)]
pub struct StreamControl {
    request_id: AtomicU32,
    bound: AtomicBool,
    window: FlowWindow,
    head_sent: AtomicBool,
    finished: AtomicBool,
}

impl StreamControl {
    pub fn new(request_id: Option<u32>, high_watermark: usize) -> Self {
        Self {
            request_id: AtomicU32::new(request_id.unwrap_or(0)),
            bound: AtomicBool::new(request_id.is_some()),
            window: FlowWindow::new(high_watermark),
            head_sent: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    /// Current request id (0 until bound).
    pub fn request_id(&self) -> u32 {
        self.request_id.load(Ordering::Acquire)
    }

    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire)
    }

    /// Bind the id if none is bound yet. Returns true when `id` is (now) the stream's id.
    pub fn bind(&self, id: u32) -> bool {
        if self.is_bound() {
            return self.request_id() == id;
        }
        self.request_id.store(id, Ordering::Release);
        self.bound.store(true, Ordering::Release);
        true
    }

    pub fn window(&self) -> &FlowWindow {
        &self.window
    }

    /// Returns true the first time it is called.
    pub fn mark_head_sent(&self) -> bool {
        !self.head_sent.swap(true, Ordering::AcqRel)
    }

    pub fn head_sent(&self) -> bool {
        self.head_sent.load(Ordering::Acquire)
    }

    /// Returns true the first time it is called.
    pub fn mark_finished(&self) -> bool {
        !self.finished.swap(true, Ordering::AcqRel)
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Stop the response pump. Idempotent.
    pub fn cancel(&self) {
        self.window.close();
    }

    pub fn is_cancelled(&self) -> bool {
        self.window.is_closed()
    }
}

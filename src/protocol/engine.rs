//! Per-connection protocol state machine.
//!
//! # Responsibilities
//! - Drive the `New → Open → Closing → Closed` lifecycle
//! - Reassemble text and binary fragments
//! - Validate binary message types and route payloads by request id
//! - Spawn backend forwarding and collect its completion without blocking delivery
//! - Keep transport credit flowing and notify the listener exactly once
//!
//! # Data Flow
//! ```text
//! Frame ─► handle() ─┬─ Text ──────► preamble ─► start_request ─► spawned forward ─┐
//!                    ├─ Binary ────► decode ─┬─ HEADER ────────► start_request      │
//!                    │                       ├─ DATA ──────────► body channel       │
//!                    │                       ├─ RST_STREAM ────► cancel             │
//!                    │                       ├─ WINDOW_UPDATE ─► FlowWindow         │
//!                    │                       └─ unknown ───────► fail(1002)         │
//!                    ├─ Ping/Pong ─► request(1)                                     │
//!                    ├─ Error ─────► fail(1011)                                     │
//!                    └─ PeerClose ─► Closed, on_close(None)                         │
//!                                                                                   │
//! on_forward_complete ◄──────────────── completion channel ◄────────────────────────┘
//! ```
//!
//! # Design Decisions
//! - Handlers take `&mut self`; a single driver task owns each socket, so no locks.
//! - Only one request is in flight per socket. A new preamble replaces and cancels the
//!   previous one.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, Bytes, BytesMut};
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::backend::forwarder::{
    ForwardError, ForwardRequest, ForwardResult, RequestBody, RequestForwarder,
};
use crate::backend::sink::ResponseSink;
use crate::config::ProtocolConfig;
use crate::net::transport::Transport;
use crate::observability::metrics;
use crate::protocol::error::{ConnectorError, TransportError};
use crate::protocol::frame::{BinaryFrame, Frame};
use crate::protocol::listener::{observe, ProxyEventListener, SocketInfo, SocketListener};
use crate::protocol::message_type::MessageType;
use crate::protocol::preamble::RequestPreamble;
use crate::protocol::stream::StreamControl;

/// Lifecycle of a connector socket. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SocketState {
    New,
    Open,
    Closing,
    Closed,
}

/// Event capabilities every protocol version implements.
pub trait ProtocolSocket {
    fn on_open(&mut self);
    fn on_text(&mut self, text: &str, last: bool);
    fn on_binary(&mut self, data: Bytes, last: bool);
    fn on_ping(&mut self, payload: Bytes);
    fn on_pong(&mut self, payload: Bytes);
    fn on_error(&mut self, error: TransportError);
    fn on_close(&mut self, code: u16, reason: &str);
    fn state(&self) -> SocketState;

    /// Dispatch one transport event.
    fn handle(&mut self, frame: Frame) {
        match frame {
            Frame::Text { content, last } => self.on_text(&content, last),
            Frame::Binary { data, last } => self.on_binary(data, last),
            Frame::Ping(payload) => self.on_ping(payload),
            Frame::Pong(payload) => self.on_pong(payload),
            Frame::TransportError(error) => self.on_error(error),
            Frame::PeerClose { code, reason } => self.on_close(code, &reason),
        }
    }
}

/// Collaborators shared by every socket of a pool.
pub struct SocketContext {
    pub forwarder: Arc<dyn RequestForwarder>,
    pub listener: Arc<dyn SocketListener>,
    pub events: Arc<dyn ProxyEventListener>,
    pub protocol: ProtocolConfig,
    /// Keep-alive ping period. `None` disables pings.
    pub ping_interval: Option<Duration>,
    pub runtime: tokio::runtime::Handle,
}

/// Result of one spawned forwarding task.
#[derive(Debug)]
pub struct Completion {
    pub seq: u64,
    pub outcome: ForwardResult<()>,
}

struct InFlight {
    seq: u64,
    stream: Arc<StreamControl>,
    body_tx: Option<mpsc::Sender<Bytes>>,
    task: AbortHandle,
    started: Instant,
}

impl InFlight {
    fn cancel(self) {
        self.stream.cancel();
        self.task.abort();
    }
}

/// v3 connector socket.
pub struct ConnectorSocket {
    info: SocketInfo,
    transport: Arc<dyn Transport>,
    context: Arc<SocketContext>,
    state: SocketState,
    close_notified: bool,
    close_error: Option<ConnectorError>,
    pending_text: String,
    pending_binary: BytesMut,
    pending_header: String,
    in_flight: Option<InFlight>,
    next_seq: u64,
    completions: mpsc::UnboundedSender<Completion>,
    keepalive: Option<AbortHandle>,
}

impl ConnectorSocket {
    /// Create a socket in the `New` state. Forwarding completions arrive on the returned
    /// receiver and must be fed back through [`on_forward_complete`](Self::on_forward_complete).
    pub fn new(
        info: SocketInfo,
        transport: Arc<dyn Transport>,
        context: Arc<SocketContext>,
    ) -> (Self, mpsc::UnboundedReceiver<Completion>) {
        let (completions, rx) = mpsc::unbounded_channel();
        let socket = Self {
            info,
            transport,
            context,
            state: SocketState::New,
            close_notified: false,
            close_error: None,
            pending_text: String::new(),
            pending_binary: BytesMut::new(),
            pending_header: String::new(),
            in_flight: None,
            next_seq: 0,
            completions,
            keepalive: None,
        };
        (socket, rx)
    }

    pub fn info(&self) -> &SocketInfo {
        &self.info
    }

    /// The error that terminated the socket, if any.
    pub fn close_error(&self) -> Option<&ConnectorError> {
        self.close_error.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.state == SocketState::Closed
    }

    /// Request id of the stream in flight, when one is bound.
    pub fn in_flight_request(&self) -> Option<u32> {
        self.in_flight
            .as_ref()
            .filter(|f| f.stream.is_bound())
            .map(|f| f.stream.request_id())
    }

    /// Start a graceful close from this side. The listener is notified once the peer
    /// answers or the transport goes away.
    pub fn close(&mut self, code: u16, reason: &str) {
        if self.state >= SocketState::Closing {
            return;
        }
        tracing::info!(connection_id = %self.info.id, code = code, reason = %reason, "Closing connector socket");
        self.state = SocketState::Closing;
        self.transport.send_close(code, reason);
        self.teardown();
    }

    /// The transport stopped delivering events without a close frame, or the close
    /// handshake timed out.
    pub fn on_transport_finished(&mut self) {
        if self.state == SocketState::Closed {
            return;
        }
        let was_open = self.state < SocketState::Closing;
        self.state = SocketState::Closed;
        self.teardown();
        self.transport.abort();

        if was_open {
            let error = ConnectorError::Transport(TransportError::new(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection ended without a close frame",
            )));
            tracing::warn!(connection_id = %self.info.id, "Transport ended unexpectedly");
            self.notify_close(Some(error));
        } else {
            self.notify_close(None);
        }
    }

    /// Feed back the result of a spawned forwarding task.
    pub fn on_forward_complete(&mut self, completion: Completion) {
        let current = self.in_flight.as_ref().map(|f| f.seq);
        if current != Some(completion.seq) {
            tracing::trace!(connection_id = %self.info.id, seq = completion.seq, "Stale forward completion");
            return;
        }
        let Some(done) = self.in_flight.take() else {
            return;
        };
        let outcome = match &completion.outcome {
            Ok(()) => "success",
            Err(e) => {
                tracing::warn!(
                    connection_id = %self.info.id,
                    request_id = done.stream.request_id(),
                    error = %e,
                    "Forwarding failed"
                );
                e.outcome()
            }
        };
        self.record_finished(&done, outcome);
    }

    fn record_finished(&self, done: &InFlight, outcome: &'static str) {
        tracing::debug!(
            connection_id = %self.info.id,
            request_id = done.stream.request_id(),
            outcome = outcome,
            elapsed_ms = done.started.elapsed().as_millis() as u64,
            "Request finished"
        );
        metrics::record_request(outcome, done.started);
        observe(
            &self.info,
            "request_finished",
            self.context.events.on_request_finished(&self.info, outcome),
        );
    }

    fn start_keepalive(&mut self) {
        let Some(period) = self.context.ping_interval.filter(|p| !p.is_zero()) else {
            return;
        };
        let transport = self.transport.clone();
        let task = self.context.runtime.spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                transport.send_ping(Bytes::new());
            }
        });
        self.keepalive = Some(task.abort_handle());
    }

    /// Events outside `Open` are dropped. While closing, credit keeps flowing so the
    /// peer's close frame can still be read.
    fn ignore_event(&self, kind: &'static str) {
        tracing::trace!(connection_id = %self.info.id, state = ?self.state, kind = kind, "Ignoring event");
        if self.state == SocketState::Closing {
            self.transport.request(1);
        }
    }

    fn fail(&mut self, error: ConnectorError) {
        if self.state >= SocketState::Closing {
            return;
        }
        if error.is_protocol_violation() {
            metrics::record_protocol_violation();
            tracing::warn!(connection_id = %self.info.id, error = %error, "Protocol violation");
        }
        self.state = SocketState::Closing;
        self.transport.send_close(error.close_code(), &error.close_reason());
        self.teardown();
        self.transport.request(1);
        self.notify_close(Some(error));
    }

    fn notify_close(&mut self, error: Option<ConnectorError>) {
        if self.close_notified {
            return;
        }
        self.close_notified = true;
        self.close_error = error;
        self.context
            .listener
            .on_close(&self.info, self.close_error.as_ref());
    }

    fn teardown(&mut self) {
        if let Some(in_flight) = self.in_flight.take() {
            in_flight.cancel();
        }
        if let Some(keepalive) = self.keepalive.take() {
            keepalive.abort();
        }
        self.pending_text.clear();
        self.pending_binary.clear();
        self.pending_header.clear();
    }

    fn start_request(&mut self, raw: String, request_id: Option<u32>, end_stream: Option<bool>) {
        let preamble = RequestPreamble::parse(raw);
        if let Some(previous) = self.in_flight.take() {
            tracing::debug!(
                connection_id = %self.info.id,
                request_id = previous.stream.request_id(),
                "New request replaces the one in flight"
            );
            self.record_finished(&previous, "cancelled");
            previous.cancel();
        }

        let has_body = match end_stream {
            Some(end) => !end,
            None => preamble.has_body(),
        };
        tracing::debug!(
            connection_id = %self.info.id,
            method = %preamble.method(),
            path = %preamble.path(),
            has_body = has_body,
            "Request received"
        );
        observe(
            &self.info,
            "request_received",
            self.context.events.on_request_received(&self.info, &preamble),
        );

        let protocol = &self.context.protocol;
        let stream = Arc::new(StreamControl::new(request_id, protocol.window_high_watermark));
        let (body_tx, body) = if has_body {
            let (tx, rx) = mpsc::channel(protocol.body_channel_capacity.max(1));
            (Some(tx), Some(RequestBody::new(rx)))
        } else {
            (None, None)
        };

        let sink = ResponseSink::new(
            self.transport.clone(),
            stream.clone(),
            self.info.clone(),
            self.context.events.clone(),
        );
        let seq = self.next_seq;
        self.next_seq += 1;

        let forward = self
            .context
            .forwarder
            .forward(ForwardRequest { preamble, body }, sink.clone());
        let completions = self.completions.clone();
        let task = self.context.runtime.spawn(async move {
            let outcome = match forward.await {
                Ok(()) if sink.head_sent() => sink.finish(),
                Ok(()) => Err(ForwardError::InvalidRequest(
                    "forwarder returned without a response".to_string(),
                )),
                Err(e) => Err(e),
            };
            if let Err(e) = &outcome {
                if !matches!(e, ForwardError::Cancelled) {
                    sink.reset(&e.to_string());
                }
            }
            let _ = completions.send(Completion { seq, outcome });
        });

        self.in_flight = Some(InFlight {
            seq,
            stream,
            body_tx,
            task: task.abort_handle(),
            started: Instant::now(),
        });
    }

    fn on_header(&mut self, frame: BinaryFrame) {
        self.pending_header
            .push_str(&String::from_utf8_lossy(&frame.payload));
        self.transport.request(1);
        if frame.is_end_header() {
            let raw = std::mem::take(&mut self.pending_header);
            self.start_request(raw, Some(frame.request_id), Some(frame.is_end_stream()));
        }
    }

    fn on_data(&mut self, frame: BinaryFrame) {
        let id = self.info.id;
        let Some(in_flight) = self.in_flight.as_mut() else {
            tracing::warn!(connection_id = %id, request_id = frame.request_id, "Data frame without a request in flight");
            self.transport.request(1);
            return;
        };
        if !in_flight.stream.bind(frame.request_id) {
            tracing::warn!(
                connection_id = %id,
                request_id = frame.request_id,
                in_flight = in_flight.stream.request_id(),
                "Dropping stale data frame"
            );
            self.transport.request(1);
            return;
        }

        let end_stream = frame.is_end_stream();
        let payload = frame.payload;
        let mut deferred = false;

        match in_flight.body_tx.as_ref() {
            Some(tx) if !payload.is_empty() => {
                metrics::record_body_bytes("request", payload.len());
                match tx.try_send(payload) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(chunk)) => {
                        let tx = tx.clone();
                        let transport = self.transport.clone();
                        deferred = true;
                        self.context.runtime.spawn(async move {
                            let _ = tx.send(chunk).await;
                            transport.request(1);
                        });
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => {
                        tracing::debug!(connection_id = %id, "Backend stopped reading the request body");
                    }
                }
            }
            Some(_) => {}
            None if !payload.is_empty() => {
                tracing::warn!(connection_id = %id, request_id = frame.request_id, "Body chunk for a request without body");
            }
            None => {}
        }

        if end_stream {
            in_flight.body_tx = None;
        }
        if !deferred {
            self.transport.request(1);
        }
    }

    fn on_rst_stream(&mut self, frame: BinaryFrame) {
        let mut payload = frame.payload;
        let code = if payload.len() >= 4 { payload.get_u32() } else { 0 };
        let message = String::from_utf8_lossy(&payload).into_owned();

        let matches = self
            .in_flight
            .as_ref()
            .is_some_and(|f| !f.stream.is_bound() || f.stream.request_id() == frame.request_id);
        if matches {
            if let Some(in_flight) = self.in_flight.take() {
                tracing::info!(
                    connection_id = %self.info.id,
                    request_id = frame.request_id,
                    code = code,
                    message = %message,
                    "Stream reset by router"
                );
                self.record_finished(&in_flight, "cancelled");
                in_flight.cancel();
            }
        } else {
            tracing::debug!(connection_id = %self.info.id, request_id = frame.request_id, "Reset for unknown stream");
        }
        self.transport.request(1);
    }

    fn on_window_update(&mut self, frame: BinaryFrame) {
        let mut payload = frame.payload;
        if payload.len() >= 4 {
            let acked = payload.get_u32();
            if let Some(in_flight) = self.in_flight.as_ref() {
                if in_flight.stream.request_id() == frame.request_id {
                    in_flight.stream.window().acknowledge(acked);
                }
            }
        } else {
            tracing::debug!(connection_id = %self.info.id, "Window update without byte count");
        }
        self.transport.request(1);
    }
}

impl ProtocolSocket for ConnectorSocket {
    fn on_open(&mut self) {
        if self.state != SocketState::New {
            return;
        }
        self.state = SocketState::Open;
        tracing::info!(connection_id = %self.info.id, router = %self.info.router, "Connector socket open");
        self.start_keepalive();
        self.transport.request(1);
        self.context.listener.on_connection_acquired(&self.info);
    }

    fn on_text(&mut self, text: &str, last: bool) {
        if self.state != SocketState::Open {
            self.ignore_event("text");
            return;
        }
        self.pending_text.push_str(text);
        self.transport.request(1);
        if last {
            let raw = std::mem::take(&mut self.pending_text);
            self.start_request(raw, None, None);
        }
    }

    fn on_binary(&mut self, data: Bytes, last: bool) {
        if self.state != SocketState::Open {
            self.ignore_event("binary");
            return;
        }
        if !last {
            self.pending_binary.extend_from_slice(&data);
            self.transport.request(1);
            return;
        }
        let data = if self.pending_binary.is_empty() {
            data
        } else {
            self.pending_binary.extend_from_slice(&data);
            self.pending_binary.split().freeze()
        };

        let frame = match BinaryFrame::decode(data) {
            Ok(frame) => frame,
            Err(len) => {
                self.fail(ConnectorError::TruncatedFrame { len });
                return;
            }
        };
        let Some(message_type) = self.context.protocol.version.lookup(frame.message_type) else {
            self.fail(ConnectorError::UnknownMessageType {
                message_type: frame.message_type,
                request_id: frame.request_id,
            });
            return;
        };

        tracing::trace!(
            connection_id = %self.info.id,
            message_type = message_type.as_str(),
            request_id = frame.request_id,
            flags = frame.flags,
            len = frame.payload.len(),
            "Binary frame"
        );
        match message_type {
            MessageType::Data => self.on_data(frame),
            MessageType::Header => self.on_header(frame),
            MessageType::RstStream => self.on_rst_stream(frame),
            MessageType::WindowUpdate => self.on_window_update(frame),
        }
    }

    fn on_ping(&mut self, _payload: Bytes) {
        if self.state == SocketState::Closed {
            return;
        }
        self.transport.request(1);
    }

    fn on_pong(&mut self, _payload: Bytes) {
        if self.state == SocketState::Closed {
            return;
        }
        self.transport.request(1);
    }

    fn on_error(&mut self, error: TransportError) {
        match self.state {
            SocketState::Closed => {
                tracing::debug!(connection_id = %self.info.id, error = %error, "Transport error after close");
            }
            SocketState::Closing => {
                tracing::debug!(connection_id = %self.info.id, error = %error, "Transport error while closing");
                self.state = SocketState::Closed;
                self.transport.abort();
                self.notify_close(Some(ConnectorError::Transport(error)));
            }
            SocketState::New | SocketState::Open => {
                metrics::record_transport_error();
                tracing::error!(connection_id = %self.info.id, error = %error, "Transport error");
                self.fail(ConnectorError::Transport(error));
            }
        }
    }

    fn on_close(&mut self, code: u16, reason: &str) {
        if self.state == SocketState::Closed {
            return;
        }
        tracing::info!(connection_id = %self.info.id, code = code, reason = %reason, "Connector socket closed");
        self.state = SocketState::Closed;
        self.teardown();
        self.notify_close(None);
    }

    fn state(&self) -> SocketState {
        self.state
    }
}

impl Drop for ConnectorSocket {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::forwarder::forward_fn;
    use crate::protocol::close_code;
    use crate::protocol::listener::NoopEvents;
    use crate::protocol::message_type::flags;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct WireLog {
        credit: AtomicU64,
        closes: Mutex<Vec<(u16, String)>>,
        binaries: Mutex<Vec<Bytes>>,
    }

    impl Transport for WireLog {
        fn send_text(&self, _text: String) {}
        fn send_binary(&self, data: Bytes) {
            self.binaries.lock().unwrap().push(data);
        }
        fn send_ping(&self, _payload: Bytes) {}
        fn send_pong(&self, _payload: Bytes) {}
        fn send_close(&self, code: u16, reason: &str) {
            self.closes.lock().unwrap().push((code, reason.to_string()));
        }
        fn request(&self, n: u64) {
            self.credit.fetch_add(n, Ordering::SeqCst);
        }
        fn abort(&self) {}
    }

    #[derive(Default)]
    struct Calls {
        acquired: AtomicU64,
        closed: Mutex<Vec<Option<String>>>,
    }

    impl SocketListener for Calls {
        fn on_connection_acquired(&self, _socket: &SocketInfo) {
            self.acquired.fetch_add(1, Ordering::SeqCst);
        }
        fn on_close(&self, _socket: &SocketInfo, error: Option<&ConnectorError>) {
            self.closed.lock().unwrap().push(error.map(|e| e.to_string()));
        }
    }

    fn socket(
        forwarder: Arc<dyn RequestForwarder>,
    ) -> (ConnectorSocket, mpsc::UnboundedReceiver<Completion>, Arc<WireLog>, Arc<Calls>) {
        let wire = Arc::new(WireLog::default());
        let calls = Arc::new(Calls::default());
        let context = Arc::new(SocketContext {
            forwarder,
            listener: calls.clone(),
            events: Arc::new(NoopEvents),
            protocol: ProtocolConfig::default(),
            ping_interval: None,
            runtime: tokio::runtime::Handle::current(),
        });
        let (socket, rx) = ConnectorSocket::new(SocketInfo::new("ws://router"), wire.clone(), context);
        (socket, rx, wire, calls)
    }

    fn idle_forwarder() -> Arc<dyn RequestForwarder> {
        Arc::new(forward_fn(|_req, _sink| async {
            std::future::pending::<()>().await;
            Ok(())
        }))
    }

    #[tokio::test]
    async fn open_grants_credit_and_acquires() {
        let (mut socket, _rx, wire, calls) = socket(idle_forwarder());
        socket.on_open();
        socket.on_open();
        assert_eq!(socket.state(), SocketState::Open);
        assert_eq!(wire.credit.load(Ordering::SeqCst), 1);
        assert_eq!(calls.acquired.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn violation_then_error_notifies_once() {
        let (mut socket, _rx, wire, calls) = socket(idle_forwarder());
        socket.on_open();
        socket.on_binary(Bytes::from_static(&[5, 0, 0, 0, 0, 1]), true);
        socket.on_error(TransportError::new(std::io::Error::new(
            std::io::ErrorKind::Other,
            "late",
        )));
        socket.on_close(close_code::PROTOCOL_ERROR, "");

        assert_eq!(wire.closes.lock().unwrap()[0].0, close_code::PROTOCOL_ERROR);
        let closed = calls.closed.lock().unwrap();
        assert_eq!(closed.len(), 1);
        assert_eq!(
            closed[0].as_deref(),
            Some("Unknown message type: 5, requestId=1")
        );
        assert_eq!(socket.state(), SocketState::Closed);
    }

    #[tokio::test]
    async fn local_close_notifies_on_echo() {
        let (mut socket, _rx, wire, calls) = socket(idle_forwarder());
        socket.on_open();
        socket.close(close_code::GOING_AWAY, "shutting down");
        assert_eq!(socket.state(), SocketState::Closing);
        assert!(calls.closed.lock().unwrap().is_empty());

        let before = wire.credit.load(Ordering::SeqCst);
        socket.on_text("ignored", true);
        assert_eq!(wire.credit.load(Ordering::SeqCst), before + 1);

        socket.on_close(close_code::GOING_AWAY, "");
        assert_eq!(*calls.closed.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn unexpected_end_is_an_error() {
        let (mut socket, _rx, _wire, calls) = socket(idle_forwarder());
        socket.on_open();
        socket.on_transport_finished();
        assert!(socket.close_error().is_some());
        assert_eq!(calls.closed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn header_frame_binds_request_and_completes() {
        let forwarder = Arc::new(forward_fn(|req: ForwardRequest, sink: ResponseSink| async move {
            assert_eq!(req.preamble.path(), "/hello");
            assert!(req.body.is_none());
            sink.send_head(200, "OK", &[], true)
        }));
        let (mut socket, mut rx, wire, _calls) = socket(forwarder);
        socket.on_open();
        socket.on_binary(
            BinaryFrame::encode(
                MessageType::Header,
                flags::END_HEADER | flags::END_STREAM,
                42,
                b"GET /hello HTTP/1.1\nHost:x\n",
            ),
            true,
        );
        assert_eq!(socket.in_flight_request(), Some(42));

        let completion = rx.recv().await.unwrap();
        assert!(completion.outcome.is_ok());
        socket.on_forward_complete(completion);
        assert_eq!(socket.in_flight_request(), None);

        let sent = wire.binaries.lock().unwrap();
        let head = BinaryFrame::decode(sent[0].clone()).unwrap();
        assert_eq!(head.request_id, 42);
        assert_eq!(&head.payload[..], b"HTTP/1.1 200 OK\n");
    }

    #[tokio::test]
    async fn failed_forward_resets_stream() {
        let forwarder = Arc::new(forward_fn(|_req, _sink| async {
            Err(ForwardError::InvalidRequest("nope".into()))
        }));
        let (mut socket, mut rx, wire, _calls) = socket(forwarder);
        socket.on_open();
        socket.on_text("GET / HTTP/1.1\n_2", true);

        let completion = rx.recv().await.unwrap();
        assert!(completion.outcome.is_err());
        socket.on_forward_complete(completion);

        let sent = wire.binaries.lock().unwrap();
        let rst = BinaryFrame::decode(sent[0].clone()).unwrap();
        assert_eq!(rst.message_type, MessageType::RstStream.code());
        assert_eq!(rst.request_id, 0);
    }

    #[tokio::test]
    async fn stale_data_is_dropped() {
        let (tx, mut seen) = mpsc::unbounded_channel::<Bytes>();
        let forwarder = Arc::new(forward_fn(move |req: ForwardRequest, _sink| {
            let tx = tx.clone();
            async move {
                if let Some(mut body) = req.body {
                    while let Some(chunk) = body.next().await {
                        let _ = tx.send(chunk);
                    }
                }
                std::future::pending::<()>().await;
                Ok(())
            }
        }));
        let (mut socket, _rx, _wire, _calls) = socket(forwarder);
        socket.on_open();
        socket.on_text("POST / HTTP/1.1\nContent-Length:4\n_1", true);
        socket.on_binary(BinaryFrame::encode(MessageType::Data, 0, 7, b"ab"), true);
        socket.on_binary(BinaryFrame::encode(MessageType::Data, 0, 8, b"xx"), true);
        socket.on_binary(BinaryFrame::encode(MessageType::Data, flags::END_STREAM, 7, b"cd"), true);

        assert_eq!(seen.recv().await.unwrap(), Bytes::from_static(b"ab"));
        assert_eq!(seen.recv().await.unwrap(), Bytes::from_static(b"cd"));
        assert_eq!(socket.in_flight_request(), Some(7));
    }
}

//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;

use tunnel_connector::backend::RequestForwarder;
use tunnel_connector::config::ProtocolConfig;
use tunnel_connector::net::Transport;
use tunnel_connector::protocol::{
    BinaryFrame, Completion, ConnectorError, ConnectorSocket, NoopEvents, SocketContext,
    SocketInfo, SocketListener,
};

/// One outbound operation observed on the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum Sent {
    Text(String),
    Binary(Bytes),
    Ping,
    Pong,
    Close(u16, String),
    Abort,
}

/// Transport that records every call.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Sent>>,
    credit: AtomicU64,
}

impl RecordingTransport {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().unwrap().clone()
    }

    /// Total credit requested so far.
    pub fn credit(&self) -> u64 {
        self.credit.load(Ordering::SeqCst)
    }

    pub fn pings(&self) -> usize {
        self.sent().iter().filter(|s| **s == Sent::Ping).count()
    }

    pub fn closes(&self) -> Vec<(u16, String)> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Close(code, reason) => Some((code, reason)),
                _ => None,
            })
            .collect()
    }

    /// Binary frames sent so far, decoded.
    pub fn frames(&self) -> Vec<BinaryFrame> {
        self.sent()
            .into_iter()
            .filter_map(|s| match s {
                Sent::Binary(data) => BinaryFrame::decode(data).ok(),
                _ => None,
            })
            .collect()
    }
}

impl Transport for RecordingTransport {
    fn send_text(&self, text: String) {
        self.sent.lock().unwrap().push(Sent::Text(text));
    }
    fn send_binary(&self, data: Bytes) {
        self.sent.lock().unwrap().push(Sent::Binary(data));
    }
    fn send_ping(&self, _payload: Bytes) {
        self.sent.lock().unwrap().push(Sent::Ping);
    }
    fn send_pong(&self, _payload: Bytes) {
        self.sent.lock().unwrap().push(Sent::Pong);
    }
    fn send_close(&self, code: u16, reason: &str) {
        self.sent
            .lock()
            .unwrap()
            .push(Sent::Close(code, reason.to_string()));
    }
    fn request(&self, n: u64) {
        self.credit.fetch_add(n, Ordering::SeqCst);
    }
    fn abort(&self) {
        self.sent.lock().unwrap().push(Sent::Abort);
    }
}

/// Listener that records every callback.
#[derive(Default)]
pub struct RecordingListener {
    acquired: AtomicU64,
    closes: Mutex<Vec<Option<ConnectorError>>>,
}

impl RecordingListener {
    pub fn acquired(&self) -> u64 {
        self.acquired.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> Vec<Option<ConnectorError>> {
        self.closes.lock().unwrap().clone()
    }
}

impl SocketListener for RecordingListener {
    fn on_connection_acquired(&self, _socket: &SocketInfo) {
        self.acquired.fetch_add(1, Ordering::SeqCst);
    }

    fn on_close(&self, _socket: &SocketInfo, error: Option<&ConnectorError>) {
        self.closes.lock().unwrap().push(error.cloned());
    }
}

/// A socket wired to recording collaborators.
pub struct Harness {
    pub socket: ConnectorSocket,
    pub completions: mpsc::UnboundedReceiver<Completion>,
    pub transport: Arc<RecordingTransport>,
    pub listener: Arc<RecordingListener>,
}

impl Harness {
    /// Must be called inside a Tokio runtime.
    pub fn new(forwarder: Arc<dyn RequestForwarder>) -> Self {
        Self::with_protocol(forwarder, ProtocolConfig::default())
    }

    pub fn with_protocol(forwarder: Arc<dyn RequestForwarder>, protocol: ProtocolConfig) -> Self {
        Self::build(forwarder, protocol, None)
    }

    /// Socket that sends keep-alive pings every `period` while open.
    pub fn with_keepalive(forwarder: Arc<dyn RequestForwarder>, period: Duration) -> Self {
        Self::build(forwarder, ProtocolConfig::default(), Some(period))
    }

    fn build(
        forwarder: Arc<dyn RequestForwarder>,
        protocol: ProtocolConfig,
        ping_interval: Option<Duration>,
    ) -> Self {
        let transport = Arc::new(RecordingTransport::default());
        let listener = Arc::new(RecordingListener::default());
        let context = Arc::new(SocketContext {
            forwarder,
            listener: listener.clone(),
            events: Arc::new(NoopEvents),
            protocol,
            ping_interval,
            runtime: tokio::runtime::Handle::current(),
        });
        let (socket, completions) =
            ConnectorSocket::new(SocketInfo::new("ws://router.test"), transport.clone(), context);
        Self {
            socket,
            completions,
            transport,
            listener,
        }
    }

    /// Wait for the in-flight forward to finish and feed the result back.
    pub async fn complete_next(&mut self) -> Result<(), String> {
        let completion: Completion =
            tokio::time::timeout(Duration::from_secs(5), self.completions.recv())
                .await
                .expect("forward did not complete in time")
                .expect("completion channel closed");
        let outcome = completion
            .outcome
            .as_ref()
            .map(|_| ())
            .map_err(|e| e.to_string());
        self.socket.on_forward_complete(completion);
        outcome
    }
}

/// Start a raw HTTP/1.1 backend that echoes method, path and body.
///
/// Response body: `{method} {path} {body}`. Requests must carry `Content-Length`
/// when they have a body.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((socket, _)) => {
                    tokio::spawn(serve_echo(socket));
                }
                Err(_) => break,
            }
        }
    });
    addr
}

async fn serve_echo(mut socket: TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_string();
    let mut lines = head.lines();
    let request_line = lines.next().unwrap_or_default().to_string();
    let content_length: usize = lines
        .filter_map(|l| l.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse().ok())
        .unwrap_or(0);

    let mut body = buf[head_end..].to_vec();
    while body.len() < content_length {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => body.extend_from_slice(&chunk[..n]),
        }
    }

    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();
    let echo = format!("{} {} {}", method, path, String::from_utf8_lossy(&body));

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nX-Echo: yes\r\nConnection: close\r\n\r\n{}",
        echo.len(),
        echo
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

//! WebSocket transport towards a router.
//!
//! # Data Flow
//! ```text
//! router ──► source.next() ──(one credit per message)──► ConnectorSocket::handle
//!                                                              │
//! router ◄── write_loop ◄── unbounded channel ◄── WebSocketTransport (Transport impl)
//! ```
//!
//! # Design Decisions
//! - Credit is a semaphore: the reader takes one permit per delivered message and
//!   `request(n)` adds permits. Without credit the reader stops polling the socket.
//! - Writes never block the engine; they are queued to a dedicated writer task.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use rustls::ClientConfig;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, Semaphore};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{Connector, MaybeTlsStream, WebSocketStream};
use url::Url;
use uuid::Uuid;

use crate::config::ComponentConfig;
use crate::net::transport::Transport;
use crate::protocol::close_code;
use crate::protocol::engine::{ConnectorSocket, ProtocolSocket, SocketContext, SocketState};
use crate::protocol::error::{ConnectorError, TransportError};
use crate::protocol::frame::Frame;
use crate::protocol::listener::SocketInfo;
use crate::protocol::message_type::ProtocolVersion;

/// A registered router connection.
pub type RouterStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Errors raised while registering with a router.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("Invalid router URL {0}")]
    InvalidUrl(String),

    #[error("Invalid registration header {name}: {value:?}")]
    InvalidHeader { name: &'static str, value: String },

    #[error("WebSocket handshake failed: {0}")]
    Handshake(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("Router did not answer within {0:?}")]
    Timeout(Duration),
}

pub type ConnectResult<T> = Result<T, ConnectError>;

/// What a connector announces when it registers.
#[derive(Debug, Clone)]
pub struct Registration {
    pub component: ComponentConfig,
    pub version: ProtocolVersion,
    pub instance_id: Uuid,
}

/// `{router}/register/?connectorInstanceID=..&componentName=..`
pub fn registration_url(router: &Url, registration: &Registration) -> ConnectResult<Url> {
    if router.cannot_be_a_base() {
        return Err(ConnectError::InvalidUrl(router.to_string()));
    }
    let mut url = router.clone();
    let path = format!("{}/register/", url.path().trim_end_matches('/'));
    url.set_path(&path);
    url.set_query(None);
    url.query_pairs_mut()
        .append_pair("connectorInstanceID", &registration.instance_id.to_string())
        .append_pair("componentName", &registration.component.name);
    Ok(url)
}

/// Open and register one socket with a router.
pub async fn connect(
    router: &Url,
    registration: &Registration,
    tls: &Arc<ClientConfig>,
    timeout: Duration,
) -> ConnectResult<RouterStream> {
    let url = registration_url(router, registration)?;
    let mut request = url.as_str().into_client_request()?;

    let headers = request.headers_mut();
    headers.insert(
        "Sec-WebSocket-Protocol",
        HeaderValue::from_static(registration.version.subprotocol()),
    );
    for (name, value) in [
        ("Route", &registration.component.route),
        ("Domain", &registration.component.domain),
    ] {
        let header = HeaderValue::from_str(value).map_err(|_| ConnectError::InvalidHeader {
            name,
            value: value.clone(),
        })?;
        headers.insert(name, header);
    }

    let connector = (url.scheme() == "wss").then(|| Connector::Rustls(tls.clone()));
    let handshake =
        tokio_tungstenite::connect_async_tls_with_config(request, None, true, connector);
    let (stream, response) = tokio::time::timeout(timeout, handshake)
        .await
        .map_err(|_| ConnectError::Timeout(timeout))??;

    tracing::debug!(router = %router, status = %response.status(), "Registered with router");
    Ok(stream)
}

enum Outbound {
    Message(Message),
    Close(u16, String),
    Finish,
    Abort,
}

/// `Transport` backed by a WebSocket writer task and a credit semaphore.
pub struct WebSocketTransport {
    outbound: mpsc::UnboundedSender<Outbound>,
    credit: Arc<Semaphore>,
}

impl WebSocketTransport {
    fn enqueue(&self, out: Outbound) {
        // The writer only goes away after the socket terminated; late writes are dropped.
        let _ = self.outbound.send(out);
    }
}

impl Transport for WebSocketTransport {
    fn send_text(&self, text: String) {
        self.enqueue(Outbound::Message(Message::Text(text.into())));
    }

    fn send_binary(&self, data: Bytes) {
        self.enqueue(Outbound::Message(Message::Binary(data)));
    }

    fn send_ping(&self, payload: Bytes) {
        self.enqueue(Outbound::Message(Message::Ping(payload)));
    }

    fn send_pong(&self, payload: Bytes) {
        self.enqueue(Outbound::Message(Message::Pong(payload)));
    }

    fn send_close(&self, code: u16, reason: &str) {
        self.enqueue(Outbound::Close(code, reason.to_string()));
    }

    fn request(&self, n: u64) {
        let n = usize::try_from(n).unwrap_or(usize::MAX).min(Semaphore::MAX_PERMITS);
        if self.credit.available_permits() < Semaphore::MAX_PERMITS - n {
            self.credit.add_permits(n);
        }
    }

    fn abort(&self) {
        self.enqueue(Outbound::Abort);
    }
}

async fn write_loop<S>(
    mut sink: SplitSink<WebSocketStream<S>, Message>,
    mut rx: mpsc::UnboundedReceiver<Outbound>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(out) = rx.recv().await {
        let message = match out {
            Outbound::Message(message) => message,
            Outbound::Close(code, reason) => Message::Close(Some(CloseFrame {
                code: CloseCode::from(code),
                reason: reason.into(),
            })),
            Outbound::Finish => break,
            Outbound::Abort => return,
        };
        if let Err(e) = sink.send(message).await {
            tracing::debug!(error = %e, "WebSocket write failed");
            return;
        }
    }
    let _ = sink.close().await;
}

fn into_frame(message: Message) -> Option<Frame> {
    match message {
        Message::Text(text) => Some(Frame::Text {
            content: text.as_str().to_string(),
            last: true,
        }),
        Message::Binary(data) => Some(Frame::Binary { data, last: true }),
        Message::Ping(payload) => Some(Frame::Ping(payload)),
        Message::Pong(payload) => Some(Frame::Pong(payload)),
        Message::Close(frame) => Some(match frame {
            Some(frame) => Frame::PeerClose {
                code: u16::from(frame.code),
                reason: frame.reason.as_str().to_string(),
            },
            None => Frame::PeerClose {
                code: close_code::NO_STATUS,
                reason: String::new(),
            },
        }),
        Message::Frame(_) => None,
    }
}

/// Drive one registered socket until it reaches `Closed`.
///
/// Returns the error that terminated the socket, `None` for a graceful close.
pub async fn run_socket<S>(
    stream: WebSocketStream<S>,
    info: SocketInfo,
    context: Arc<SocketContext>,
    mut shutdown: broadcast::Receiver<()>,
    close_timeout: Duration,
) -> Option<ConnectorError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (sink, mut source) = stream.split();
    let (outbound, rx) = mpsc::unbounded_channel();
    let credit = Arc::new(Semaphore::new(0));
    let transport = Arc::new(WebSocketTransport {
        outbound,
        credit: credit.clone(),
    });
    let writer = tokio::spawn(write_loop(sink, rx));

    let (mut socket, mut completions) = ConnectorSocket::new(info, transport.clone(), context);
    socket.on_open();

    let mut has_credit = false;
    let mut shutdown_seen = false;
    let mut close_deadline: Option<Instant> = None;

    while !socket.is_closed() {
        if close_deadline.is_none() && socket.state() >= SocketState::Closing {
            close_deadline = Some(Instant::now() + close_timeout);
        }

        tokio::select! {
            permit = credit.acquire(), if !has_credit => match permit {
                Ok(permit) => {
                    permit.forget();
                    has_credit = true;
                }
                Err(_) => socket.on_transport_finished(),
            },
            message = source.next(), if has_credit => {
                has_credit = false;
                match message {
                    Some(Ok(message)) => match into_frame(message) {
                        Some(frame) => socket.handle(frame),
                        None => has_credit = true,
                    },
                    Some(Err(e)) => socket.handle(Frame::TransportError(TransportError::new(e))),
                    None => socket.on_transport_finished(),
                }
            }
            Some(completion) = completions.recv() => socket.on_forward_complete(completion),
            _ = shutdown.recv(), if !shutdown_seen => {
                shutdown_seen = true;
                socket.close(close_code::GOING_AWAY, "connector shutting down");
            }
            _ = tokio::time::sleep_until(close_deadline.unwrap_or_else(Instant::now)), if close_deadline.is_some() => {
                tracing::debug!(connection_id = %socket.info().id, "Close handshake timed out");
                socket.on_transport_finished();
            }
        }
    }

    let error = socket.close_error().cloned();
    drop(socket);
    transport.enqueue(Outbound::Finish);
    if tokio::time::timeout(close_timeout, writer).await.is_err() {
        tracing::debug!("WebSocket writer did not finish in time");
    }
    error
}

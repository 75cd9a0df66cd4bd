//! Observers of socket lifecycle.

use std::sync::Arc;

use crate::net::connection::ConnectionId;
use crate::protocol::error::{BoxError, ConnectorError};
use crate::protocol::preamble::RequestPreamble;

/// Identity of a connector socket, handed to listeners.
#[derive(Debug, Clone)]
pub struct SocketInfo {
    pub id: ConnectionId,
    pub router: Arc<str>,
}

impl SocketInfo {
    pub fn new(router: impl Into<Arc<str>>) -> Self {
        Self {
            id: ConnectionId::new(),
            router: router.into(),
        }
    }
}

/// Required listener of a socket.
///
/// `on_connection_acquired` fires when the socket opens. `on_close` fires exactly once at
/// the terminal state, with `None` for a graceful close.
pub trait SocketListener: Send + Sync {
    fn on_connection_acquired(&self, socket: &SocketInfo);
    fn on_close(&self, socket: &SocketInfo, error: Option<&ConnectorError>);
}

/// Best-effort observer of request lifecycle. Errors are logged and otherwise ignored.
pub trait ProxyEventListener: Send + Sync {
    fn on_request_received(
        &self,
        _socket: &SocketInfo,
        _preamble: &RequestPreamble,
    ) -> Result<(), BoxError> {
        Ok(())
    }

    fn on_response_started(&self, _socket: &SocketInfo, _status: u16) -> Result<(), BoxError> {
        Ok(())
    }

    fn on_request_finished(
        &self,
        _socket: &SocketInfo,
        _outcome: &'static str,
    ) -> Result<(), BoxError> {
        Ok(())
    }
}

/// Observer that ignores every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEvents;

impl ProxyEventListener for NoopEvents {}

/// Log a failed observer callback without letting it escape.
pub(crate) fn observe(socket: &SocketInfo, event: &'static str, result: Result<(), BoxError>) {
    if let Err(e) = result {
        tracing::warn!(
            connection_id = %socket.id,
            event = event,
            error = %e,
            "Proxy event listener failed"
        );
    }
}

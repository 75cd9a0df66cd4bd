//! Terminal error types for a connector socket.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::protocol::close_code;

/// Boxed error used by pluggable collaborators (forwarders, observers).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// A failure reported by the transport.
///
/// The original error is kept behind an `Arc` so the exact value can be handed to the
/// listener, logged, and compared by identity without being wrapped.
#[derive(Clone)]
pub struct TransportError(Arc<dyn std::error::Error + Send + Sync + 'static>);

impl TransportError {
    /// Capture a transport failure.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(error))
    }

    /// Returns true if both values carry the very same reported failure.
    pub fn is_same(&self, other: &TransportError) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }
}

impl fmt::Debug for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

/// Errors that terminate a connector socket.
#[derive(Debug, Clone, Error)]
pub enum ConnectorError {
    /// A binary frame carried a type code outside the protocol version's table.
    #[error("Unknown message type: {message_type}, requestId={request_id}")]
    UnknownMessageType { message_type: u8, request_id: u32 },

    /// A binary frame was too short to hold the frame header.
    #[error("Truncated binary frame: {len} bytes")]
    TruncatedFrame { len: usize },

    /// The transport reported a failure.
    #[error(transparent)]
    Transport(TransportError),
}

impl ConnectorError {
    /// Close code sent to the router when this error terminates the socket.
    pub fn close_code(&self) -> u16 {
        match self {
            ConnectorError::UnknownMessageType { .. } | ConnectorError::TruncatedFrame { .. } => {
                close_code::PROTOCOL_ERROR
            }
            ConnectorError::Transport(_) => close_code::INTERNAL_ERROR,
        }
    }

    /// Close reason sent alongside [`close_code`](Self::close_code).
    pub fn close_reason(&self) -> String {
        match self {
            ConnectorError::Transport(_) => "Unexpected transport error".to_string(),
            other => truncate_reason(other.to_string()),
        }
    }

    /// True for errors raised because the router broke the framing rules.
    pub fn is_protocol_violation(&self) -> bool {
        self.close_code() == close_code::PROTOCOL_ERROR
    }

    /// The captured transport failure, if that is what ended the socket.
    pub fn transport_error(&self) -> Option<&TransportError> {
        match self {
            ConnectorError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<TransportError> for ConnectorError {
    fn from(error: TransportError) -> Self {
        ConnectorError::Transport(error)
    }
}

/// Close frame reasons are capped at 123 bytes by the WebSocket framing.
fn truncate_reason(mut reason: String) -> String {
    const MAX_REASON: usize = 123;
    if reason.len() > MAX_REASON {
        let mut end = MAX_REASON;
        while !reason.is_char_boundary(end) {
            end -= 1;
        }
        reason.truncate(end);
    }
    reason
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_type_message_names_type_and_request() {
        let err = ConnectorError::UnknownMessageType { message_type: 5, request_id: 1 };
        assert_eq!(err.to_string(), "Unknown message type: 5, requestId=1");
        assert_eq!(err.close_code(), 1002);
        assert!(err.close_reason().contains("Unknown message type"));
        assert!(err.is_protocol_violation());
    }

    #[test]
    fn transport_error_is_passed_through() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "Test error");
        let captured = TransportError::new(io);
        let err = ConnectorError::from(captured.clone());

        assert_eq!(err.to_string(), "Test error");
        assert_eq!(err.close_code(), 1011);
        assert!(err.transport_error().unwrap().is_same(&captured));
    }

    #[test]
    fn distinct_failures_are_not_the_same() {
        let a = TransportError::new(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        let b = TransportError::new(std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert!(!a.is_same(&b));
        assert!(a.is_same(&a.clone()));
    }

    #[test]
    fn long_reasons_are_truncated_on_char_boundary() {
        let reason = truncate_reason("é".repeat(100));
        assert!(reason.len() <= 123);
        assert!(reason.chars().all(|c| c == 'é'));
    }
}

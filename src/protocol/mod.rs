//! Tunnel protocol engine.
//!
//! # Responsibilities
//! - Decode binary frames and validate their message type against the protocol version
//! - Parse request preambles, collapsing malformed lengths to -1
//! - Route body chunks to the in-flight request by request id
//! - Enforce response flow control and transport credit
//! - Terminate each socket exactly once, whatever the trigger
//!
//! # Data Flow
//! ```text
//! Transport event ──► ConnectorSocket ──┬─► RequestPreamble::parse ──► RequestForwarder (spawned)
//!                                       ├─► body channel (Data frames)
//!                                       ├─► FlowWindow (WindowUpdate frames)
//!                                       └─► SocketListener::on_close (once)
//! ```

pub mod engine;
pub mod error;
pub mod flow;
pub mod frame;
pub mod listener;
pub mod message_type;
pub mod preamble;
pub mod stream;

pub use engine::{Completion, ConnectorSocket, ProtocolSocket, SocketContext, SocketState};
pub use error::{BoxError, ConnectorError, TransportError};
pub use frame::{BinaryFrame, Frame};
pub use listener::{NoopEvents, ProxyEventListener, SocketInfo, SocketListener};
pub use message_type::{flags, MessageType, ProtocolVersion};
pub use preamble::{BodyMarker, RequestPreamble};

/// WebSocket close codes used by the connector.
pub mod close_code {
    /// Normal closure.
    pub const NORMAL: u16 = 1000;
    /// Endpoint is going away (shutdown).
    pub const GOING_AWAY: u16 = 1001;
    /// Protocol error.
    pub const PROTOCOL_ERROR: u16 = 1002;
    /// No status code was present in the close frame.
    pub const NO_STATUS: u16 = 1005;
    /// Internal error.
    pub const INTERNAL_ERROR: u16 = 1011;
}

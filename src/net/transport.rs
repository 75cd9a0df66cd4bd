//! Outbound half of a duplex message transport.

use bytes::Bytes;

/// Operations a connector socket performs on its transport.
///
/// Every method is non-blocking. Inbound delivery is credit based: after each delivered
/// event the transport stops until `request` grants more units.
pub trait Transport: Send + Sync {
    fn send_text(&self, text: String);
    fn send_binary(&self, data: Bytes);
    fn send_ping(&self, payload: Bytes);
    fn send_pong(&self, payload: Bytes);
    /// Start a close handshake with the given code and reason.
    fn send_close(&self, code: u16, reason: &str);
    /// Grant `n` more inbound deliveries.
    fn request(&self, n: u64);
    /// Drop the connection without a handshake.
    fn abort(&self);
}

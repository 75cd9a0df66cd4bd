//! Transport events and the binary frame layout.
//!
//! ```text
//! ┌──────┬───────┬──────────────────┬─────────────┐
//! │ type │ flags │ request id (BE)  │ payload ... │
//! │  1B  │  1B   │       4B         │             │
//! └──────┴───────┴──────────────────┴─────────────┘
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::protocol::error::TransportError;
use crate::protocol::message_type::{flags, MessageType};

/// Size of the fixed binary frame header.
pub const HEADER_LEN: usize = 6;

/// One event delivered by the transport to a connector socket.
#[derive(Debug, Clone)]
pub enum Frame {
    Text { content: String, last: bool },
    Binary { data: Bytes, last: bool },
    Ping(Bytes),
    Pong(Bytes),
    TransportError(TransportError),
    PeerClose { code: u16, reason: String },
}

/// A decoded binary frame. The type byte is kept raw so the caller decides what is known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryFrame {
    pub message_type: u8,
    pub flags: u8,
    pub request_id: u32,
    pub payload: Bytes,
}

impl BinaryFrame {
    /// Split a complete binary message into header fields and payload.
    ///
    /// Returns the message length when it is shorter than [`HEADER_LEN`].
    pub fn decode(mut data: Bytes) -> Result<Self, usize> {
        if data.len() < HEADER_LEN {
            return Err(data.len());
        }
        let message_type = data.get_u8();
        let flags = data.get_u8();
        let request_id = data.get_u32();
        Ok(Self {
            message_type,
            flags,
            request_id,
            payload: data,
        })
    }

    /// Build a frame ready to be sent.
    pub fn encode(message_type: MessageType, flags: u8, request_id: u32, payload: &[u8]) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
        buf.put_u8(message_type.code());
        buf.put_u8(flags);
        buf.put_u32(request_id);
        buf.put_slice(payload);
        buf.freeze()
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags & flags::END_STREAM != 0
    }

    pub fn is_end_header(&self) -> bool {
        self.flags & flags::END_HEADER != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_header_fields() {
        let frame = BinaryFrame::decode(Bytes::from_static(&[5, 0, 0, 0, 0, 1])).unwrap();
        assert_eq!(frame.message_type, 5);
        assert_eq!(frame.flags, 0);
        assert_eq!(frame.request_id, 1);
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn request_id_is_big_endian() {
        let frame =
            BinaryFrame::decode(Bytes::from_static(&[0, 1, 0x12, 0x34, 0x56, 0x78, b'x'])).unwrap();
        assert_eq!(frame.request_id, 0x1234_5678);
        assert!(frame.is_end_stream());
        assert!(!frame.is_end_header());
        assert_eq!(&frame.payload[..], b"x");
    }

    #[test]
    fn short_message_reports_length() {
        assert_eq!(BinaryFrame::decode(Bytes::from_static(&[1, 2, 3])), Err(3));
    }

    #[test]
    fn encode_writes_layout() {
        let bytes = BinaryFrame::encode(MessageType::Header, flags::END_HEADER, 7, b"hi");
        assert_eq!(&bytes[..], &[1, 4, 0, 0, 0, 7, b'h', b'i']);
    }
}

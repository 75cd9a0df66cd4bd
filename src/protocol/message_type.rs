//! Binary message types and protocol versions.

use serde::{Deserialize, Serialize};

/// Flag bits carried in byte 1 of a binary frame.
pub mod flags {
    /// Last frame of this stream in this direction.
    pub const END_STREAM: u8 = 0x01;
    /// Last fragment of a header block.
    pub const END_HEADER: u8 = 0x04;
}

/// Binary message types known to the v3 protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Body chunk for a request or response.
    Data = 0,
    /// Header block (request preamble inbound, response head outbound).
    Header = 1,
    /// Stream cancellation.
    RstStream = 3,
    /// Acknowledges response bytes consumed by the router.
    WindowUpdate = 8,
}

const V3_TYPES: &[MessageType] = &[
    MessageType::Data,
    MessageType::Header,
    MessageType::RstStream,
    MessageType::WindowUpdate,
];

impl MessageType {
    /// Wire code of this type.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            MessageType::Data => "DATA",
            MessageType::Header => "HEADER",
            MessageType::RstStream => "RST_STREAM",
            MessageType::WindowUpdate => "WINDOW_UPDATE",
        }
    }
}

/// Protocol versions this connector can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
pub enum ProtocolVersion {
    #[default]
    #[serde(rename = "3.0")]
    V3,
}

impl ProtocolVersion {
    /// The closed set of binary message types recognised by this version.
    pub fn message_types(self) -> &'static [MessageType] {
        match self {
            ProtocolVersion::V3 => V3_TYPES,
        }
    }

    /// Resolve a wire code. `None` means the code is a protocol violation.
    pub fn lookup(self, code: u8) -> Option<MessageType> {
        self.message_types().iter().copied().find(|t| t.code() == code)
    }

    /// WebSocket subprotocol announced during registration.
    pub fn subprotocol(self) -> &'static str {
        match self {
            ProtocolVersion::V3 => "cranker_3.0",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn v3_table_is_closed() {
        let v3 = ProtocolVersion::V3;
        let known: Vec<u8> = (0..=255u8).filter(|c| v3.lookup(*c).is_some()).collect();
        assert_eq!(known, vec![0, 1, 3, 8]);
        assert_eq!(v3.lookup(5), None);
    }

    #[test]
    fn lookup_resolves_types() {
        assert_eq!(ProtocolVersion::V3.lookup(8), Some(MessageType::WindowUpdate));
        assert_eq!(MessageType::RstStream.as_str(), "RST_STREAM");
    }

    #[test]
    fn version_deserializes_from_string() {
        #[derive(Deserialize)]
        struct Holder {
            version: ProtocolVersion,
        }
        let holder: Holder = toml::from_str("version = \"3.0\"").unwrap();
        assert_eq!(holder.version, ProtocolVersion::V3);
        assert_eq!(holder.version.subprotocol(), "cranker_3.0");
    }
}

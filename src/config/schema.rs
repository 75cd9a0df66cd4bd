//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the connector.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

use crate::protocol::message_type::ProtocolVersion;

/// Root configuration for the connector.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ConnectorConfig {
    /// Router registration URLs (`ws://` or `wss://`).
    pub routers: Vec<String>,

    /// Backend origin requests are forwarded to (e.g. "http://localhost:8080").
    pub target: String,

    /// How this connector identifies itself to routers.
    pub component: ComponentConfig,

    /// Number of idle sockets kept registered with each router.
    pub sliding_window: usize,

    /// TLS settings for `wss://` routers.
    pub tls: TlsSettings,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Reconnect backoff.
    pub reconnect: ReconnectConfig,

    /// Wire protocol settings.
    pub protocol: ProtocolConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            routers: Vec::new(),
            target: "http://localhost:8080".to_string(),
            component: ComponentConfig::default(),
            sliding_window: 2,
            tls: TlsSettings::default(),
            timeouts: TimeoutConfig::default(),
            reconnect: ReconnectConfig::default(),
            protocol: ProtocolConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Identity announced during registration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ComponentConfig {
    /// Component name (`componentName` query parameter).
    pub name: String,

    /// Route prefix served by this connector (`Route` header). "*" catches all.
    pub route: String,

    /// Domain served by this connector (`Domain` header). "*" catches all.
    pub domain: String,
}

impl Default for ComponentConfig {
    fn default() -> Self {
        Self {
            name: "connector".to_string(),
            route: "*".to_string(),
            domain: "*".to_string(),
        }
    }
}

/// TLS trust settings for router connections.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TlsSettings {
    /// Disable certificate chain and hostname validation.
    pub trust_all_certificates: bool,
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Router handshake and backend connect timeout in seconds.
    pub connect_secs: u64,

    /// Keep-alive ping period in seconds. 0 disables pings.
    pub ping_interval_secs: u64,

    /// How long to wait for the router to answer a close, in seconds.
    pub close_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            ping_interval_secs: 5,
            close_secs: 5,
        }
    }
}

/// Reconnect backoff after a socket failed.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 500,
            max_delay_ms: 30_000,
        }
    }
}

/// Wire protocol settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Protocol version spoken with routers.
    pub version: ProtocolVersion,

    /// Unacknowledged response bytes allowed before the response pump waits.
    pub window_high_watermark: usize,

    /// Request body chunks buffered between the router and the backend.
    pub body_channel_capacity: usize,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            version: ProtocolVersion::V3,
            window_high_watermark: 64 * 1024,
            body_channel_capacity: 16,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

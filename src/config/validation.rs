//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check that router and target URLs parse and use supported schemes
//! - Validate value ranges (window > 0, intervals > 0, backoff bounds)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ConnectorConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use thiserror::Error;
use url::Url;

use crate::config::schema::ConnectorConfig;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Check a parsed configuration, collecting every error.
pub fn validate_config(config: &ConnectorConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.routers.is_empty() {
        errors.push(ValidationError::new("routers", "at least one router is required"));
    }
    for (i, router) in config.routers.iter().enumerate() {
        let field = format!("routers[{}]", i);
        match Url::parse(router) {
            Ok(url) if matches!(url.scheme(), "ws" | "wss") => {}
            Ok(url) => errors.push(ValidationError::new(
                field,
                format!("unsupported scheme {:?}, expected ws or wss", url.scheme()),
            )),
            Err(e) => errors.push(ValidationError::new(field, format!("invalid URL: {}", e))),
        }
    }

    match Url::parse(&config.target) {
        Ok(url) if url.scheme() == "http" => {}
        Ok(url) => errors.push(ValidationError::new(
            "target",
            format!("unsupported scheme {:?}, expected http", url.scheme()),
        )),
        Err(e) => errors.push(ValidationError::new("target", format!("invalid URL: {}", e))),
    }

    if config.component.name.trim().is_empty() {
        errors.push(ValidationError::new("component.name", "must not be empty"));
    }
    if config.sliding_window == 0 {
        errors.push(ValidationError::new("sliding_window", "must be greater than 0"));
    }
    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::new("timeouts.connect_secs", "must be greater than 0"));
    }
    if config.timeouts.close_secs == 0 {
        errors.push(ValidationError::new("timeouts.close_secs", "must be greater than 0"));
    }
    if config.reconnect.base_delay_ms == 0 {
        errors.push(ValidationError::new("reconnect.base_delay_ms", "must be greater than 0"));
    }
    if config.reconnect.base_delay_ms > config.reconnect.max_delay_ms {
        errors.push(ValidationError::new(
            "reconnect.max_delay_ms",
            "must not be lower than base_delay_ms",
        ));
    }
    if config.protocol.window_high_watermark == 0 {
        errors.push(ValidationError::new(
            "protocol.window_high_watermark",
            "must be greater than 0",
        ));
    }
    if config.protocol.body_channel_capacity == 0 {
        errors.push(ValidationError::new(
            "protocol.body_channel_capacity",
            "must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

//! Backend dispatch.
//!
//! # Responsibilities
//! - Define the seam between the protocol engine and the backend (`RequestForwarder`)
//! - Rebuild HTTP requests from preambles and stream bodies to the backend
//! - Write responses back to the router with flow control (`ResponseSink`)

pub mod client;
pub mod forwarder;
pub mod sink;

pub use client::HyperForwarder;
pub use forwarder::{
    forward_fn, ForwardError, ForwardFn, ForwardRequest, ForwardResult, RequestBody,
    RequestForwarder,
};
pub use sink::ResponseSink;

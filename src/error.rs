//! Error types for the VNC client library.

use std::io;
use thiserror::Error;

/// Result type for VNC operations.
pub type Result<T> = std::result::Result<T, RfbError>;

/// Errors that can occur in VNC client operations.
#[derive(Debug, Error)]
pub enum RfbError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A value does not fit the wire range of its field.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Received bytes do not match a required protocol constant.
    #[error("Invalid expected data: {0}")]
    InvalidExpectedData(String),

    /// A read was requested past the end of the inbound buffer.
    ///
    /// The dispatcher only invokes a handler once all awaited bytes are
    /// queued, so hitting this is a dispatcher misuse bug rather than a
    /// network condition.
    #[error("Invalid size: needed {needed} bytes, {available} available")]
    InvalidSize {
        /// Bytes the read required.
        needed: usize,
        /// Bytes actually remaining in the buffer.
        available: usize,
    },

    /// Composite field wiring does not match the declared wire type.
    #[error("Invalid type: {0}")]
    InvalidType(String),

    /// No mutually supported protocol version or security scheme.
    #[error("Negotiation failure: {0}")]
    Negotiation(String),

    /// The server reported a failure, with its reason string on RFB 3.8.
    #[error("Error reported from peer: {0}")]
    PeerError(String),

    /// A send was attempted after the transport closed.
    #[error("Transport disconnected")]
    Disconnected,

    /// An observer method was invoked before attachment to a controller.
    #[error("Observer is not registered to a controller")]
    Unregistered,
}

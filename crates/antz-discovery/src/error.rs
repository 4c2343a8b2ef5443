//! Error types for the discovery session.

use std::io;

use antz_protocol::ProtocolError;
use thiserror::Error;

/// A page could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Malformed message or page.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Page updates per-device state but the message carried no identity.
    #[error("page 0x{page:02X} needs a device identity")]
    MissingIdentity {
        /// Page number.
        page: u8,
    },
}

/// A driver call failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{operation} failed (driver error {code})")]
pub struct TransportError {
    /// Driver operation that failed.
    pub operation: &'static str,
    /// Last error code reported by the driver.
    pub code: i32,
}

impl TransportError {
    pub fn new(operation: &'static str, code: i32) -> Self {
        TransportError { operation, code }
    }
}

/// A decoded event could not be published.
#[derive(Error, Debug)]
pub enum PublishError {
    #[error("publish I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// A persisted channel record could not be parsed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelRecordError {
    #[error("expected {expected} fields, got {actual}")]
    FieldCount {
        /// Fields in a record.
        expected: usize,
        /// Fields found.
        actual: usize,
    },

    #[error("invalid {field}: {value:?}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Raw text.
        value: String,
    },
}

/// Errors surfaced by the session and the binary.
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("capture line {line}: {reason}")]
    Capture {
        /// 1-based line number.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    #[error("no usable home or config directory for the channel store")]
    NoStorePath,
}

/// Result type for session operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

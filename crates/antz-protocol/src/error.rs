//! Protocol error types.

use thiserror::Error;

/// Errors that can occur when decoding ANT+ messages and pages.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Message is too short to carry a channel byte and a full payload.
    #[error("message too short: expected at least {expected} bytes, got {actual}")]
    MessageTooShort {
        /// Expected minimum length.
        expected: usize,
        /// Actual length received.
        actual: usize,
    },

    /// Trailer is shorter than the flags byte says.
    #[error("extended trailer truncated: flags need {needed} bytes, {available} available")]
    TrailerTruncated {
        /// Bytes the flags call for.
        needed: usize,
        /// Bytes actually present.
        available: usize,
    },

    /// Trailer start computed from the end of the message runs into the payload.
    #[error("extended trailer of {trailer} bytes overlaps the payload of a {length} byte message")]
    TrailerOverlapsPayload {
        /// Trailer size, including the device number.
        trailer: usize,
        /// Message length.
        length: usize,
    },

    /// Page payload is shorter than its decoder needs.
    #[error("page 0x{page:02X} payload too short: expected {expected} bytes, got {actual}")]
    PayloadTooShort {
        /// Page number.
        page: u8,
        /// Expected length.
        expected: usize,
        /// Actual length.
        actual: usize,
    },
}

/// Convenience result alias.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

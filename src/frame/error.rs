//! Errors raised while splitting a byte stream into frames.
//!
//! Every variant is fatal for the connection that produced it: the stream is
//! not resynchronised after a malformed header.

use std::io;

use thiserror::Error;

/// Wire-level framing errors.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The kind byte did not name a known message kind.
    #[error("unknown message kind: {kind}")]
    UnknownKind {
        /// Raw kind byte read from the header.
        kind: u8,
    },

    /// The declared payload length exceeds the configured maximum.
    #[error("frame payload exceeds max length: {size} > {max}")]
    OversizedPayload {
        /// Payload length declared by the header or offered for sending.
        size: u64,
        /// Maximum payload length accepted.
        max: usize,
    },

    /// The stream ended before a complete header arrived.
    #[error("premature EOF: {bytes_received} of {header_size} header bytes received")]
    MidHeader {
        /// Header bytes received before EOF.
        bytes_received: usize,
        /// Size of a complete header.
        header_size: usize,
    },

    /// The stream ended between the header and the end of its payload.
    #[error("premature EOF: {bytes_received} bytes of {expected} byte payload received")]
    MidPayload {
        /// Payload bytes received before EOF.
        bytes_received: usize,
        /// Payload length declared by the header.
        expected: usize,
    },
}

impl From<FramingError> for io::Error {
    fn from(err: FramingError) -> Self {
        match err {
            FramingError::MidHeader { .. } | FramingError::MidPayload { .. } => {
                io::Error::new(io::ErrorKind::UnexpectedEof, err)
            }
            FramingError::UnknownKind { .. } | FramingError::OversizedPayload { .. } => {
                io::Error::new(io::ErrorKind::InvalidData, err)
            }
        }
    }
}

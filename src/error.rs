//! Errors surfaced to client callers and callbacks.
//!
//! `ClientError` is cloneable: a single connection failure is delivered to
//! every outstanding callback and to the error handler, so I/O causes are
//! shared behind an [`Arc`].

use std::{io, sync::Arc};

use crate::{connection::ConnectionState, frame::FramingError};

/// Errors reported by [`Client`](crate::Client) operations and callbacks.
#[derive(Clone, Debug, thiserror::Error)]
pub enum ClientError {
    /// The server address could not be determined or is invalid.
    #[error("failed to resolve server address: {reason}")]
    AddressResolution {
        /// Why resolution failed.
        reason: String,
    },
    /// The transport connect failed. Retried up to the configured bound.
    #[error("failed to connect to server: {0}")]
    ConnectFailure(#[source] Arc<io::Error>),
    /// The identification exchange failed. Treated as a connect failure.
    #[error("handshake failed: {reason}")]
    HandshakeFailure {
        /// Why the handshake was rejected.
        reason: String,
    },
    /// An established connection was lost.
    #[error("communication failure: {reason}")]
    CommunicationFailure {
        /// Description of the underlying fault.
        reason: String,
    },
    /// The inbound byte stream could not be split into frames.
    #[error("framing error: {0}")]
    Framing(#[from] FramingError),
    /// Every allowed connect attempt failed.
    #[error("connect failed after {attempts} attempts")]
    ExhaustedRetries {
        /// Number of failed attempts, the first one included.
        attempts: u32,
    },
    /// The operation was abandoned by `disconnect` or `finalize`.
    #[error("operation cancelled")]
    Cancelled,
    /// The operation is not valid in the connection's current state.
    #[error("cannot {operation} while {state}")]
    InvalidState {
        /// Operation that was refused.
        operation: &'static str,
        /// State the connection was in.
        state: ConnectionState,
    },
    /// The client was finalized and accepts no further work.
    #[error("client has been finalized")]
    Closed,
    /// Every reply tag is held by an outstanding request.
    #[error("no free reply tags")]
    TagsExhausted,
    /// A client setting taken from the environment could not be parsed.
    #[error("invalid configuration: {reason}")]
    InvalidConfiguration {
        /// Which setting was rejected and why.
        reason: String,
    },
    /// A blocking call was made from inside an async runtime.
    #[error("blocking call made from within an async runtime")]
    BlockingInRuntime,
}

impl ClientError {
    /// Whether this error may clear on a later connect attempt.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ConnectFailure(_) | Self::HandshakeFailure { .. })
    }

    pub(crate) fn connect(err: io::Error) -> Self { Self::ConnectFailure(Arc::new(err)) }

    pub(crate) fn handshake(reason: impl Into<String>) -> Self {
        Self::HandshakeFailure {
            reason: reason.into(),
        }
    }

    pub(crate) fn communication(reason: impl ToString) -> Self {
        Self::CommunicationFailure {
            reason: reason.to_string(),
        }
    }
}

impl From<io::Error> for ClientError {
    fn from(err: io::Error) -> Self { Self::communication(err) }
}

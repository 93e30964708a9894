//! Connection lifecycle states.

use std::{
    fmt,
    sync::atomic::{AtomicU8, Ordering},
};

/// Lifecycle state of the client connection.
///
/// ```text
/// Unconnected -> Resolving -> Connecting -> HandshakeSent -> Connected
///                                 ^              |              |
///                                 +-- (retry) ---+              v
///                                                        Failed / Closed
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ConnectionState {
    /// No connection has been attempted yet.
    Unconnected = 0,
    /// The server address is being resolved.
    Resolving = 1,
    /// A socket connect is in progress, or a retry is pending.
    Connecting = 2,
    /// The identification frame is being written or its acknowledgement is
    /// awaited.
    HandshakeSent = 3,
    /// The handshake completed; application frames flow.
    Connected = 4,
    /// The connection failed and was torn down.
    Failed = 5,
    /// The connection was closed on request.
    Closed = 6,
    /// Listening for a peer. Only meaningful for server-side endpoints.
    Accepting = 7,
}

impl ConnectionState {
    /// Whether `connect()` may start a new attempt from this state.
    #[must_use]
    pub const fn can_connect(self) -> bool {
        matches!(self, Self::Unconnected | Self::Failed | Self::Closed)
    }

    /// Whether a connection attempt is underway.
    #[must_use]
    pub const fn is_connecting(self) -> bool {
        matches!(self, Self::Resolving | Self::Connecting | Self::HandshakeSent)
    }

    /// Whether the socket is torn down and no attempt is running.
    #[must_use]
    pub const fn is_terminal(self) -> bool { matches!(self, Self::Failed | Self::Closed) }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Resolving,
            2 => Self::Connecting,
            3 => Self::HandshakeSent,
            4 => Self::Connected,
            5 => Self::Failed,
            6 => Self::Closed,
            7 => Self::Accepting,
            _ => Self::Unconnected,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unconnected => "unconnected",
            Self::Resolving => "resolving",
            Self::Connecting => "connecting",
            Self::HandshakeSent => "handshake-sent",
            Self::Connected => "connected",
            Self::Failed => "failed",
            Self::Closed => "closed",
            Self::Accepting => "accepting",
        };
        f.write_str(name)
    }
}

/// Atomic mirror of the reactor's state, readable from any handle.
#[derive(Debug)]
pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: ConnectionState) -> Self { Self(AtomicU8::new(state as u8)) }

    pub(crate) fn load(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Store `state`, returning the previous value.
    pub(crate) fn swap(&self, state: ConnectionState) -> ConnectionState {
        ConnectionState::from_u8(self.0.swap(state as u8, Ordering::AcqRel))
    }
}

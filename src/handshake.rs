//! Identification exchanged when a connection is established.
//!
//! The client writes an identification frame (kind 1, tag 0) as soon as the
//! socket connects and the server answers with its own. The payload is a
//! bincode-encoded [`Identification`] using big-endian fixed-width integers.

use bincode::{Decode, Encode, config, decode_from_slice, encode_to_vec, error::DecodeError};

use crate::{ClientError, frame::ProcessId};

/// Largest identification payload accepted from a server.
pub const MAX_IDENTIFICATION_LEN: usize = 1024;

/// Protocol version spoken by this crate.
pub const PROTOCOL_VERSION: Version = Version { major: 1, minor: 0 };

/// Protocol version carried in an identification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Version {
    /// Incompatible changes bump the major version.
    pub major: u16,
    /// Backwards-compatible additions bump the minor version.
    pub minor: u16,
}

/// Handshake payload sent by both ends.
#[derive(Clone, Debug, PartialEq, Eq, Encode, Decode)]
pub struct Identification {
    /// Protocol version of the sender.
    pub version: Version,
    /// Free-form name of the sending implementation.
    pub agent: String,
}

impl Default for Identification {
    fn default() -> Self {
        Self {
            version: PROTOCOL_VERSION,
            agent: concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")).to_owned(),
        }
    }
}

fn wire_config() -> impl config::Config {
    config::standard()
        .with_big_endian()
        .with_fixed_int_encoding()
        .with_limit::<MAX_IDENTIFICATION_LEN>()
}

impl Identification {
    /// Encode for the wire.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::HandshakeFailure`] if the identification does
    /// not fit in [`MAX_IDENTIFICATION_LEN`] bytes.
    pub fn encode(&self) -> Result<Vec<u8>, ClientError> {
        encode_to_vec(self, wire_config())
            .map_err(|err| ClientError::handshake(format!("failed to encode identification: {err}")))
    }

    /// Decode an identification, rejecting trailing bytes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::HandshakeFailure`] if `payload` is not exactly
    /// one encoded identification.
    pub fn decode(payload: &[u8]) -> Result<Self, ClientError> {
        let (ident, consumed): (Self, usize) = decode_from_slice(payload, wire_config())
            .map_err(|err: DecodeError| {
                ClientError::handshake(format!("undecodable identification: {err}"))
            })?;
        if consumed != payload.len() {
            return Err(ClientError::handshake(format!(
                "{} trailing bytes after identification",
                payload.len() - consumed
            )));
        }
        Ok(ident)
    }

    /// Check that a peer speaking `peer` can talk to us.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::HandshakeFailure`] when the major versions
    /// differ.
    pub fn accept(&self, peer: &Identification) -> Result<(), ClientError> {
        if self.version.major == peer.version.major {
            Ok(())
        } else {
            Err(ClientError::handshake(format!(
                "incompatible protocol version {}.{} (expected major {})",
                peer.version.major, peer.version.minor, self.version.major
            )))
        }
    }
}

/// Validate the server's acknowledgement frame.
///
/// `expected_server` is the identity named in the server address, when
/// known.
pub(crate) fn check_ack(
    local: &Identification,
    sender: ProcessId,
    expected_server: Option<ProcessId>,
    payload: &[u8],
) -> Result<Identification, ClientError> {
    if let Some(expected) = expected_server.filter(|expected| *expected != sender) {
        return Err(ClientError::handshake(format!(
            "acknowledgement from {sender}, expected server {expected}"
        )));
    }
    let peer = Identification::decode(payload)?;
    local.accept(&peer)?;
    Ok(peer)
}

//! Fixed-layout frame header.
//!
//! The header is always [`HEADER_LEN`] bytes in network byte order:
//!
//! ```text
//! 0       8      9        13              21
//! +-------+------+--------+---------------+
//! | id:u64| kind | tag:u32| length:u64    |
//! +-------+------+--------+---------------+
//! ```

use std::fmt;

use bytes::{Buf, BufMut};

use super::FramingError;
use crate::handshake::MAX_IDENTIFICATION_LEN;

/// Size of an encoded [`FrameHeader`] in bytes.
pub const HEADER_LEN: usize = 21;

/// Numeric identity of a message originator.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ProcessId(u64);

impl ProcessId {
    /// Wrap a raw identity.
    #[must_use]
    pub const fn new(id: u64) -> Self { Self(id) }

    /// Return the raw identity.
    #[must_use]
    pub const fn get(self) -> u64 { self.0 }
}

impl From<u64> for ProcessId {
    fn from(id: u64) -> Self { Self(id) }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Per-connection identifier correlating a request with its reply.
///
/// Tag `0` ([`Tag::NONE`]) marks a frame that expects no reply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tag(u32);

impl Tag {
    /// Tag carried by frames that expect no reply.
    pub const NONE: Tag = Tag(0);

    /// Wrap a raw tag value.
    #[must_use]
    pub const fn new(tag: u32) -> Self { Self(tag) }

    /// Return the raw tag value.
    #[must_use]
    pub const fn get(self) -> u32 { self.0 }

    /// Whether a frame carrying this tag expects a reply.
    #[must_use]
    pub const fn expects_reply(self) -> bool { self.0 != 0 }
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

/// Kind byte distinguishing the handshake from application traffic.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Identification exchanged once when the connection is established.
    Identification = 1,
    /// Opaque application payload.
    User = 2,
}

impl TryFrom<u8> for MessageKind {
    type Error = FramingError;

    fn try_from(kind: u8) -> Result<Self, Self::Error> {
        match kind {
            1 => Ok(Self::Identification),
            2 => Ok(Self::User),
            other => Err(FramingError::UnknownKind { kind: other }),
        }
    }
}

/// Header preceding every payload on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHeader {
    /// Identity of the sender.
    pub sender: ProcessId,
    /// Message kind.
    pub kind: MessageKind,
    /// Correlation tag, [`Tag::NONE`] when no reply is expected.
    pub tag: Tag,
    /// Number of payload bytes following the header.
    pub length: u64,
}

impl FrameHeader {
    /// Build a header describing `payload_len` bytes of payload.
    #[must_use]
    pub fn new(sender: ProcessId, kind: MessageKind, tag: Tag, payload_len: usize) -> Self {
        Self {
            sender,
            kind,
            tag,
            length: len_to_wire(payload_len),
        }
    }

    /// Append the encoded header to `dst`.
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u64(self.sender.get());
        dst.put_u8(self.kind as u8);
        dst.put_u32(self.tag.get());
        dst.put_u64(self.length);
    }

    /// Encode the header into a fixed-size array.
    #[must_use]
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut out = [0u8; HEADER_LEN];
        let mut dst = &mut out[..];
        self.encode(&mut dst);
        out
    }

    /// Decode a header from its wire representation.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::UnknownKind`] when the kind byte is not
    /// recognised.
    pub fn decode(bytes: &[u8; HEADER_LEN]) -> Result<Self, FramingError> {
        let mut src = &bytes[..];
        let sender = ProcessId::new(src.get_u64());
        let kind = MessageKind::try_from(src.get_u8())?;
        let tag = Tag::new(src.get_u32());
        let length = src.get_u64();
        Ok(Self {
            sender,
            kind,
            tag,
            length,
        })
    }

    /// Largest payload accepted for this header's kind.
    ///
    /// User frames are bounded by `max_payload`; identification frames by
    /// [`MAX_IDENTIFICATION_LEN`] whatever the user limit.
    #[must_use]
    pub fn payload_limit(&self, max_payload: usize) -> usize {
        match self.kind {
            MessageKind::Identification => MAX_IDENTIFICATION_LEN,
            MessageKind::User => max_payload,
        }
    }

    /// Validate the declared payload length against the limit for this
    /// kind and return it as a `usize`.
    ///
    /// # Errors
    ///
    /// Returns [`FramingError::OversizedPayload`] when the declared length is
    /// larger than [`FrameHeader::payload_limit`].
    pub fn payload_len(&self, max_payload: usize) -> Result<usize, FramingError> {
        let max = self.payload_limit(max_payload);
        usize::try_from(self.length)
            .ok()
            .filter(|len| *len <= max)
            .ok_or(FramingError::OversizedPayload {
                size: self.length,
                max,
            })
    }
}

pub(crate) fn len_to_wire(len: usize) -> u64 { u64::try_from(len).unwrap_or(u64::MAX) }

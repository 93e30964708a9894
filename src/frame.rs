//! Wire framing for the management protocol.
//!
//! Every message is a fixed [`FrameHeader`] followed by exactly
//! `header.length` payload bytes. [`FrameReader`] assembles frames from
//! arbitrary read chunks and [`OutboundFrame`] tracks how much of a frame a
//! non-blocking socket has accepted. [`FrameCodec`] exposes the same format
//! through `tokio_util`'s codec traits.

use bytes::{BufMut, Bytes, BytesMut};

mod codec;
mod error;
mod header;
mod reader;
mod writer;

pub use codec::FrameCodec;
pub use error::FramingError;
pub use header::{FrameHeader, HEADER_LEN, MessageKind, ProcessId, Tag};
pub use reader::{FrameReader, ReadState};
pub use writer::{OutboundFrame, WriteState};

/// Default upper bound on a single frame payload (16 MiB).
pub const DEFAULT_MAX_PAYLOAD: usize = 16 * 1024 * 1024;

/// A decoded frame: header plus a payload of exactly `header.length` bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    header: FrameHeader,
    payload: Bytes,
}

impl Frame {
    /// Assemble a frame from a header and payload.
    ///
    /// The header length is recomputed from `payload`, so the pair can never
    /// disagree.
    #[must_use]
    pub fn from_parts(header: FrameHeader, payload: Bytes) -> Self {
        let header = FrameHeader::new(header.sender, header.kind, header.tag, payload.len());
        Self { header, payload }
    }

    /// Build an application frame.
    #[must_use]
    pub fn user(sender: ProcessId, tag: Tag, payload: impl Into<Bytes>) -> Self {
        Self::with_kind(sender, MessageKind::User, tag, payload.into())
    }

    /// Build an identification frame; these always carry [`Tag::NONE`].
    #[must_use]
    pub fn identification(sender: ProcessId, payload: impl Into<Bytes>) -> Self {
        Self::with_kind(sender, MessageKind::Identification, Tag::NONE, payload.into())
    }

    fn with_kind(sender: ProcessId, kind: MessageKind, tag: Tag, payload: Bytes) -> Self {
        Self {
            header: FrameHeader::new(sender, kind, tag, payload.len()),
            payload,
        }
    }

    #[must_use]
    pub fn header(&self) -> &FrameHeader { &self.header }

    #[must_use]
    pub fn sender(&self) -> ProcessId { self.header.sender }

    #[must_use]
    pub fn kind(&self) -> MessageKind { self.header.kind }

    #[must_use]
    pub fn tag(&self) -> Tag { self.header.tag }

    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    /// Split the frame into its header and payload.
    #[must_use]
    pub fn into_parts(self) -> (FrameHeader, Bytes) { (self.header, self.payload) }

    /// Encode header and payload into one contiguous buffer.
    #[must_use]
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(HEADER_LEN + self.payload.len());
        self.header.encode(&mut buf);
        buf.put_slice(&self.payload);
        buf.freeze()
    }
}

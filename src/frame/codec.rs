//! `tokio_util` codec over the same wire format.
//!
//! The connection reactor drives [`FrameReader`](super::FrameReader) and
//! [`OutboundFrame`](super::OutboundFrame) directly against socket
//! readiness; this codec serves peers that prefer
//! [`Framed`](tokio_util::codec::Framed), such as servers and test doubles.

use std::io;

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use super::{DEFAULT_MAX_PAYLOAD, Frame, FrameHeader, FramingError, HEADER_LEN};

/// Length-prefixed frame codec.
///
/// # Examples
///
/// ```
/// use bytes::BytesMut;
/// use pmix_link::frame::{Frame, FrameCodec, ProcessId, Tag};
/// use tokio_util::codec::{Decoder, Encoder};
///
/// let mut codec = FrameCodec::default();
/// let mut buf = BytesMut::new();
/// codec
///     .encode(Frame::user(ProcessId::new(3), Tag::new(1), "ping"), &mut buf)
///     .expect("encode frame");
/// let frame = codec
///     .decode(&mut buf)
///     .expect("decode frame")
///     .expect("complete frame");
/// assert_eq!(frame.payload().as_ref(), b"ping");
/// ```
#[derive(Clone, Copy, Debug)]
pub struct FrameCodec {
    max_payload: usize,
}

impl FrameCodec {
    /// Create a codec rejecting payloads longer than `max_payload`.
    #[must_use]
    pub const fn new(max_payload: usize) -> Self { Self { max_payload } }

    /// Maximum payload length accepted by this codec.
    #[must_use]
    pub const fn max_payload(&self) -> usize { self.max_payload }
}

impl Default for FrameCodec {
    fn default() -> Self { Self::new(DEFAULT_MAX_PAYLOAD) }
}

fn peek_header(src: &BytesMut) -> Option<[u8; HEADER_LEN]> {
    src.get(..HEADER_LEN)
        .and_then(|slice| <[u8; HEADER_LEN]>::try_from(slice).ok())
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let Some(raw) = peek_header(src) else {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        };
        let header = FrameHeader::decode(&raw)?;
        let len = header.payload_len(self.max_payload)?;
        let total = HEADER_LEN + len;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(None);
        }
        src.advance(HEADER_LEN);
        let payload = src.split_to(len).freeze();
        Ok(Some(Frame::from_parts(header, payload)))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        let err = match peek_header(src) {
            Some(raw) => {
                let expected = FrameHeader::decode(&raw)?.payload_len(self.max_payload)?;
                FramingError::MidPayload {
                    bytes_received: src.len() - HEADER_LEN,
                    expected,
                }
            }
            None => FramingError::MidHeader {
                bytes_received: src.len(),
                header_size: HEADER_LEN,
            },
        };
        tracing::debug!(error = %err, "stream closed inside a frame");
        Err(err.into())
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = io::Error;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let payload = item.payload();
        item.header().payload_len(self.max_payload)?;
        dst.reserve(HEADER_LEN + payload.len());
        item.header().encode(dst);
        dst.extend_from_slice(payload);
        Ok(())
    }
}

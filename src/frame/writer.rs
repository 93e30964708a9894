//! Outbound frame with a write cursor for partial socket writes.

use std::io;

use bytes::Bytes;

use super::{Frame, FrameHeader, HEADER_LEN, Tag};

/// Progress of a frame being written.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteState {
    /// Header bytes written so far.
    Header(usize),
    /// Payload bytes written so far; the header has been written.
    Payload(usize),
    /// Header and payload have both been written.
    Complete,
}

/// A frame owned by the send side together with its unsent remainder.
///
/// The header is always written in full before the first payload byte.
#[derive(Debug)]
pub struct OutboundFrame {
    header: [u8; HEADER_LEN],
    tag: Tag,
    payload: Bytes,
    state: WriteState,
}

impl OutboundFrame {
    /// Prepare `frame` for writing.
    #[must_use]
    pub fn new(frame: Frame) -> Self {
        let (header, payload) = frame.into_parts();
        Self::from_parts(&header, payload)
    }

    pub(crate) fn from_parts(header: &FrameHeader, payload: Bytes) -> Self {
        Self {
            header: header.to_bytes(),
            tag: header.tag,
            payload,
            state: WriteState::Header(0),
        }
    }

    /// Tag carried by this frame.
    #[must_use]
    pub fn tag(&self) -> Tag { self.tag }

    /// Current write progress.
    #[must_use]
    pub fn state(&self) -> WriteState { self.state }

    /// Whether every byte of the frame has been written.
    #[must_use]
    pub fn is_complete(&self) -> bool { self.state == WriteState::Complete }

    /// Unsent bytes of the current section (header or payload).
    #[must_use]
    pub fn remaining(&self) -> &[u8] {
        match self.state {
            WriteState::Header(sent) => &self.header[sent..],
            WriteState::Payload(sent) => &self.payload[sent..],
            WriteState::Complete => &[],
        }
    }

    /// Record that `written` bytes of [`remaining`](Self::remaining) were
    /// accepted by the transport.
    pub fn advance(&mut self, written: usize) {
        let written = written.min(self.remaining().len());
        self.state = match self.state {
            WriteState::Header(sent) if sent + written < HEADER_LEN => {
                WriteState::Header(sent + written)
            }
            WriteState::Header(_) if self.payload.is_empty() => WriteState::Complete,
            WriteState::Header(_) => WriteState::Payload(0),
            WriteState::Payload(sent) if sent + written < self.payload.len() => {
                WriteState::Payload(sent + written)
            }
            WriteState::Payload(_) | WriteState::Complete => WriteState::Complete,
        };
    }

    /// Hand unsent bytes to `write` until the frame completes or the
    /// transport would block.
    ///
    /// Returns `Ok(true)` once the frame is complete and `Ok(false)` when
    /// `write` reported [`io::ErrorKind::WouldBlock`].
    ///
    /// # Errors
    ///
    /// Propagates any other error from `write`; a zero-length write is
    /// reported as [`io::ErrorKind::WriteZero`].
    pub fn write_with<F>(&mut self, mut write: F) -> io::Result<bool>
    where
        F: FnMut(&[u8]) -> io::Result<usize>,
    {
        while !self.is_complete() {
            match write(self.remaining()) {
                Ok(0) => return Err(io::ErrorKind::WriteZero.into()),
                Ok(written) => self.advance(written),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(false),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
        Ok(true)
    }
}

//! Incremental frame decoding for partial socket reads.

use bytes::{Bytes, BytesMut};

use super::{Frame, FrameHeader, FramingError, HEADER_LEN};

/// Progress of the frame currently being read.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadState {
    /// Header bytes received so far.
    AwaitingHeader(usize),
    /// Payload bytes received so far; the header is complete.
    AwaitingPayload(usize),
    /// Header and the declared payload have both been received.
    Complete,
}

/// Re-entrant reader assembling one frame at a time from arbitrary chunks.
///
/// Feeding the same byte stream as one chunk or split at any boundaries
/// yields identical frames.
///
/// # Examples
///
/// ```
/// use pmix_link::frame::{Frame, FrameReader, ProcessId, Tag};
///
/// let wire = Frame::user(ProcessId::new(1), Tag::new(7), "v=1").to_bytes();
/// let mut reader = FrameReader::new(1024);
/// let (head, tail) = wire.split_at(4);
///
/// let mut chunk = head;
/// assert!(reader.next_frame(&mut chunk).expect("valid header").is_none());
/// let mut chunk = tail;
/// let frame = reader
///     .next_frame(&mut chunk)
///     .expect("valid frame")
///     .expect("frame complete");
/// assert_eq!(frame.payload().as_ref(), b"v=1");
/// ```
#[derive(Debug)]
pub struct FrameReader {
    state: ReadState,
    header_buf: [u8; HEADER_LEN],
    header: Option<FrameHeader>,
    expected: usize,
    payload: BytesMut,
    max_payload: usize,
}

impl FrameReader {
    /// Create a reader rejecting payloads longer than `max_payload`.
    #[must_use]
    pub fn new(max_payload: usize) -> Self {
        Self {
            state: ReadState::AwaitingHeader(0),
            header_buf: [0; HEADER_LEN],
            header: None,
            expected: 0,
            payload: BytesMut::new(),
            max_payload,
        }
    }

    /// Current read progress.
    #[must_use]
    pub fn state(&self) -> ReadState { self.state }

    /// Whether a complete frame is waiting to be taken.
    #[must_use]
    pub fn is_complete(&self) -> bool { self.state == ReadState::Complete }

    /// Whether no byte of the next frame has been received yet.
    #[must_use]
    pub fn is_idle(&self) -> bool { self.state == ReadState::AwaitingHeader(0) }

    /// Consume bytes from `chunk` until the current frame is complete or the
    /// chunk is exhausted, returning the number of bytes consumed.
    ///
    /// Bytes beyond the end of the current frame are left untouched.
    ///
    /// # Errors
    ///
    /// Returns a [`FramingError`] if the header names an unknown kind or
    /// declares a payload longer than the configured maximum.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<usize, FramingError> {
        let mut rest = chunk;
        loop {
            match self.state {
                ReadState::AwaitingHeader(have) => {
                    let take = (HEADER_LEN - have).min(rest.len());
                    self.header_buf[have..have + take].copy_from_slice(&rest[..take]);
                    rest = &rest[take..];
                    let have = have + take;
                    if have < HEADER_LEN {
                        self.state = ReadState::AwaitingHeader(have);
                        break;
                    }
                    self.start_payload()?;
                }
                ReadState::AwaitingPayload(have) => {
                    let take = (self.expected - have).min(rest.len());
                    self.payload.extend_from_slice(&rest[..take]);
                    rest = &rest[take..];
                    let have = have + take;
                    if have < self.expected {
                        self.state = ReadState::AwaitingPayload(have);
                        break;
                    }
                    self.state = ReadState::Complete;
                }
                ReadState::Complete => break,
            }
        }
        Ok(chunk.len() - rest.len())
    }

    /// Feed bytes from the front of `chunk`, advancing it past the consumed
    /// bytes, and return the frame if it completed.
    ///
    /// # Errors
    ///
    /// Propagates [`FramingError`] from [`FrameReader::feed`].
    pub fn next_frame(&mut self, chunk: &mut &[u8]) -> Result<Option<Frame>, FramingError> {
        let bytes = *chunk;
        let consumed = self.feed(bytes)?;
        *chunk = &bytes[consumed..];
        Ok(self.take_frame())
    }

    /// Take the completed frame, resetting the reader for the next one.
    ///
    /// Returns `None` while the frame is still incomplete.
    pub fn take_frame(&mut self) -> Option<Frame> {
        if !self.is_complete() {
            return None;
        }
        let header = self.header.take()?;
        let payload: Bytes = self.payload.split().freeze();
        self.reset();
        Some(Frame::from_parts(header, payload))
    }

    /// Discard any partially read frame.
    pub fn reset(&mut self) {
        self.state = ReadState::AwaitingHeader(0);
        self.header = None;
        self.expected = 0;
        self.payload.clear();
    }

    /// Bytes received for the current frame, header included.
    #[must_use]
    pub fn bytes_received(&self) -> usize {
        match self.state {
            ReadState::AwaitingHeader(have) => have,
            ReadState::AwaitingPayload(have) => HEADER_LEN + have,
            ReadState::Complete => HEADER_LEN + self.expected,
        }
    }

    fn start_payload(&mut self) -> Result<(), FramingError> {
        let header = FrameHeader::decode(&self.header_buf)?;
        let expected = header.payload_len(self.max_payload)?;
        self.payload.reserve(expected);
        self.expected = expected;
        self.header = Some(header);
        self.state = if expected == 0 {
            ReadState::Complete
        } else {
            ReadState::AwaitingPayload(0)
        };
        Ok(())
    }
}

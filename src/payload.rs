//! Command payload helpers.
//!
//! A payload starts with a one-byte [`CommandTag`] followed by fields the
//! server interprets. The connection layer never looks inside; these helpers
//! exist so callers can build and parse payloads without hand-rolled byte
//! arithmetic. Integers are big-endian and byte strings carry a `u32` length
//! prefix.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Command understood by the management server.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandTag {
    Abort = 0,
    Fence = 1,
    FenceNb = 2,
    Put = 3,
    Get = 4,
    GetNb = 5,
    Finalize = 6,
    GetAttr = 7,
    Publish = 8,
    Lookup = 9,
    Unpublish = 10,
    Spawn = 11,
}

impl TryFrom<u8> for CommandTag {
    type Error = PayloadError;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        Ok(match byte {
            0 => Self::Abort,
            1 => Self::Fence,
            2 => Self::FenceNb,
            3 => Self::Put,
            4 => Self::Get,
            5 => Self::GetNb,
            6 => Self::Finalize,
            7 => Self::GetAttr,
            8 => Self::Publish,
            9 => Self::Lookup,
            10 => Self::Unpublish,
            11 => Self::Spawn,
            other => return Err(PayloadError::UnknownCommand { byte: other }),
        })
    }
}

/// Errors raised while extracting payload fields.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("unknown command byte {byte}")]
    UnknownCommand { byte: u8 },
    #[error("payload truncated: needed {needed} bytes, {available} available")]
    Truncated { needed: usize, available: usize },
    #[error("string field is not valid UTF-8")]
    InvalidUtf8,
    #[error("field of {len} bytes exceeds the u32 length prefix")]
    FieldTooLong { len: usize },
}

/// Growable command payload.
///
/// # Examples
///
/// ```
/// use pmix_link::payload::{CommandTag, Payload, PayloadReader};
///
/// let mut payload = Payload::new(CommandTag::Get);
/// payload.append_str("k").expect("short key");
/// let bytes = payload.freeze();
///
/// let mut reader = PayloadReader::new(bytes).expect("command byte");
/// assert_eq!(reader.command(), CommandTag::Get);
/// assert_eq!(reader.extract_str().expect("key"), "k");
/// ```
#[derive(Clone, Debug)]
pub struct Payload {
    buf: BytesMut,
}

impl Payload {
    /// Start a payload for `command`.
    #[must_use]
    pub fn new(command: CommandTag) -> Self {
        let mut buf = BytesMut::with_capacity(64);
        buf.put_u8(command as u8);
        Self { buf }
    }

    /// Append a big-endian `u32`.
    pub fn append_u32(&mut self, value: u32) -> &mut Self {
        self.buf.put_u32(value);
        self
    }

    /// Append a big-endian `u64`.
    pub fn append_u64(&mut self, value: u64) -> &mut Self {
        self.buf.put_u64(value);
        self
    }

    /// Append a length-prefixed byte string.
    ///
    /// # Errors
    ///
    /// Returns [`PayloadError::FieldTooLong`] if `data` is longer than
    /// `u32::MAX` bytes.
    pub fn append_bytes(&mut self, data: &[u8]) -> Result<&mut Self, PayloadError> {
        let len = u32::try_from(data.len())
            .map_err(|_| PayloadError::FieldTooLong { len: data.len() })?;
        self.buf.put_u32(len);
        self.buf.put_slice(data);
        Ok(self)
    }

    /// Append a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// As for [`append_bytes`](Self::append_bytes).
    pub fn append_str(&mut self, value: &str) -> Result<&mut Self, PayloadError> {
        self.append_bytes(value.as_bytes())
    }

    /// Append raw bytes without a length prefix, such as a staged blob.
    pub fn append_raw(&mut self, data: &[u8]) -> &mut Self {
        self.buf.put_slice(data);
        self
    }

    /// Encoded length, command byte included.
    #[must_use]
    pub fn len(&self) -> usize { self.buf.len() }

    /// Always `false`: a payload holds at least its command byte.
    #[must_use]
    pub fn is_empty(&self) -> bool { self.buf.is_empty() }

    /// Finish the payload.
    #[must_use]
    pub fn freeze(self) -> Bytes { self.buf.freeze() }
}

impl From<Payload> for Bytes {
    fn from(payload: Payload) -> Self { payload.freeze() }
}

/// Sequential field reader over a received payload.
#[derive(Clone, Debug)]
pub struct PayloadReader {
    command: CommandTag,
    rest: Bytes,
}

impl PayloadReader {
    /// Read the command byte from the front of `payload`.
    ///
    /// # Errors
    ///
    /// Fails if `payload` is empty or starts with an unknown command byte.
    pub fn new(payload: impl Into<Bytes>) -> Result<Self, PayloadError> {
        let mut rest = payload.into();
        ensure(&rest, 1)?;
        let command = CommandTag::try_from(rest.get_u8())?;
        Ok(Self { command, rest })
    }

    #[must_use]
    pub fn command(&self) -> CommandTag { self.command }

    /// Bytes not yet extracted.
    #[must_use]
    pub fn remaining(&self) -> &[u8] { &self.rest }

    /// # Errors
    ///
    /// Fails if fewer than four bytes remain.
    pub fn extract_u32(&mut self) -> Result<u32, PayloadError> {
        ensure(&self.rest, 4)?;
        Ok(self.rest.get_u32())
    }

    /// # Errors
    ///
    /// Fails if fewer than eight bytes remain.
    pub fn extract_u64(&mut self) -> Result<u64, PayloadError> {
        ensure(&self.rest, 8)?;
        Ok(self.rest.get_u64())
    }

    /// Extract a length-prefixed byte string.
    ///
    /// # Errors
    ///
    /// Fails if the prefix or the bytes it announces are missing.
    pub fn extract_bytes(&mut self) -> Result<Bytes, PayloadError> {
        let len = usize::try_from(self.extract_u32()?).unwrap_or(usize::MAX);
        ensure(&self.rest, len)?;
        Ok(self.rest.split_to(len))
    }

    /// Extract a length-prefixed UTF-8 string.
    ///
    /// # Errors
    ///
    /// Fails like [`extract_bytes`](Self::extract_bytes), or if the bytes
    /// are not UTF-8.
    pub fn extract_str(&mut self) -> Result<String, PayloadError> {
        let bytes = self.extract_bytes()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| PayloadError::InvalidUtf8)
    }
}

fn ensure(buf: &Bytes, needed: usize) -> Result<(), PayloadError> {
    if buf.len() < needed {
        return Err(PayloadError::Truncated {
            needed,
            available: buf.len(),
        });
    }
    Ok(())
}

//! Outbound request description.

use std::fmt;

use bytes::Bytes;

use crate::{
    ClientError,
    hooks::{ReplyCallback, SendCallback},
};

/// A payload to send, with optional completion callbacks.
///
/// A request with a reply callback is sent under a fresh tag and the
/// callback receives the server's reply. Without one it is sent under
/// [`Tag::NONE`](crate::frame::Tag::NONE).
///
/// # Examples
///
/// ```
/// use pmix_link::Request;
///
/// let request = Request::new("GET k")
///     .on_sent(|res| println!("sent: {}", res.is_ok()))
///     .on_reply(|reply| {
///         if let Ok(payload) = reply {
///             println!("{} byte reply", payload.len());
///         }
///     });
/// assert!(request.expects_reply());
/// ```
#[must_use]
pub struct Request {
    payload: Bytes,
    on_sent: Option<SendCallback>,
    on_reply: Option<ReplyCallback>,
}

impl Request {
    pub fn new(payload: impl Into<Bytes>) -> Self {
        Self {
            payload: payload.into(),
            on_sent: None,
            on_reply: None,
        }
    }

    /// Invoke `f` once the frame has been fully written, or with the error
    /// that prevented it.
    pub fn on_sent<F>(mut self, f: F) -> Self
    where
        F: FnOnce(Result<(), ClientError>) + Send + 'static,
    {
        self.on_sent = Some(Box::new(f));
        self
    }

    /// Expect a reply and invoke `f` with it.
    ///
    /// The payload slice is only valid for the duration of the call.
    pub fn on_reply<F>(mut self, f: F) -> Self
    where
        F: for<'a> FnOnce(Result<&'a [u8], ClientError>) + Send + 'static,
    {
        self.on_reply = Some(Box::new(f));
        self
    }

    #[must_use]
    pub fn expects_reply(&self) -> bool { self.on_reply.is_some() }

    #[must_use]
    pub fn payload(&self) -> &Bytes { &self.payload }

    pub(crate) fn into_parts(self) -> (Bytes, Option<SendCallback>, Option<ReplyCallback>) {
        (self.payload, self.on_sent, self.on_reply)
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("len", &self.payload.len())
            .field("on_sent", &self.on_sent.is_some())
            .field("on_reply", &self.on_reply.is_some())
            .finish()
    }
}

//! Callback types invoked by the connection reactor.
//!
//! All callbacks run on the reactor task, one at a time and never nested.
//! Reply and inbound callbacks borrow the payload for the duration of the
//! call only; copy it out if it must outlive the callback.

use std::sync::Arc;

use crate::{ClientError, frame::Tag};

/// One-shot callback receiving the reply to a tagged request.
///
/// Invoked exactly once: with the reply payload, or with the error that
/// drained the request.
pub type ReplyCallback = Box<dyn for<'a> FnOnce(Result<&'a [u8], ClientError>) + Send>;

/// One-shot callback fired when a frame has been fully written, or with the
/// error that drained it first.
pub type SendCallback = Box<dyn FnOnce(Result<(), ClientError>) + Send>;

/// Handler for user frames whose tag matches no outstanding request.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use pmix_link::hooks::InboundHandler;
///
/// let handler: InboundHandler = Arc::new(|tag, payload| {
///     println!("notification {tag}: {} bytes", payload.len());
/// });
/// ```
pub type InboundHandler = Arc<dyn Fn(Tag, &[u8]) + Send + Sync>;

/// Handler notified once per connection failure.
///
/// Called when an established connection is lost, when a framing error
/// tears the connection down, and when connect retries are exhausted. It is
/// not called for `disconnect` or `finalize`.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
///
/// use pmix_link::hooks::ErrorHandler;
///
/// let handler: ErrorHandler = Arc::new(|err| eprintln!("connection lost: {err}"));
/// ```
pub type ErrorHandler = Arc<dyn Fn(&ClientError) + Send + Sync>;

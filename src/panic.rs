//! Containment for panics raised by application callbacks.
//!
//! Callbacks run on the reactor task. A panicking callback is logged and
//! swallowed so the connection keeps serving every other request.

use std::{
    any::Any,
    fmt,
    panic::{AssertUnwindSafe, catch_unwind},
};

/// Displays a panic payload.
///
/// The payload is downcast to `String` or `&'static str` if possible and
/// falls back to `Debug` formatting otherwise.
///
/// ```
/// use pmix_link::panic::PanicMessage;
///
/// assert_eq!(PanicMessage::from(Box::new("boom") as Box<_>).to_string(), "boom");
/// ```
#[derive(Debug)]
#[must_use]
pub struct PanicMessage(Box<dyn Any + Send>);

impl From<Box<dyn Any + Send>> for PanicMessage {
    fn from(payload: Box<dyn Any + Send>) -> Self { Self(payload) }
}

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(s) = self.0.downcast_ref::<String>() {
            f.write_str(s)
        } else if let Some(s) = self.0.downcast_ref::<&'static str>() {
            f.write_str(s)
        } else {
            write!(f, "{:?}", self.0)
        }
    }
}

/// Run `callback`, logging instead of unwinding if it panics.
///
/// Returns `false` if the callback panicked.
pub(crate) fn contain(what: &str, callback: impl FnOnce()) -> bool {
    match catch_unwind(AssertUnwindSafe(callback)) {
        Ok(()) => true,
        Err(payload) => {
            log::error!("{what} panicked: {}", PanicMessage::from(payload));
            false
        }
    }
}

//! Client handle for a connection to a process-management server.
//!
//! A [`Client`] is a cheap, cloneable handle. Every operation is forwarded
//! to the [`Connection`](crate::Connection) reactor, which owns the socket
//! and runs all callbacks. Handles never touch the socket themselves.

mod builder;
mod request;

use std::sync::Arc;

use bytes::Bytes;
pub use builder::{ClientBuilder, ENV_ID, ENV_MAX_RETRIES, ProgressThread};
pub use request::Request;
use tokio::sync::{mpsc, oneshot};

use crate::{
    ClientError,
    connection::{ConnectionState, Notify, Op, Scope, Shared},
    frame::{FramingError, ProcessId, Tag},
    hooks::{ErrorHandler, InboundHandler},
    wait::{Completion, WaitCell},
};

/// Handle used to connect, send requests and register handlers.
///
/// Cloning a `Client` yields another handle to the same connection. The
/// reactor stops once [`finalize`](Self::finalize) runs or every handle is
/// dropped.
#[derive(Clone, Debug)]
pub struct Client {
    ops: mpsc::UnboundedSender<Op>,
    shared: Arc<Shared>,
    identity: ProcessId,
    max_payload: usize,
}

impl Client {
    pub(crate) fn new(
        ops: mpsc::UnboundedSender<Op>,
        shared: Arc<Shared>,
        identity: ProcessId,
        max_payload: usize,
    ) -> Self {
        Self {
            ops,
            shared,
            identity,
            max_payload,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn state(&self) -> ConnectionState { self.shared.state() }

    /// Identity this client presents to the server.
    #[must_use]
    pub fn identity(&self) -> ProcessId { self.identity }

    /// Largest payload [`enqueue`](Self::enqueue) accepts.
    #[must_use]
    pub fn max_payload(&self) -> usize { self.max_payload }

    /// Connect to the server, retrying transient failures.
    ///
    /// Resolves once the identification exchange has completed. Requests
    /// enqueued before then are held and sent in order afterwards.
    ///
    /// The completion fails with [`ClientError::InvalidState`] unless the
    /// connection is `Unconnected`, `Failed` or `Closed`, and with
    /// [`ClientError::ExhaustedRetries`] once every attempt has failed.
    pub fn connect(&self) -> Completion<()> { self.request(|done| Op::Connect { done }) }

    /// Blocking form of [`connect`](Self::connect).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::BlockingInRuntime`] when called from inside a
    /// Tokio runtime, otherwise the outcome of the connect.
    pub fn connect_blocking(&self) -> Result<(), ClientError> {
        self.request_blocking(|done| Op::Connect { done })
    }

    /// Drop the socket and cancel outstanding work.
    ///
    /// Queued sends and pending replies fail with
    /// [`ClientError::Cancelled`]; the error handler is not invoked. The
    /// client may [`connect`](Self::connect) again afterwards.
    pub fn disconnect(&self) -> Completion<()> { self.request(|done| Op::Disconnect { done }) }

    /// Shut the client down for good.
    ///
    /// Outstanding work fails with [`ClientError::Cancelled`] and the
    /// reactor stops. Later calls succeed without doing anything; every
    /// other operation fails with [`ClientError::Closed`].
    pub fn finalize(&self) -> Completion<()> {
        if !self.shared.stop_accepting() {
            return Completion::ready(Ok(()));
        }
        self.submit_notified(|done| Op::Finalize { done })
    }

    /// Blocking form of [`finalize`](Self::finalize).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::BlockingInRuntime`] when called from inside a
    /// Tokio runtime.
    pub fn finalize_blocking(&self) -> Result<(), ClientError> {
        ensure_blocking_allowed()?;
        if !self.shared.stop_accepting() {
            return Ok(());
        }
        self.wait_on(|done| Op::Finalize { done })
    }

    /// Queue `request` for sending and return the tag it was assigned.
    ///
    /// Requests with a reply callback get a fresh tag; others are sent
    /// under [`Tag::NONE`]. Frames go out in enqueue order. Enqueueing
    /// while not yet connected is allowed; the frame is held until the
    /// handshake completes.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] after `finalize`,
    /// [`ClientError::Framing`] when the payload exceeds
    /// [`max_payload`](Self::max_payload), and
    /// [`ClientError::TagsExhausted`] when every tag is outstanding. The
    /// request's callbacks are not invoked on error.
    pub fn enqueue(&self, request: Request) -> Result<Tag, ClientError> {
        if !self.shared.is_accepting() {
            return Err(ClientError::Closed);
        }
        let (payload, on_sent, on_reply) = request.into_parts();
        if payload.len() > self.max_payload {
            return Err(FramingError::OversizedPayload {
                size: u64::try_from(payload.len()).unwrap_or(u64::MAX),
                max: self.max_payload,
            }
            .into());
        }
        let tag = if on_reply.is_some() {
            self.shared
                .tags
                .allocate()
                .ok_or(ClientError::TagsExhausted)?
        } else {
            Tag::NONE
        };
        let op = Op::Send {
            tag,
            payload,
            on_sent,
            on_reply,
        };
        if self.ops.send(op).is_err() {
            if tag.expects_reply() {
                self.shared.tags.release(tag);
            }
            return Err(ClientError::Closed);
        }
        Ok(tag)
    }

    /// Send `payload` and resolve with a copy of the reply.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # async fn demo(client: pmix_link::Client) -> Result<(), pmix_link::ClientError> {
    /// let reply = client.call("GET k").await?;
    /// println!("{}", String::from_utf8_lossy(&reply));
    /// # Ok(())
    /// # }
    /// ```
    pub fn call(&self, payload: impl Into<Bytes>) -> Completion<Bytes> {
        let (tx, rx) = oneshot::channel();
        let request = Request::new(payload).on_reply(move |reply| {
            let _ = tx.send(reply.map(Bytes::copy_from_slice));
        });
        match self.enqueue(request) {
            Ok(_) => Completion::new(rx),
            Err(err) => Completion::ready(Err(err)),
        }
    }

    /// Blocking form of [`call`](Self::call).
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::BlockingInRuntime`] when called from inside a
    /// Tokio runtime, any error [`enqueue`](Self::enqueue) returns, or the
    /// error that failed the request.
    pub fn call_blocking(&self, payload: impl Into<Bytes>) -> Result<Bytes, ClientError> {
        ensure_blocking_allowed()?;
        let cell = WaitCell::new();
        let signal = cell.signaller();
        let request = Request::new(payload)
            .on_reply(move |reply| signal.signal(reply.map(Bytes::copy_from_slice)));
        self.enqueue(request)?;
        cell.wait().unwrap_or(Err(ClientError::Closed))
    }

    /// Replace the handler notified when the connection fails.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] after `finalize`.
    pub fn register_error_handler<F>(&self, handler: F) -> Result<(), ClientError>
    where
        F: Fn(&ClientError) + Send + Sync + 'static,
    {
        let handler: ErrorHandler = Arc::new(handler);
        self.submit(Op::SetErrorHandler(Some(handler)))
    }

    /// Replace the handler receiving unsolicited user frames.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] after `finalize`.
    pub fn register_inbound_handler<F>(&self, handler: F) -> Result<(), ClientError>
    where
        F: Fn(Tag, &[u8]) + Send + Sync + 'static,
    {
        let handler: InboundHandler = Arc::new(handler);
        self.submit(Op::SetInboundHandler(Some(handler)))
    }

    /// Append `data` to the staging buffer for `scope`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Closed`] after `finalize`.
    pub fn stage(&self, scope: Scope, data: impl Into<Bytes>) -> Result<(), ClientError> {
        self.submit(Op::Stage {
            scope,
            data: data.into(),
        })
    }

    /// Take everything staged under `scope`, leaving it empty.
    pub fn take_staged(&self, scope: Scope) -> Completion<Bytes> {
        self.request(|done| Op::TakeStaged { scope, done })
    }

    fn submit(&self, op: Op) -> Result<(), ClientError> {
        if !self.shared.is_accepting() {
            return Err(ClientError::Closed);
        }
        self.ops.send(op).map_err(|_| ClientError::Closed)
    }

    fn request<T>(&self, make: impl FnOnce(Notify<T>) -> Op) -> Completion<T> {
        if !self.shared.is_accepting() {
            return Completion::ready(Err(ClientError::Closed));
        }
        self.submit_notified(make)
    }

    /// Submit without checking `accepting`; a dropped op resolves to `Closed`.
    fn submit_notified<T>(&self, make: impl FnOnce(Notify<T>) -> Op) -> Completion<T> {
        let (tx, rx) = oneshot::channel();
        // A rejected op is dropped with its sender, resolving the completion.
        let _ = self.ops.send(make(Notify::Async(tx)));
        Completion::new(rx)
    }

    fn request_blocking<T>(&self, make: impl FnOnce(Notify<T>) -> Op) -> Result<T, ClientError> {
        ensure_blocking_allowed()?;
        if !self.shared.is_accepting() {
            return Err(ClientError::Closed);
        }
        self.wait_on(make)
    }

    fn wait_on<T>(&self, make: impl FnOnce(Notify<T>) -> Op) -> Result<T, ClientError> {
        let cell = WaitCell::new();
        let op = make(Notify::Blocking(cell.signaller()));
        if self.ops.send(op).is_err() {
            return Err(ClientError::Closed);
        }
        cell.wait().unwrap_or(Err(ClientError::Closed))
    }
}

fn ensure_blocking_allowed() -> Result<(), ClientError> {
    if tokio::runtime::Handle::try_current().is_ok() {
        return Err(ClientError::BlockingInRuntime);
    }
    Ok(())
}

#[cfg(test)]
mod tests;

//! Connection reactor owning the socket and every piece of per-connection
//! state.
//!
//! A single task runs [`Connection::run`], a `tokio::select!` loop over four
//! event sources: operations submitted by client handles, the in-progress
//! socket connect, the retry timer, and socket readiness. The `biased`
//! keyword makes handle operations win over I/O so `disconnect` and
//! `finalize` take effect before more frames are exchanged. Because one task
//! handles every event, callbacks never run concurrently and never nest.

mod cache;
mod lifecycle;
mod op;
mod recv;
mod registry;
mod retry;
mod send;
mod state;

use std::{
    future::Future,
    io,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use bytes::Bytes;
pub use cache::Scope;
pub(crate) use op::{Notify, Op};
use recv::ReceiveDispatcher;
pub(crate) use registry::SharedTags;
use registry::TagRegistry;
pub use retry::{BackoffConfig, DEFAULT_MAX_RETRIES};
use retry::RetryController;
use send::SendPipeline;
pub use state::ConnectionState;
use state::StateCell;
use tokio::{
    io::{Interest, Ready},
    net::UnixStream,
    sync::mpsc,
    time::Sleep,
};

use crate::{
    ClientError,
    address::{AddressResolver, ServerAddress},
    frame::{Frame, OutboundFrame, ProcessId, Tag},
    handshake::Identification,
    hooks::{ErrorHandler, InboundHandler, ReplyCallback, SendCallback},
    panic::contain,
};

type ConnectFuture = Pin<Box<dyn Future<Output = io::Result<UnixStream>> + Send>>;

/// State shared between client handles and the reactor.
#[derive(Debug)]
pub(crate) struct Shared {
    state: StateCell,
    accepting: AtomicBool,
    pub(crate) tags: SharedTags,
}

impl Shared {
    pub(crate) fn new() -> Self {
        Self {
            state: StateCell::new(ConnectionState::Unconnected),
            accepting: AtomicBool::new(true),
            tags: SharedTags::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_tags(tags: SharedTags) -> Self {
        Self {
            tags,
            ..Self::new()
        }
    }

    pub(crate) fn state(&self) -> ConnectionState { self.state.load() }

    pub(crate) fn is_accepting(&self) -> bool { self.accepting.load(Ordering::Acquire) }

    /// Stop accepting work, returning whether this call made the change.
    pub(crate) fn stop_accepting(&self) -> bool { self.accepting.swap(false, Ordering::AcqRel) }
}

/// Settings fixed when the reactor is built.
pub(crate) struct ConnectionConfig {
    pub(crate) identity: ProcessId,
    pub(crate) address: Option<ServerAddress>,
    pub(crate) resolver: Arc<dyn AddressResolver>,
    pub(crate) identification: Identification,
    pub(crate) max_retries: u32,
    pub(crate) backoff: BackoffConfig,
    pub(crate) max_payload: usize,
    pub(crate) error_handler: Option<ErrorHandler>,
    pub(crate) inbound_handler: Option<InboundHandler>,
}

/// Whether the reactor loop keeps running after an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

/// The reactor. Owns the socket and all per-connection state.
pub struct Connection {
    shared: Arc<Shared>,
    ops: mpsc::UnboundedReceiver<Op>,
    identity: ProcessId,
    address: Option<ServerAddress>,
    resolver: Arc<dyn AddressResolver>,
    resolved: Option<ServerAddress>,
    identification: Identification,
    stream: Option<UnixStream>,
    connecting: Option<ConnectFuture>,
    retry_timer: Option<Pin<Box<Sleep>>>,
    retry: RetryController,
    handshake: Option<OutboundFrame>,
    peer: Option<Identification>,
    server: Option<ProcessId>,
    connect_waiters: Vec<Notify<()>>,
    send: SendPipeline,
    recv: ReceiveDispatcher,
    registry: TagRegistry,
    staging: cache::StagingCache,
    error_handler: Option<ErrorHandler>,
    inbound_handler: Option<InboundHandler>,
}

// Runs when the reactor future is dropped before completing, for instance
// when its runtime shuts down. Pending callbacks still fire with `Cancelled`.
impl Drop for Connection {
    fn drop(&mut self) { self.shutdown(); }
}

impl Connection {
    pub(crate) fn new(
        config: ConnectionConfig,
        shared: Arc<Shared>,
        ops: mpsc::UnboundedReceiver<Op>,
    ) -> Self {
        let registry = TagRegistry::new(shared.tags.clone());
        Self {
            shared,
            ops,
            identity: config.identity,
            address: config.address,
            resolver: config.resolver,
            resolved: None,
            identification: config.identification,
            stream: None,
            connecting: None,
            retry_timer: None,
            retry: RetryController::new(config.max_retries, config.backoff),
            handshake: None,
            peer: None,
            server: None,
            connect_waiters: Vec::new(),
            send: SendPipeline::default(),
            recv: ReceiveDispatcher::new(config.max_payload),
            registry,
            staging: cache::StagingCache::default(),
            error_handler: config.error_handler,
            inbound_handler: config.inbound_handler,
        }
    }

    /// Drive the connection until `finalize` or until every client handle
    /// has been dropped.
    pub async fn run(mut self) {
        tracing::debug!(identity = %self.identity, "reactor started");
        loop {
            let interest = self.interest();
            tokio::select! {
                biased;

                op = self.ops.recv() => {
                    let flow = match op {
                        Some(op) => self.handle_op(op),
                        None => {
                            tracing::debug!("all client handles dropped");
                            self.close(&ClientError::Closed);
                            Flow::Stop
                        }
                    };
                    if flow == Flow::Stop {
                        break;
                    }
                }
                res = connect_progress(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_result(res);
                }
                () = retry_expiry(&mut self.retry_timer) => {
                    self.retry_timer = None;
                    self.begin_attempt();
                }
                ready = socket_ready(self.stream.as_ref(), interest) => self.on_ready(ready),
            }
        }
        tracing::debug!(identity = %self.identity, "reactor stopped");
    }

    fn state(&self) -> ConnectionState { self.shared.state() }

    fn set_state(&self, next: ConnectionState) {
        let previous = self.shared.state.swap(next);
        if previous != next {
            tracing::info!(from = %previous, to = %next, "connection state changed");
            if previous == ConnectionState::Connected || next == ConnectionState::Connected {
                crate::metrics::set_connected(next == ConnectionState::Connected);
            }
        }
    }

    fn interest(&self) -> Interest {
        let write = self.handshake.is_some()
            || (self.state() == ConnectionState::Connected && self.send.wants_write());
        if write {
            Interest::READABLE | Interest::WRITABLE
        } else {
            Interest::READABLE
        }
    }

    fn handle_op(&mut self, op: Op) -> Flow {
        tracing::trace!(op = op.name(), "operation received");
        match op {
            Op::Connect { done } => self.on_connect_request(done),
            Op::Disconnect { done } => {
                self.close(&ClientError::Cancelled);
                done.complete(Ok(()));
            }
            Op::Finalize { done } => {
                self.finalize();
                done.complete(Ok(()));
                return Flow::Stop;
            }
            Op::Send {
                tag,
                payload,
                on_sent,
                on_reply,
            } => self.on_send(tag, payload, on_sent, on_reply),
            Op::SetErrorHandler(handler) => self.error_handler = handler,
            Op::SetInboundHandler(handler) => self.inbound_handler = handler,
            Op::Stage { scope, data } => self.staging.stage(scope, &data),
            Op::TakeStaged { scope, done } => done.complete(Ok(self.staging.take(scope))),
        }
        Flow::Continue
    }

    fn on_send(
        &mut self,
        tag: Tag,
        payload: Bytes,
        on_sent: Option<SendCallback>,
        on_reply: Option<ReplyCallback>,
    ) {
        let state = self.state();
        if state.is_terminal() {
            let err = if state == ConnectionState::Failed {
                ClientError::communication("connection has failed")
            } else {
                ClientError::Cancelled
            };
            self.refuse_send(tag, on_sent, on_reply, &err);
            return;
        }
        if let Some(on_reply) = on_reply {
            self.registry.register(tag, on_reply);
        }
        let frame = Frame::user(self.identity, tag, payload);
        self.send.push(OutboundFrame::new(frame), on_sent);
        tracing::debug!(
            tag = %tag,
            queued = self.send.len(),
            awaiting_reply = self.registry.len(),
            "frame queued"
        );
    }

    fn refuse_send(
        &self,
        tag: Tag,
        on_sent: Option<SendCallback>,
        on_reply: Option<ReplyCallback>,
        err: &ClientError,
    ) {
        if tag.expects_reply() {
            self.shared.tags.release(tag);
        }
        if let Some(on_sent) = on_sent {
            let err = err.clone();
            contain("send callback", move || on_sent(Err(err)));
        }
        if let Some(on_reply) = on_reply {
            let err = err.clone();
            contain("reply callback", move || on_reply(Err(err)));
        }
    }

    fn on_ready(&mut self, ready: io::Result<Ready>) {
        let ready = match ready {
            Ok(ready) => ready,
            Err(e) => {
                self.on_transport_error(format!("socket readiness failed: {e}"));
                return;
            }
        };
        if ready.is_writable() {
            self.flush();
        }
        if ready.is_readable() || ready.is_read_closed() {
            self.read_socket();
        }
    }

    /// Write the identification frame, then queued frames once connected.
    fn flush(&mut self) {
        if self.handshake.is_some() && !self.flush_handshake() {
            return;
        }
        if self.state() != ConnectionState::Connected {
            return;
        }
        let Some(stream) = self.stream.as_ref() else {
            return;
        };
        if let Err(e) = self.send.write_with(|buf| stream.try_write(buf)) {
            self.fail(ClientError::communication(format!("write failed: {e}")));
        }
    }

    /// Returns `true` once the identification frame is fully written.
    fn flush_handshake(&mut self) -> bool {
        let (Some(stream), Some(frame)) = (self.stream.as_ref(), self.handshake.as_mut()) else {
            return false;
        };
        match frame.write_with(|buf| stream.try_write(buf)) {
            Ok(true) => {
                tracing::debug!("identification sent");
                self.handshake = None;
                self.maybe_established();
                true
            }
            Ok(false) => false,
            Err(e) => {
                self.connect_attempt_failed(ClientError::handshake(format!(
                    "failed to send identification: {e}"
                )));
                false
            }
        }
    }

    fn notify_error_handler(&self, err: &ClientError) {
        if let Some(handler) = &self.error_handler {
            contain("error handler", || handler(err));
        }
    }
}

async fn connect_progress(connecting: &mut Option<ConnectFuture>) -> io::Result<UnixStream> {
    match connecting {
        Some(fut) => fut.await,
        None => std::future::pending().await,
    }
}

async fn retry_expiry(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}

async fn socket_ready(stream: Option<&UnixStream>, interest: Interest) -> io::Result<Ready> {
    match stream {
        Some(stream) => stream.ready(interest).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests;

//! Connect, handshake, failure and teardown transitions.

use std::io;

use tokio::net::UnixStream;

use super::{Connection, ConnectionState, Notify, Op, retry::RetryDecision};
use crate::{
    ClientError,
    frame::{Frame, OutboundFrame},
    metrics,
};

impl Connection {
    pub(super) fn on_connect_request(&mut self, done: Notify<()>) {
        let state = self.state();
        if !state.can_connect() {
            done.complete(Err(ClientError::InvalidState {
                operation: "connect",
                state,
            }));
            return;
        }
        self.retry.reset();
        self.connect_waiters.push(done);
        self.begin_attempt();
    }

    /// Resolve the server address and start a socket connect.
    pub(super) fn begin_attempt(&mut self) {
        self.set_state(ConnectionState::Resolving);
        let address = match self.resolver.resolve(self.address.as_ref()) {
            Ok(address) => address,
            Err(err) => {
                self.fail(err);
                return;
            }
        };
        self.set_state(ConnectionState::Connecting);
        metrics::inc_connect_attempts();
        tracing::debug!(
            server = %address,
            retries = self.retry.retries(),
            "connecting"
        );
        let path = address.path().to_path_buf();
        self.resolved = Some(address);
        self.connecting = Some(Box::pin(UnixStream::connect(path)));
    }

    pub(super) fn on_connect_result(&mut self, res: io::Result<UnixStream>) {
        let stream = match res {
            Ok(stream) => stream,
            Err(err) => {
                self.connect_attempt_failed(ClientError::connect(err));
                return;
            }
        };
        let payload = match self.identification.encode() {
            Ok(payload) => payload,
            Err(err) => {
                self.fail(err);
                return;
            }
        };
        self.stream = Some(stream);
        self.recv.reader.reset();
        self.peer = None;
        self.handshake = Some(OutboundFrame::new(Frame::identification(
            self.identity,
            payload,
        )));
        self.set_state(ConnectionState::HandshakeSent);
    }

    /// Enter `Connected` once the identification is written and acknowledged.
    pub(super) fn maybe_established(&mut self) {
        if self.state() != ConnectionState::HandshakeSent
            || self.handshake.is_some()
            || self.peer.is_none()
        {
            return;
        }
        self.set_state(ConnectionState::Connected);
        tracing::info!(
            identity = %self.identity,
            server = ?self.server,
            queued = self.send.len(),
            "connected to server"
        );
        for waiter in self.connect_waiters.drain(..) {
            waiter.complete(Ok(()));
        }
    }

    /// A connect-phase failure: retried until the budget is spent.
    pub(super) fn connect_attempt_failed(&mut self, err: ClientError) {
        self.teardown_socket();
        metrics::inc_connection_failures();
        match self.retry.on_failure() {
            RetryDecision::RetryAfter(delay) => {
                tracing::warn!(
                    error = %err,
                    retry = self.retry.retries(),
                    delay = ?delay,
                    "connect attempt failed; retrying"
                );
                self.set_state(ConnectionState::Connecting);
                self.retry_timer = Some(Box::pin(tokio::time::sleep(delay)));
            }
            RetryDecision::Exhausted { attempts } => {
                tracing::warn!(error = %err, attempts, "connect retries exhausted");
                self.fail(ClientError::ExhaustedRetries { attempts });
            }
        }
    }

    /// A socket error or EOF: retried during the handshake, fatal afterwards.
    pub(super) fn on_transport_error(&mut self, reason: String) {
        if self.state() == ConnectionState::HandshakeSent {
            self.connect_attempt_failed(ClientError::handshake(reason));
        } else {
            self.fail(ClientError::communication(reason));
        }
    }

    /// Tear the connection down as `Failed`.
    ///
    /// Connect waiters and the error handler receive `err`; outstanding sends
    /// and replies receive it as a communication failure.
    pub(super) fn fail(&mut self, err: ClientError) {
        if self.state() == ConnectionState::Connected {
            metrics::inc_connection_failures();
        }
        tracing::warn!(error = %err, "connection failed");
        self.teardown_socket();
        self.set_state(ConnectionState::Failed);
        let drained = match &err {
            ClientError::CommunicationFailure { .. } => err.clone(),
            other => ClientError::communication(other),
        };
        self.drain(&err, &drained);
        self.notify_error_handler(&err);
    }

    /// Tear the connection down as `Closed`, failing outstanding work with
    /// `err`. The error handler is not invoked.
    pub(super) fn close(&mut self, err: &ClientError) {
        self.teardown_socket();
        self.set_state(ConnectionState::Closed);
        self.drain(err, err);
    }

    /// Close, then cancel every operation still queued behind `finalize`.
    pub(super) fn finalize(&mut self) {
        self.shutdown();
        tracing::info!(identity = %self.identity, "client finalized");
    }

    /// Refuse further work, close the socket and cancel everything pending,
    /// queued operations included. Idempotent.
    pub(super) fn shutdown(&mut self) {
        self.shared.stop_accepting();
        self.close(&ClientError::Cancelled);
        self.ops.close();
        while let Ok(op) = self.ops.try_recv() {
            self.cancel_op(op);
        }
    }

    fn cancel_op(&mut self, op: Op) {
        match op {
            Op::Connect { done } => done.complete(Err(ClientError::Closed)),
            Op::Disconnect { done } | Op::Finalize { done } => done.complete(Ok(())),
            Op::Send {
                tag,
                on_sent,
                on_reply,
                ..
            } => self.refuse_send(tag, on_sent, on_reply, &ClientError::Cancelled),
            Op::TakeStaged { scope, done } => done.complete(Ok(self.staging.take(scope))),
            Op::SetErrorHandler(_) | Op::SetInboundHandler(_) | Op::Stage { .. } => {}
        }
    }

    fn drain(&mut self, waiter_err: &ClientError, callback_err: &ClientError) {
        for waiter in self.connect_waiters.drain(..) {
            waiter.complete(Err(waiter_err.clone()));
        }
        let sends = self.send.drain(callback_err);
        let replies = self.registry.drain(callback_err);
        if sends + replies > 0 {
            tracing::debug!(sends, replies, error = %callback_err, "drained outstanding work");
        }
    }

    fn teardown_socket(&mut self) {
        self.stream = None;
        self.connecting = None;
        self.retry_timer = None;
        self.handshake = None;
        self.peer = None;
        self.recv.reader.reset();
    }
}

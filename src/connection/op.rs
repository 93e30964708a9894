//! Operations submitted by client handles to the reactor.

use bytes::Bytes;
use tokio::sync::oneshot;

use super::Scope;
use crate::{
    ClientError,
    frame::Tag,
    hooks::{ErrorHandler, InboundHandler, ReplyCallback, SendCallback},
    wait::Signal,
};

/// Where the outcome of an operation is delivered.
pub(crate) enum Notify<T> {
    Async(oneshot::Sender<Result<T, ClientError>>),
    Blocking(Signal<Result<T, ClientError>>),
}

impl<T> Notify<T> {
    pub(crate) fn complete(self, result: Result<T, ClientError>) {
        match self {
            Self::Async(tx) => {
                // The caller may have dropped its completion.
                let _ = tx.send(result);
            }
            Self::Blocking(signal) => signal.signal(result),
        }
    }
}

pub(crate) enum Op {
    Connect {
        done: Notify<()>,
    },
    Disconnect {
        done: Notify<()>,
    },
    Finalize {
        done: Notify<()>,
    },
    Send {
        tag: Tag,
        payload: Bytes,
        on_sent: Option<SendCallback>,
        on_reply: Option<ReplyCallback>,
    },
    SetErrorHandler(Option<ErrorHandler>),
    SetInboundHandler(Option<InboundHandler>),
    Stage {
        scope: Scope,
        data: Bytes,
    },
    TakeStaged {
        scope: Scope,
        done: Notify<Bytes>,
    },
}

impl Op {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::Finalize { .. } => "finalize",
            Self::Send { .. } => "send",
            Self::SetErrorHandler(_) => "set-error-handler",
            Self::SetInboundHandler(_) => "set-inbound-handler",
            Self::Stage { .. } => "stage",
            Self::TakeStaged { .. } => "take-staged",
        }
    }
}

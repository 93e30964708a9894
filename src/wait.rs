//! Completion handles bridging the reactor to callers.
//!
//! [`Completion`] is the async side: a future resolved by the reactor.
//! [`WaitCell`] serves synchronous callers by parking the calling thread on a
//! condition variable until the reactor signals it. A `WaitCell` must never
//! be waited on from the thread that drives the reactor.

use std::{
    fmt,
    future::Future,
    pin::Pin,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    task::{Context, Poll},
    time::{Duration, Instant},
};

use tokio::sync::oneshot;

use crate::ClientError;

enum Slot<T> {
    Pending,
    Ready(T),
    Abandoned,
    Taken,
}

struct Inner<T> {
    slot: Slot<T>,
    live_signals: usize,
}

struct Shared<T> {
    inner: Mutex<Inner<T>>,
    ready: Condvar,
}

impl<T> Shared<T> {
    fn lock(&self) -> MutexGuard<'_, Inner<T>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A one-shot value that a synchronous caller can block on.
///
/// # Examples
///
/// ```
/// use std::thread;
///
/// use pmix_link::WaitCell;
///
/// let cell = WaitCell::new();
/// let signal = cell.signaller();
/// thread::spawn(move || signal.signal(42));
/// assert_eq!(cell.wait(), Some(42));
/// ```
pub struct WaitCell<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Default for WaitCell<T> {
    fn default() -> Self { Self::new() }
}

impl<T> fmt::Debug for WaitCell<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WaitCell")
            .field("signalled", &self.is_signalled())
            .finish_non_exhaustive()
    }
}

impl<T> WaitCell<T> {
    /// Create an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    slot: Slot::Pending,
                    live_signals: 0,
                }),
                ready: Condvar::new(),
            }),
        }
    }

    /// Create a handle that completes this cell.
    ///
    /// Once every signaller has been dropped without signalling, waiters wake
    /// with `None`.
    #[must_use]
    pub fn signaller(&self) -> Signal<T> {
        self.shared.lock().live_signals += 1;
        Signal {
            shared: Arc::clone(&self.shared),
            fired: false,
        }
    }

    /// Whether a value has been stored or every signaller was dropped.
    #[must_use]
    pub fn is_signalled(&self) -> bool { !matches!(self.shared.lock().slot, Slot::Pending) }

    /// Block until the cell is signalled and take the value.
    ///
    /// Returns `None` if every signaller was dropped first, or if the value
    /// was already taken.
    #[must_use]
    pub fn wait(&self) -> Option<T> {
        let guard = self.shared.lock();
        let mut guard = self
            .shared
            .ready
            .wait_while(guard, |inner| matches!(inner.slot, Slot::Pending))
            .unwrap_or_else(PoisonError::into_inner);
        Self::take(&mut guard)
    }

    /// Like [`wait`](Self::wait) but gives up after `timeout`.
    ///
    /// Returns `None` on timeout; the value can still be collected by a
    /// later wait.
    #[must_use]
    pub fn wait_timeout(&self, timeout: Duration) -> Option<T> {
        let deadline = Instant::now() + timeout;
        let mut guard = self.shared.lock();
        while matches!(guard.slot, Slot::Pending) {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            guard = self
                .shared
                .ready
                .wait_timeout(guard, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        Self::take(&mut guard)
    }

    fn take(inner: &mut Inner<T>) -> Option<T> {
        match std::mem::replace(&mut inner.slot, Slot::Taken) {
            Slot::Ready(value) => Some(value),
            Slot::Abandoned => {
                inner.slot = Slot::Abandoned;
                None
            }
            Slot::Pending | Slot::Taken => None,
        }
    }
}

/// Completes a [`WaitCell`].
pub struct Signal<T> {
    shared: Arc<Shared<T>>,
    fired: bool,
}

impl<T> fmt::Debug for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("fired", &self.fired)
            .finish_non_exhaustive()
    }
}

impl<T> Signal<T> {
    /// Store `value` and wake every waiter.
    ///
    /// The first value stored wins; later signals are ignored.
    pub fn signal(mut self, value: T) {
        let mut inner = self.shared.lock();
        if matches!(inner.slot, Slot::Pending) {
            inner.slot = Slot::Ready(value);
        }
        self.fired = true;
        drop(inner);
        self.shared.ready.notify_all();
    }
}

impl<T> Drop for Signal<T> {
    fn drop(&mut self) {
        let mut inner = self.shared.lock();
        inner.live_signals = inner.live_signals.saturating_sub(1);
        if !self.fired && inner.live_signals == 0 && matches!(inner.slot, Slot::Pending) {
            inner.slot = Slot::Abandoned;
            drop(inner);
            self.shared.ready.notify_all();
        }
    }
}

/// Future resolving to the outcome of an operation submitted to the reactor.
///
/// Resolves to [`ClientError::Closed`] if the reactor stopped before
/// completing the operation.
#[must_use = "completions do nothing unless awaited"]
#[derive(Debug)]
pub struct Completion<T> {
    rx: oneshot::Receiver<Result<T, ClientError>>,
}

impl<T> Completion<T> {
    pub(crate) fn new(rx: oneshot::Receiver<Result<T, ClientError>>) -> Self { Self { rx } }

    pub(crate) fn ready(result: Result<T, ClientError>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(result);
        Self { rx }
    }
}

impl<T> Future for Completion<T> {
    type Output = Result<T, ClientError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.rx)
            .poll(cx)
            .map(|res| res.unwrap_or(Err(ClientError::Closed)))
    }
}

//! FIFO send queue with a single in-flight frame.

use std::{collections::VecDeque, io};

use crate::{
    ClientError,
    frame::OutboundFrame,
    hooks::SendCallback,
    metrics::{self, Direction},
    panic::contain,
};

/// A queued frame and the callback to fire once it is on the wire.
pub(crate) struct PendingSend {
    pub(crate) frame: OutboundFrame,
    pub(crate) on_sent: Option<SendCallback>,
}

/// Frames awaiting transmission, written strictly in enqueue order.
#[derive(Default)]
pub(crate) struct SendPipeline {
    queue: VecDeque<PendingSend>,
    in_flight: Option<PendingSend>,
}

impl SendPipeline {
    pub(crate) fn push(&mut self, frame: OutboundFrame, on_sent: Option<SendCallback>) {
        self.queue.push_back(PendingSend { frame, on_sent });
    }

    /// Move the queue head in flight if nothing is being written.
    pub(crate) fn promote(&mut self) -> bool {
        if self.in_flight.is_none() {
            self.in_flight = self.queue.pop_front();
        }
        self.in_flight.is_some()
    }

    pub(crate) fn wants_write(&self) -> bool {
        self.in_flight.is_some() || !self.queue.is_empty()
    }

    /// Frames queued or in flight.
    pub(crate) fn len(&self) -> usize { self.queue.len() + usize::from(self.in_flight.is_some()) }

    /// Write frames through `write` until the transport would block or the
    /// queue empties, returning how many frames completed.
    ///
    /// Each completed frame fires its send callback before the next one is
    /// promoted.
    pub(crate) fn write_with<F>(&mut self, mut write: F) -> io::Result<usize>
    where
        F: FnMut(&[u8]) -> io::Result<usize>,
    {
        let mut completed = 0;
        while self.promote() {
            let Some(current) = self.in_flight.as_mut() else {
                break;
            };
            if !current.frame.write_with(&mut write)? {
                break;
            }
            if let Some(done) = self.in_flight.take() {
                tracing::debug!(tag = %done.frame.tag(), "frame sent");
                metrics::inc_frames(Direction::Outbound);
                completed += 1;
                if let Some(on_sent) = done.on_sent {
                    contain("send callback", move || on_sent(Ok(())));
                }
            }
        }
        Ok(completed)
    }

    /// Fail every queued and in-flight frame with `err`, returning how many
    /// frames were dropped.
    pub(crate) fn drain(&mut self, err: &ClientError) -> usize {
        let dropped: Vec<_> = self
            .in_flight
            .take()
            .into_iter()
            .chain(self.queue.drain(..))
            .collect();
        let count = dropped.len();
        for pending in dropped {
            if let Some(on_sent) = pending.on_sent {
                let err = err.clone();
                contain("send callback", move || on_sent(Err(err)));
            }
        }
        count
    }
}

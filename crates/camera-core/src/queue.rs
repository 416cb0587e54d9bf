use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};

/// A bounded FIFO that never blocks its producer: on a full queue the new
/// item is dropped rather than waiting for room. Consumers use
/// `recv_timeout` so they can observe a stop flag between reads.
pub struct DropNewestQueue<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> DropNewestQueue<T> {
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = crossbeam_channel::bounded(capacity);
        Self { tx, rx }
    }

    pub fn sender(&self) -> QueueSender<T> {
        QueueSender {
            tx: self.tx.clone(),
        }
    }

    pub fn receiver(&self) -> Receiver<T> {
        self.rx.clone()
    }
}

#[derive(Clone)]
pub struct QueueSender<T> {
    tx: Sender<T>,
}

impl<T> From<Sender<T>> for QueueSender<T> {
    fn from(tx: Sender<T>) -> Self {
        Self { tx }
    }
}

impl<T> QueueSender<T> {
    /// Pushes without blocking. Returns `true` if the item was accepted,
    /// `false` if it was dropped because the queue was full.
    pub fn push(&self, item: T) -> bool {
        match self.tx.try_send(item) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => false,
            Err(TrySendError::Disconnected(_)) => false,
        }
    }
}

/// Blocks up to `timeout` for the next item, returning `None` on timeout so
/// the caller can re-check its stop flag. Mirrors `Queue.get(timeout=1)` in
/// the pipeline this engine replaces.
pub fn recv_with_timeout<T>(rx: &Receiver<T>, timeout: Duration) -> Option<T> {
    rx.recv_timeout(timeout).ok()
}

//! Bounded mailbox with a drop-oldest overflow policy.
//!
//! Dial tasks post results here and the frame pump takes them once per
//! tick. Posting never blocks: when the mailbox is full the oldest queued
//! item is evicted to make room, so the newest outcome is always the one
//! that survives. `crossbeam-channel` is used because evicting from the
//! sending side needs a receiver handle there too.

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

/// The consuming side, owned by the orchestrator.
pub(crate) struct Mailbox<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

/// The posting side, moved into each dial task.
pub(crate) struct Poster<T> {
    tx: Sender<T>,
    rx: Receiver<T>,
}

impl<T> Mailbox<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, rx) = bounded(capacity.max(1));
        Self { tx, rx }
    }

    pub(crate) fn poster(&self) -> Poster<T> {
        Poster {
            tx: self.tx.clone(),
            rx: self.rx.clone(),
        }
    }

    /// Non-blocking receive.
    pub(crate) fn try_take(&self) -> Option<T> {
        self.rx.try_recv().ok()
    }

    /// Empties the mailbox without blocking.
    pub(crate) fn drain(&self) -> Vec<T> {
        self.rx.try_iter().collect()
    }
}

impl<T> Poster<T> {
    /// Posts `item`, evicting the oldest queued item if the mailbox is full.
    ///
    /// Returns whatever was evicted so the caller can release it properly.
    /// With a single poster at a time exactly one item is evicted per
    /// overflow.
    pub(crate) fn post(&self, item: T) -> Vec<T> {
        let mut evicted = Vec::new();
        let mut item = item;
        loop {
            match self.tx.try_send(item) {
                Ok(()) => return evicted,
                Err(TrySendError::Full(back)) => {
                    item = back;
                    if let Ok(oldest) = self.rx.try_recv() {
                        evicted.push(oldest);
                    }
                }
                // Unreachable while `self.rx` is alive; hand the item back.
                Err(TrySendError::Disconnected(back)) => {
                    evicted.push(back);
                    return evicted;
                }
            }
        }
    }
}

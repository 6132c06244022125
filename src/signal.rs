//! Cancellation broadcast and the ready-token handshake.
//!
//! [`CancelSignal`] closes a channel that nothing ever sends on, so every
//! clone of its receiver wakes up at once and keeps seeing the close. That
//! lets stages put it straight into a `select!` next to their data channels.

use crossbeam::channel::{self, select, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct CancelInner {
    sender: Mutex<Option<Sender<()>>>,
    cancelled: AtomicBool,
}

/// Write-once broadcast signal shared by every stage
#[derive(Debug, Clone)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
    receiver: Receiver<()>,
}

impl CancelSignal {
    /// Create a new, open signal
    pub fn new() -> Self {
        let (sender, receiver) = channel::bounded(0);
        Self {
            inner: Arc::new(CancelInner {
                sender: Mutex::new(Some(sender)),
                cancelled: AtomicBool::new(false),
            }),
            receiver,
        }
    }

    /// Close the signal. Returns `true` only for the call that closed it.
    pub fn cancel(&self) -> bool {
        let sender = self.inner.sender.lock().take();
        match sender {
            Some(sender) => {
                self.inner.cancelled.store(true, Ordering::Release);
                drop(sender);
                true
            }
            None => false,
        }
    }

    /// Check whether the signal has been closed
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Receiver that becomes ready (with a disconnect) once cancelled
    pub fn receiver(&self) -> &Receiver<()> {
        &self.receiver
    }
}

impl Default for CancelSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Single-slot token telling the source it may prompt for the next value.
///
/// At most one token is ever outstanding: releasing while one is already
/// pending is a no-op.
#[derive(Debug, Clone)]
pub struct ReadyHandshake {
    sender: Sender<()>,
    receiver: Receiver<()>,
}

impl ReadyHandshake {
    /// Create a handshake with no pending token
    pub fn new() -> Self {
        let (sender, receiver) = channel::bounded(1);
        Self { sender, receiver }
    }

    /// Make a token available. Returns `false` if one was already pending.
    pub fn release(&self) -> bool {
        match self.sender.try_send(()) {
            Ok(()) => true,
            Err(TrySendError::Full(())) => false,
            // Both ends live in `self`, so the channel cannot disconnect
            Err(TrySendError::Disconnected(())) => false,
        }
    }

    /// Block until a token is available or `cancel` fires.
    ///
    /// Returns `true` when a token was taken.
    pub fn wait(&self, cancel: &CancelSignal) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        select! {
            recv(self.receiver) -> token => token.is_ok(),
            recv(cancel.receiver()) -> _ => false,
        }
    }

    /// Check whether a token is currently pending
    pub fn is_pending(&self) -> bool {
        !self.receiver.is_empty()
    }

    /// Discard a pending token, if any. Returns `true` if one was discarded.
    ///
    /// Called by the holder of the current permit: a token released while it
    /// still holds one is surplus credit.
    pub fn clear(&self) -> bool {
        self.receiver.try_recv().is_ok()
    }
}

impl Default for ReadyHandshake {
    fn default() -> Self {
        Self::new()
    }
}

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A fixed-capacity ring buffer that keeps the most recent items.
///
/// When the buffer is full the oldest item is evicted to make room. Push and
/// drain share a single lock, so a drain never observes a partial push.
/// Clones share the same storage.
#[derive(Debug)]
pub struct RingBuffer<T> {
    items: Arc<Mutex<VecDeque<T>>>,
    capacity: usize,
    evicted_count: Arc<AtomicU64>,
}

impl<T> Clone for RingBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            items: Arc::clone(&self.items),
            capacity: self.capacity,
            evicted_count: Arc::clone(&self.evicted_count),
        }
    }
}

impl<T> RingBuffer<T> {
    /// Create a new ring buffer holding at most `capacity` items
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be non-zero");
        Self {
            items: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
            evicted_count: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Push an item, evicting and returning the oldest one if the buffer is full
    pub fn push(&self, item: T) -> Option<T> {
        let mut items = self.items.lock();
        let evicted = if items.len() == self.capacity {
            self.evicted_count.fetch_add(1, Ordering::Relaxed);
            items.pop_front()
        } else {
            None
        };
        items.push_back(item);
        evicted
    }

    /// Take every held item in insertion order and reset the buffer.
    ///
    /// Returns `None` when there was nothing to drain.
    pub fn drain_all(&self) -> Option<Vec<T>> {
        let mut items = self.items.lock();
        if items.is_empty() {
            return None;
        }
        Some(items.drain(..).collect())
    }

    /// Get the current number of held items
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Check if the buffer is empty
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Get the capacity of the buffer
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the number of items evicted by overflow
    pub fn evicted_count(&self) -> u64 {
        self.evicted_count.load(Ordering::Relaxed)
    }
}

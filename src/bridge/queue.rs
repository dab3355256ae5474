//! FIFO handoff between MQTT command arrival and serial delivery
//!
//! The MQTT event loop pushes, the outbound bridge pops. Both hold a clone of
//! the same [`OutboundQueue`] handle; the deque behind it is only touched
//! under its mutex.

use crate::protocol::OutboundItem;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

/// Thread-safe FIFO of commands waiting for the serial device
///
/// Unbounded by default. With a capacity, a push onto a full queue evicts the
/// oldest item and hands it back to the caller.
#[derive(Debug, Clone)]
pub struct OutboundQueue {
    inner: Arc<Mutex<VecDeque<OutboundItem>>>,
    capacity: Option<usize>,
}

impl OutboundQueue {
    /// Unbounded queue
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::new())),
            capacity: None,
        }
    }

    /// Queue holding at most `capacity` items, dropping the oldest on overflow.
    /// A capacity of zero means unbounded.
    pub fn bounded(capacity: usize) -> Self {
        if capacity == 0 {
            return Self::new();
        }
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: Some(capacity),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Append an item; returns the evicted item if the queue was full
    pub fn push(&self, item: OutboundItem) -> Option<OutboundItem> {
        let mut queue = self.lock();
        let evicted = match self.capacity {
            Some(capacity) if queue.len() >= capacity => queue.pop_front(),
            _ => None,
        };
        queue.push_back(item);
        evicted
    }

    /// Remove the oldest item
    pub fn pop(&self) -> Option<OutboundItem> {
        self.lock().pop_front()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop everything still queued, returning how many items were discarded
    pub fn clear(&self) -> usize {
        let mut queue = self.lock();
        let discarded = queue.len();
        queue.clear();
        discarded
    }

    // Every critical section is a single deque call, so a poisoned deque is
    // still consistent.
    fn lock(&self) -> MutexGuard<'_, VecDeque<OutboundItem>> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for OutboundQueue {
    fn default() -> Self {
        Self::new()
    }
}
